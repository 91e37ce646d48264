//! Globally unique identifiers used throughout Seatkeeper.
//!
//! Runtime entities use UUIDv7 for time-ordered lexicographic sorting,
//! except `InstallationId` which is derived from the installed source so
//! identical logic always gets the same identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7-backed identifier with a display prefix.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one escrow seat inside an instance's ledger.
    SeatId,
    "seat"
);

uuid_id!(
    /// Identifier of one running contract instance.
    InstanceId,
    "instance"
);

uuid_id!(
    /// Identifier of one invitation token in the invitation arena.
    InvitationId,
    "invitation"
);

uuid_id!(
    /// Identifier of an asset brand. Two brands with the same display name
    /// are still distinct.
    BrandId,
    "brand"
);

uuid_id!(
    /// Identifier under which a timer service is registered with the runtime.
    TimerId,
    "timer"
);

// ---------------------------------------------------------------------------
// InstallationId
// ---------------------------------------------------------------------------

/// Content-derived identity of installed contract logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstallationId(pub [u8; 32]);

impl InstallationId {
    /// Derive the identity from the contract name and its bundle source.
    ///
    /// Installing the same logic twice yields the same `InstallationId`.
    #[must_use]
    pub fn from_source(contract_name: &str, source: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"seatkeeper:installation:v1:");
        hasher.update(contract_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "installation:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
