//! Invitations: single-use capability tokens.
//!
//! An [`Invitation`] is an opaque handle into the [`InvitationIssuer`]
//! arena. The arena, not the handle, decides whether it may still be used:
//!
//! ```text
//!                    redeem
//!   UNREDEEMED ───────────────▶ REDEEMED
//!        │
//!        │ claim (a fresh token takes over)
//!        ▼
//!   SUPERSEDED
//! ```
//!
//! Handles are `Clone`, so holding a copy proves nothing: whoever redeems
//! or claims first wins.

use std::collections::HashMap;

use parking_lot::Mutex;
use seatkeeper_types::{
    InstallationId, InstanceId, InvitationId, ProposalShape, Result, SeatId, SeatkeeperError,
};
use serde::Serialize;
use tracing::{debug, info};

/// Which contract function an invitation enters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferHandler {
    pub name: String,
    /// A seat the handler acts against, e.g. the seller of an option.
    pub bound_seat: Option<SeatId>,
}

impl OfferHandler {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound_seat: None,
        }
    }

    #[must_use]
    pub fn bound_to(mut self, seat: SeatId) -> Self {
        self.bound_seat = Some(seat);
        self
    }
}

/// Immutable facts about an invitation, fixed when it was made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationDetails {
    pub invitation: InvitationId,
    pub description: String,
    pub installation: InstallationId,
    pub instance: InstanceId,
    pub handler: OfferHandler,
    /// Contract-chosen terms (strike price, deadline, ...).
    pub custom_terms: serde_json::Value,
    pub shape: Option<ProposalShape>,
}

/// Handle to an invitation in the arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invitation {
    id: InvitationId,
    instance: InstanceId,
}

impl Invitation {
    #[must_use]
    pub fn id(&self) -> InvitationId {
        self.id
    }

    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvitationState {
    Unredeemed,
    Redeemed,
    Superseded,
}

#[derive(Debug)]
struct Entry {
    details: InvitationDetails,
    state: InvitationState,
}

/// The arena of all invitations of one runtime.
#[derive(Debug, Default)]
pub struct InvitationIssuer {
    entries: Mutex<HashMap<InvitationId, Entry>>,
}

impl InvitationIssuer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new invitation. `details.invitation` is overwritten with the
    /// fresh id.
    pub(crate) fn issue(&self, mut details: InvitationDetails) -> Invitation {
        let id = InvitationId::new();
        details.invitation = id;
        let invitation = Invitation {
            id,
            instance: details.instance,
        };
        debug!(invitation = %id, handler = %details.handler.name, "invitation issued");
        self.entries.lock().insert(
            id,
            Entry {
                details,
                state: InvitationState::Unredeemed,
            },
        );
        invitation
    }

    fn check_live(entry: Option<&Entry>, id: InvitationId) -> Result<&Entry> {
        let entry = entry.ok_or(SeatkeeperError::InvitationNotFound(id))?;
        match entry.state {
            InvitationState::Unredeemed => Ok(entry),
            InvitationState::Redeemed => Err(SeatkeeperError::AlreadyRedeemed(id)),
            InvitationState::Superseded => Err(SeatkeeperError::InvitationSuperseded(id)),
        }
    }

    /// Can this invitation still be redeemed or claimed?
    #[must_use]
    pub fn is_live(&self, invitation: &Invitation) -> bool {
        Self::check_live(self.entries.lock().get(&invitation.id), invitation.id).is_ok()
    }

    /// Inspect a live invitation.
    ///
    /// # Errors
    /// `InvitationNotFound`, `AlreadyRedeemed` or `InvitationSuperseded`.
    pub fn details(&self, invitation: &Invitation) -> Result<InvitationDetails> {
        let entries = self.entries.lock();
        Ok(Self::check_live(entries.get(&invitation.id), invitation.id)?
            .details
            .clone())
    }

    /// Take exclusive ownership: the presented handle stops working and a
    /// fresh one with the same details is returned.
    ///
    /// # Errors
    /// `InvitationNotFound`, `AlreadyRedeemed` or `InvitationSuperseded`.
    pub fn claim(&self, invitation: Invitation) -> Result<Invitation> {
        let mut entries = self.entries.lock();
        let mut details = Self::check_live(entries.get(&invitation.id), invitation.id)?
            .details
            .clone();
        if let Some(old) = entries.get_mut(&invitation.id) {
            old.state = InvitationState::Superseded;
        }
        let id = InvitationId::new();
        details.invitation = id;
        entries.insert(
            id,
            Entry {
                details,
                state: InvitationState::Unredeemed,
            },
        );
        info!(old = %invitation.id, new = %id, "invitation claimed");
        Ok(Invitation {
            id,
            instance: invitation.instance,
        })
    }

    /// Consume the invitation. Succeeds at most once per invitation.
    pub(crate) fn redeem(&self, invitation: &Invitation) -> Result<InvitationDetails> {
        let mut entries = self.entries.lock();
        let details = Self::check_live(entries.get(&invitation.id), invitation.id)?
            .details
            .clone();
        if let Some(entry) = entries.get_mut(&invitation.id) {
            entry.state = InvitationState::Redeemed;
        }
        debug!(invitation = %invitation.id, "invitation redeemed");
        Ok(details)
    }

    /// Invitations that can still be redeemed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| e.state == InvitationState::Unredeemed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(handler: &str) -> InvitationDetails {
        InvitationDetails {
            invitation: InvitationId::new(),
            description: handler.to_string(),
            installation: InstallationId::from_source("test", "src"),
            instance: InstanceId::new(),
            handler: OfferHandler::new(handler),
            custom_terms: serde_json::json!({ "strikePrice": 20 }),
            shape: None,
        }
    }

    #[test]
    fn redeem_once() {
        let issuer = InvitationIssuer::new();
        let invitation = issuer.issue(details("encourage"));
        let copy = invitation.clone();
        assert!(issuer.is_live(&invitation));

        let redeemed = issuer.redeem(&invitation).unwrap();
        assert_eq!(redeemed.invitation, invitation.id());
        assert!(!issuer.is_live(&copy));
        assert!(matches!(
            issuer.redeem(&copy).unwrap_err(),
            SeatkeeperError::AlreadyRedeemed(_)
        ));
        assert_eq!(issuer.outstanding(), 0);
    }

    #[test]
    fn claim_supersedes_old_handle() {
        let issuer = InvitationIssuer::new();
        let original = issuer.issue(details("exerciseOption"));
        let stale = original.clone();
        let claimed = issuer.claim(original).unwrap();

        assert_ne!(claimed.id(), stale.id());
        assert!(issuer.is_live(&claimed));
        assert!(matches!(
            issuer.redeem(&stale).unwrap_err(),
            SeatkeeperError::InvitationSuperseded(_)
        ));
        assert!(matches!(
            issuer.claim(stale).unwrap_err(),
            SeatkeeperError::InvitationSuperseded(_)
        ));

        let inspected = issuer.details(&claimed).unwrap();
        assert_eq!(inspected.invitation, claimed.id());
        assert_eq!(inspected.custom_terms["strikePrice"], 20);
        assert!(issuer.redeem(&claimed).is_ok());
    }

    #[test]
    fn unknown_invitation_not_found() {
        let issuer = InvitationIssuer::new();
        let foreign = InvitationIssuer::new().issue(details("x"));
        assert!(matches!(
            issuer.details(&foreign).unwrap_err(),
            SeatkeeperError::InvitationNotFound(_)
        ));
    }

    #[test]
    fn redeemed_invitation_cannot_be_claimed() {
        let issuer = InvitationIssuer::new();
        let invitation = issuer.issue(details("x"));
        issuer.redeem(&invitation).unwrap();
        assert!(matches!(
            issuer.claim(invitation).unwrap_err(),
            SeatkeeperError::AlreadyRedeemed(_)
        ));
    }
}
