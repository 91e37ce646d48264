//! Error types for the Seatkeeper escrow kernel.
//!
//! All errors use the `SK_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Asset arithmetic errors
//! - 2xx: Seat errors
//! - 3xx: Reallocation errors
//! - 4xx: Capability errors (invitations, installations, instances)
//! - 5xx: Payout errors
//! - 6xx: Notifier errors
//! - 7xx: Supply / registry / timer errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{InstallationId, InstanceId, InvitationId, SeatId, TimerId};

/// Central error enum for all Seatkeeper operations.
#[derive(Debug, Clone, Error)]
pub enum SeatkeeperError {
    // =================================================================
    // Asset Errors (1xx)
    // =================================================================
    /// Arithmetic between amounts of different brands, or a value that
    /// does not match its brand's asset kind.
    #[error("SK_ERR_100: Kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },

    /// Subtraction would produce a negative amount or a non-subset.
    #[error("SK_ERR_101: Underflow: cannot take {needed} from {available}")]
    Underflow { needed: String, available: String },

    /// A non-fungible token appears twice.
    #[error("SK_ERR_102: Duplicate token: {token}")]
    DuplicateToken { token: String },

    /// A fungible amount exceeded the representable range.
    #[error("SK_ERR_103: Amount overflow")]
    AmountOverflow,

    // =================================================================
    // Seat Errors (2xx)
    // =================================================================
    /// No seat with this ID exists in the ledger.
    #[error("SK_ERR_200: Seat not found: {0}")]
    SeatNotFound(SeatId),

    /// The seat has exited and can no longer be reallocated.
    #[error("SK_ERR_201: Seat closed: {0}")]
    SeatClosed(SeatId),

    /// The seat's exit rule does not allow the requested exit.
    #[error("SK_ERR_202: Exit not allowed for seat {seat}: {reason}")]
    ExitRuleViolation { seat: SeatId, reason: String },

    /// The proposal does not have the keywords the handler requires.
    #[error("SK_ERR_203: Proposal shape mismatch: {reason}")]
    ProposalShapeMismatch { reason: String },

    /// A payment or amount uses a brand the instance does not accept.
    #[error("SK_ERR_204: Issuer not accepted: {brand}")]
    IssuerNotAccepted { brand: String },

    /// The offer handler rejected the seat; the allocation was refunded.
    #[error("SK_ERR_205: Offer rejected: {reason}")]
    OfferRejected { reason: String },

    // =================================================================
    // Reallocation Errors (3xx)
    // =================================================================
    /// Staged allocations do not preserve per-brand totals.
    #[error("SK_ERR_300: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// The same seat was staged twice in one reallocation.
    #[error("SK_ERR_301: Seat staged twice: {0}")]
    SeatStagedTwice(SeatId),

    // =================================================================
    // Capability Errors (4xx)
    // =================================================================
    /// The invitation has already been redeemed.
    #[error("SK_ERR_400: Invitation already redeemed: {0}")]
    AlreadyRedeemed(InvitationId),

    /// The invitation was claimed and replaced by a fresh token.
    #[error("SK_ERR_401: Invitation superseded by claim: {0}")]
    InvitationSuperseded(InvitationId),

    /// No invitation with this ID was ever issued.
    #[error("SK_ERR_402: Invitation not found: {0}")]
    InvitationNotFound(InvitationId),

    /// The installation was never registered.
    #[error("SK_ERR_403: Installation not found: {0}")]
    InstallationNotFound(InstallationId),

    /// The instance is unknown or its actor has stopped.
    #[error("SK_ERR_404: Instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// An offer handler name the contract does not know.
    #[error("SK_ERR_405: Unknown offer handler: {0}")]
    UnknownHandler(String),

    // =================================================================
    // Payout Errors (5xx)
    // =================================================================
    /// Payouts are only available after the seat exits.
    #[error("SK_ERR_500: Payout not ready for seat {0}")]
    PayoutNotReady(SeatId),

    /// The payout for this keyword was already taken.
    #[error("SK_ERR_501: Payout already withdrawn: {seat} / {keyword}")]
    AlreadyWithdrawn { seat: SeatId, keyword: String },

    /// The exited seat has no payout under this keyword.
    #[error("SK_ERR_502: No payout for keyword {keyword} on seat {seat}")]
    UnknownKeyword { seat: SeatId, keyword: String },

    /// The offer result was already taken from the user seat.
    #[error("SK_ERR_503: Offer result already taken for seat {0}")]
    OfferResultTaken(SeatId),

    // =================================================================
    // Notifier Errors (6xx)
    // =================================================================
    /// The notifier was failed by its owner.
    #[error("SK_ERR_600: Notifier failed: {reason}")]
    NotifierFailed { reason: String },

    /// The notifier was finished; no further updates are accepted.
    #[error("SK_ERR_601: Notifier already finished")]
    NotifierFinished,

    /// The publishing side went away while a caller was waiting.
    #[error("SK_ERR_602: Notifier closed")]
    NotifierClosed,

    // =================================================================
    // Supply / Registry / Timer Errors (7xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical safety alert.
    #[error("SK_ERR_700: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// The board has no entry for this ID.
    #[error("SK_ERR_701: Board id not found: {0}")]
    BoardIdNotFound(String),

    /// The board ID failed its checksum.
    #[error("SK_ERR_702: Malformed board id: {0}")]
    InvalidBoardId(String),

    /// An `AfterDeadline` exit names a timer the runtime does not know.
    #[error("SK_ERR_703: Timer not found: {0}")]
    TimerNotFound(TimerId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SK_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SK_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SK_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("SK_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SeatkeeperError>;

impl From<std::io::Error> for SeatkeeperError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SeatkeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
