//! # seatkeeper-runtime
//!
//! **Capability plane** of the Seatkeeper escrow kernel.
//!
//! - [`EscrowService`]: installs contracts, starts instances, redeems invitations
//! - [`InvitationIssuer`]: the arena of single-use invitations, with inspection and claim
//! - [`Contract`] / [`ContractContext`]: the seam between contract logic and its ledger
//! - [`UserSeat`]: a party's handle on its seat, offer result and payouts
//! - [`Notifier`]: versioned, pull-based state publication
//! - [`TimerService`]: deadline wakeups ([`ManualTimer`], [`WallClockTimer`])
//! - [`Board`]: shared id ↔ value registry
//!
//! ## Offer lifecycle
//!
//! ```text
//!  offer(invitation, proposal, payments)
//!        │
//!        ▼
//!  ┌───────────┐   escrow   ┌────────────┐  handler ok  ┌─────────────┐
//!  │  redeem   │──────────▶ │ seat ACTIVE│─────────────▶│ offer result│
//!  └───────────┘            └────────────┘              └─────────────┘
//!        │ error                  │ error / deadline / exit
//!        ▼                        ▼
//!  kicked out, refunded     EXITED, payouts ready
//! ```
//!
//! Each instance is one tokio task; its mailbox serializes every ledger
//! call.

pub mod board;
pub mod clock;
pub mod contract;
pub mod contracts;
pub mod instance;
pub mod invitation;
pub mod notifier;
pub mod seat;
pub mod service;

pub use board::{Board, BoardId, BoardValue};
pub use clock::{ManualTimer, TimerService, WallClockTimer, Wakeup};
pub use contract::{Contract, ContractContext, OfferResult};
pub use instance::{FacetHandle, InstanceRef, StartedInstance};
pub use invitation::{Invitation, InvitationDetails, InvitationIssuer, OfferHandler};
pub use notifier::{Notifier, Updater, notifier_kit};
pub use seat::UserSeat;
pub use service::{EscrowService, Installation};
