//! # seatkeeper-types
//!
//! Shared types, errors, and configuration for the **Seatkeeper** escrow
//! kernel.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`SeatId`], [`InstanceId`], [`InstallationId`], [`InvitationId`], [`BrandId`], [`TimerId`]
//! - **Asset model**: [`Brand`], [`AssetKind`], [`Amount`], [`AmountValue`], [`Allocation`]
//! - **Proposal model**: [`Proposal`], [`ExitRule`], [`ProposalShape`]
//! - **Seat model**: [`Seat`], [`SeatStatus`]
//! - **Notifications**: [`UpdateRecord`]
//! - **Configuration**: [`RuntimeConfig`]
//! - **Errors**: [`SeatkeeperError`] with `SK_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod amount;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod notification;
pub mod proposal;
pub mod seat;

// Re-export all primary types at crate root for ergonomic imports:
//   use seatkeeper_types::{Amount, Brand, Proposal, Seat, ...};

pub use amount::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use notification::*;
pub use proposal::*;
pub use seat::*;

// Constants are accessed via `seatkeeper_types::constants::FOO`
// (not re-exported to avoid name collisions).
