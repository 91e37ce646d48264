//! # seatkeeper-ledger
//!
//! **Settlement plane**: issuers, the per-instance seat ledger, atomic
//! reallocation, exits and payouts.
//!
//! ## Architecture
//!
//! A contract instance owns one [`SeatLedger`]. Every value movement goes
//! through it:
//! 1. Payments minted by an [`IssuerKit`] are escrowed into a seat
//! 2. The proposal is validated; a bad seat is kicked out with a refund
//! 3. Contract logic stages new allocations and calls `reallocate`
//! 4. Per-brand totals are checked against one snapshot, then committed
//! 5. Exited seats turn their final allocation into one-shot payouts
//!
//! [`SupplyConservation`] backs each issuer so callers can check that
//! live payments plus held allocations still equal minted minus burned.

pub mod exit;
pub mod issuer;
pub mod reallocation;
pub mod seat_ledger;
pub mod supply_conservation;

pub use exit::PayoutBook;
pub use issuer::{IssuerKit, Payment, PaymentRecord};
pub use reallocation::{TradeLeg, add_records, subtract_records};
pub use seat_ledger::{Rejection, SeatLedger};
pub use supply_conservation::SupplyConservation;
