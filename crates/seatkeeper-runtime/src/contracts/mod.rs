//! Contracts shipped with the runtime.
//!
//! - [`Encouragement`]: messages for tips, minting `Assurance` tokens
//! - [`CoveredCall`]: an option on escrowed assets, expiring at a deadline
//! - [`OtcDesk`]: a market maker quoting covered calls from its inventory

pub mod covered_call;
pub mod encouragement;
pub mod otc_desk;

pub use covered_call::{CoveredCall, CoveredCallRequest};
pub use encouragement::{
    Encouragement, EncouragementRequest, EncouragementResponse, EncouragementState, Messages,
};
pub use otc_desk::{OtcDesk, OtcDeskParams, OtcDeskRequest, OtcDeskResponse};
