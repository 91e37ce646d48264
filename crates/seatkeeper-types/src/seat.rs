//! # Seat: the escrow record
//!
//! A `Seat` holds one party's proposal and current allocation inside one
//! contract instance.
//!
//! ## State Machine
//!
//! ```text
//!   ┌────────┐  exit / kick out / deadline   ┌─────────┐  payouts built  ┌────────┐
//!   │ ACTIVE ├──────────────────────────────▶│ EXITING ├────────────────▶│ EXITED │
//!   └────────┘                               └─────────┘                 └────────┘
//! ```
//!
//! Transitions are monotonic. An `Exited` seat is immutable: its final
//! allocation is what the owner's payouts are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Allocation, Proposal, Result, SeatId, SeatkeeperError};

/// The lifecycle state of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatStatus {
    /// Escrow is live; the seat can take part in reallocations.
    Active,
    /// Exit has started; payouts are being built.
    Exiting,
    /// Terminal. The allocation is frozen and paid out.
    Exited,
}

impl SeatStatus {
    /// Can a seat in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Exiting) | (Self::Exiting, Self::Exited)
        )
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Exiting => write!(f, "EXITING"),
            Self::Exited => write!(f, "EXITED"),
        }
    }
}

/// One escrow record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    /// Declared at creation, never modified.
    pub proposal: Proposal,
    /// Current per-keyword holdings.
    pub allocation: Allocation,
    pub status: SeatStatus,
    pub created_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl Seat {
    #[must_use]
    pub fn new(proposal: Proposal, allocation: Allocation) -> Self {
        Self {
            id: SeatId::new(),
            proposal,
            allocation,
            status: SeatStatus::Active,
            created_at: Utc::now(),
            exited_at: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SeatStatus::Active
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.status == SeatStatus::Exited
    }

    /// Attempt to transition to EXITING.
    ///
    /// # Errors
    /// Returns `SeatClosed` if the seat is not Active.
    pub fn mark_exiting(&mut self) -> Result<()> {
        if !self.status.can_transition_to(SeatStatus::Exiting) {
            return Err(SeatkeeperError::SeatClosed(self.id));
        }
        self.status = SeatStatus::Exiting;
        Ok(())
    }

    /// Attempt to transition to EXITED.
    ///
    /// # Errors
    /// Returns `Internal` if the seat is not Exiting.
    pub fn mark_exited(&mut self) -> Result<()> {
        if !self.status.can_transition_to(SeatStatus::Exited) {
            return Err(SeatkeeperError::Internal(format!(
                "Cannot transition seat {} from {} to EXITED",
                self.id, self.status
            )));
        }
        self.status = SeatStatus::Exited;
        self.exited_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        assert!(SeatStatus::Active.can_transition_to(SeatStatus::Exiting));
        assert!(SeatStatus::Exiting.can_transition_to(SeatStatus::Exited));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!SeatStatus::Active.can_transition_to(SeatStatus::Exited));
        assert!(!SeatStatus::Exited.can_transition_to(SeatStatus::Active));
        assert!(!SeatStatus::Exited.can_transition_to(SeatStatus::Exiting));
        assert!(!SeatStatus::Exiting.can_transition_to(SeatStatus::Active));
    }

    #[test]
    fn full_exit_sequence() {
        let mut seat = Seat::new(Proposal::default(), Allocation::new());
        assert!(seat.is_active());
        seat.mark_exiting().unwrap();
        seat.mark_exited().unwrap();
        assert!(seat.has_exited());
        assert!(seat.exited_at.is_some());
    }

    #[test]
    fn exited_seat_cannot_exit_again() {
        let mut seat = Seat::new(Proposal::default(), Allocation::new());
        seat.mark_exiting().unwrap();
        seat.mark_exited().unwrap();
        let err = seat.mark_exiting().unwrap_err();
        assert!(matches!(err, SeatkeeperError::SeatClosed(id) if id == seat.id));
    }

    #[test]
    fn cannot_skip_exiting() {
        let mut seat = Seat::new(Proposal::default(), Allocation::new());
        assert!(seat.mark_exited().is_err());
        assert!(seat.is_active());
    }
}
