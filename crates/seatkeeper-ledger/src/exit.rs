//! Seat exit and payouts.
//!
//! Exiting moves a seat ACTIVE → EXITING → EXITED and turns its final
//! allocation into one payment per keyword. Payments are withdrawn once
//! each; the final allocation stays readable forever.

use std::collections::BTreeMap;

use seatkeeper_types::{Allocation, Amount, Keyword, Result, SeatId, SeatkeeperError};
use tracing::{debug, info, warn};

use crate::issuer::{Payment, PaymentRecord};
use crate::seat_ledger::SeatLedger;

/// Payouts of one exited seat.
#[derive(Debug)]
pub struct PayoutBook {
    final_allocation: Allocation,
    /// `None` once withdrawn.
    payments: BTreeMap<Keyword, Option<Payment>>,
}

impl PayoutBook {
    fn new(final_allocation: Allocation) -> Self {
        let payments = final_allocation
            .iter()
            .map(|(keyword, amount)| (keyword.clone(), Some(Payment::new(amount.clone()))))
            .collect();
        Self {
            final_allocation,
            payments,
        }
    }

    #[must_use]
    pub fn final_allocation(&self) -> &Allocation {
        &self.final_allocation
    }

    /// Amounts not yet withdrawn.
    pub fn pending_amounts(&self) -> impl Iterator<Item = &Amount> + '_ {
        self.payments.values().flatten().map(Payment::amount)
    }
}

impl SeatLedger {
    /// Close an active seat and build its payouts.
    ///
    /// # Errors
    /// `SeatNotFound`, or `SeatClosed` if the seat is not active.
    pub fn exit_seat(&mut self, id: SeatId) -> Result<Allocation> {
        let seat = self
            .seats
            .get_mut(&id)
            .ok_or(SeatkeeperError::SeatNotFound(id))?;
        seat.mark_exiting()?;
        let final_allocation = seat.allocation.clone();
        self.payouts
            .insert(id, PayoutBook::new(final_allocation.clone()));
        seat.mark_exited()?;
        info!(seat = %id, keywords = final_allocation.len(), "seat exited");
        Ok(final_allocation)
    }

    /// Exit a seat because of `error` and hand the error back.
    ///
    /// The seat keeps its current allocation, which becomes its payout. A
    /// seat that already exited is left alone.
    pub fn kick_out(&mut self, id: SeatId, error: SeatkeeperError) -> SeatkeeperError {
        warn!(seat = %id, error = %error, "kicking out seat");
        match self.exit_seat(id) {
            Ok(_) | Err(SeatkeeperError::SeatClosed(_)) => {}
            Err(exit_error) => {
                warn!(seat = %id, error = %exit_error, "kick out could not exit seat");
            }
        }
        error
    }

    /// Drop an exited seat whose payouts hold nothing more.
    pub(crate) fn forget_drained(&mut self, id: SeatId) {
        let drained = self
            .payouts
            .get(&id)
            .is_some_and(|book| book.pending_amounts().all(Amount::is_empty));
        if drained {
            self.payouts.remove(&id);
            self.seats.remove(&id);
            debug!(seat = %id, "drained seat forgotten");
        }
    }

    fn payout_book(&mut self, id: SeatId) -> Result<&mut PayoutBook> {
        self.seat(id)?;
        self.payouts
            .get_mut(&id)
            .ok_or(SeatkeeperError::PayoutNotReady(id))
    }

    /// Take the payment for one keyword.
    ///
    /// # Errors
    /// `PayoutNotReady` before exit, `UnknownKeyword`, or
    /// `AlreadyWithdrawn` on the second call.
    pub fn withdraw_payout(&mut self, id: SeatId, keyword: &str) -> Result<Payment> {
        let book = self.payout_book(id)?;
        let slot = book
            .payments
            .get_mut(keyword)
            .ok_or_else(|| SeatkeeperError::UnknownKeyword {
                seat: id,
                keyword: keyword.to_string(),
            })?;
        slot.take().ok_or_else(|| SeatkeeperError::AlreadyWithdrawn {
            seat: id,
            keyword: keyword.to_string(),
        })
    }

    /// Take every payment not yet withdrawn.
    ///
    /// # Errors
    /// `PayoutNotReady` before exit.
    pub fn withdraw_all_payouts(&mut self, id: SeatId) -> Result<PaymentRecord> {
        let book = self.payout_book(id)?;
        Ok(book
            .payments
            .iter_mut()
            .filter_map(|(keyword, slot)| slot.take().map(|p| (keyword.clone(), p)))
            .collect())
    }

    /// The allocation the seat exited with. Same answer on every call.
    ///
    /// # Errors
    /// `SeatNotFound`, or `PayoutNotReady` before exit.
    pub fn final_allocation(&self, id: SeatId) -> Result<Allocation> {
        self.seat(id)?;
        self.payouts
            .get(&id)
            .map(|book| book.final_allocation().clone())
            .ok_or(SeatkeeperError::PayoutNotReady(id))
    }
}
