//! The party-side view of a seat.

use seatkeeper_ledger::{Payment, PaymentRecord};
use seatkeeper_types::{Allocation, Result, SeatId, SeatkeeperError};

use crate::contract::OfferResult;
use crate::instance::{CoreCommand, InstanceRef};

/// Returned by `EscrowService::offer`. Every query is a message to the
/// instance that owns the seat.
#[derive(Debug)]
pub struct UserSeat {
    id: SeatId,
    instance: InstanceRef,
    offer_result: Option<Result<OfferResult>>,
}

impl UserSeat {
    pub(crate) fn new(id: SeatId, instance: InstanceRef, offer_result: Result<OfferResult>) -> Self {
        Self {
            id,
            instance,
            offer_result: Some(offer_result),
        }
    }

    #[must_use]
    pub fn id(&self) -> SeatId {
        self.id
    }

    /// The handler's outcome. A rejected offer yields its error here; the
    /// seat has then already exited with a refund.
    ///
    /// # Errors
    /// The offer's error, or `OfferResultTaken` on a second call.
    pub fn take_offer_result(&mut self) -> Result<OfferResult> {
        self.offer_result
            .take()
            .unwrap_or(Err(SeatkeeperError::OfferResultTaken(self.id)))
    }

    pub async fn current_allocation(&self) -> Result<Allocation> {
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::CurrentAllocation { seat, reply })
            .await
    }

    pub async fn has_exited(&self) -> Result<bool> {
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::HasExited { seat, reply })
            .await
    }

    /// Exit now with the current allocation.
    ///
    /// # Errors
    /// `ExitRuleViolation` unless the seat's exit rule is `OnDemand`,
    /// `SeatClosed` if it already exited.
    pub async fn try_exit(&self) -> Result<Allocation> {
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::TryExit { seat, reply })
            .await
    }

    /// Resolves with the final allocation once the seat has exited.
    pub async fn when_exited(&self) -> Result<Allocation> {
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::AwaitExit { seat, reply })
            .await
    }

    /// Take the payout under `keyword`.
    ///
    /// # Errors
    /// `PayoutNotReady` before exit, `AlreadyWithdrawn` on the second call,
    /// `UnknownKeyword` if the final allocation has no such keyword.
    pub async fn get_payout(&self, keyword: &str) -> Result<Payment> {
        let seat = self.id;
        let keyword = keyword.to_string();
        self.instance
            .request(|reply| CoreCommand::WithdrawPayout {
                seat,
                keyword,
                reply,
            })
            .await
    }

    /// Wait for exit, then take every payout not yet withdrawn.
    pub async fn get_payouts(&self) -> Result<PaymentRecord> {
        self.when_exited().await?;
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::WithdrawPayouts { seat, reply })
            .await
    }

    /// The allocation the seat exited with; identical on every call.
    ///
    /// # Errors
    /// `PayoutNotReady` before exit.
    pub async fn final_allocation(&self) -> Result<Allocation> {
        let seat = self.id;
        self.instance
            .request(|reply| CoreCommand::FinalAllocation { seat, reply })
            .await
    }
}
