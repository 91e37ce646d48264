//! The contract seam.
//!
//! A [`Contract`] is the logic of an installation. The runtime drives it
//! from inside the instance actor, handing it a [`ContractContext`] that
//! owns the instance's seat ledger. Offer handlers are synchronous: all
//! their ledger work happens in one actor turn. Facet requests are async
//! so a contract can start sub-instances and make offers to them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use seatkeeper_ledger::{IssuerKit, PaymentRecord, SeatLedger, TradeLeg};
use seatkeeper_types::{
    Allocation, Amount, Brand, InstallationId, InstanceId, Keyword, ProposalShape, Result, SeatId,
    SeatkeeperError,
};
use tracing::debug;

use crate::instance::InstanceRef;
use crate::invitation::{Invitation, InvitationDetails, OfferHandler};
use crate::service::EscrowService;

/// What an offer handler hands back to the party that made the offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferResult {
    Message(String),
    Invitation(Invitation),
}

impl OfferResult {
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(message),
            Self::Invitation(_) => None,
        }
    }

    /// # Errors
    /// `Internal` if the handler returned a message.
    pub fn into_invitation(self) -> Result<Invitation> {
        match self {
            Self::Invitation(invitation) => Ok(invitation),
            Self::Message(message) => Err(SeatkeeperError::Internal(format!(
                "expected an invitation, handler said {message:?}"
            ))),
        }
    }
}

/// Installable contract logic.
#[async_trait]
pub trait Contract: Send + Sized + 'static {
    /// Instance parameters supplied to `start_instance`.
    type Params: Send + 'static;
    /// Public facet requests.
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Name hashed into the installation id.
    const NAME: &'static str;

    /// Build the contract state. May return a creator invitation.
    fn start(params: Self::Params, ctx: &mut ContractContext) -> Result<(Self, Option<Invitation>)>;

    /// Run the handler of a redeemed invitation against the new seat.
    ///
    /// An error kicks the seat out with its allocation refunded.
    fn handle_offer(
        &mut self,
        handler: &OfferHandler,
        seat: SeatId,
        ctx: &mut ContractContext,
    ) -> Result<OfferResult>;

    /// Serve a public facet call.
    async fn handle_request(
        &mut self,
        request: Self::Request,
        ctx: &mut ContractContext,
    ) -> Result<Self::Response>;

    /// Payments were deposited into `seat` from outside an offer.
    fn seat_deposited(&mut self, _seat: SeatId, _ctx: &mut ContractContext) {}
}

/// A contract's handle on its own instance and on the runtime.
pub struct ContractContext {
    instance: InstanceId,
    installation: InstallationId,
    issuers: BTreeMap<Keyword, Brand>,
    ledger: SeatLedger,
    service: EscrowService,
    self_ref: InstanceRef,
}

impl ContractContext {
    pub(crate) fn new(
        installation: InstallationId,
        issuers: BTreeMap<Keyword, Brand>,
        service: EscrowService,
        self_ref: InstanceRef,
    ) -> Self {
        let ledger = SeatLedger::with_brands(issuers.values());
        Self {
            instance: self_ref.id(),
            installation,
            issuers,
            ledger,
            service,
            self_ref,
        }
    }

    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    #[must_use]
    pub fn installation(&self) -> InstallationId {
        self.installation
    }

    #[must_use]
    pub fn issuers(&self) -> &BTreeMap<Keyword, Brand> {
        &self.issuers
    }

    /// The brand registered under `keyword`.
    ///
    /// # Errors
    /// `IssuerNotAccepted` if no issuer was saved under `keyword`.
    pub fn brand(&self, keyword: &str) -> Result<&Brand> {
        self.issuers
            .get(keyword)
            .ok_or_else(|| SeatkeeperError::IssuerNotAccepted {
                brand: keyword.to_string(),
            })
    }

    /// Accept `brand` under `keyword` from now on.
    pub fn save_issuer(&mut self, keyword: impl Into<Keyword>, brand: Brand) {
        let keyword = keyword.into();
        debug!(instance = %self.instance, keyword = %keyword, brand = %brand, "issuer saved");
        self.ledger.accept_brand(brand.clone());
        self.issuers.insert(keyword, brand);
    }

    #[must_use]
    pub fn service(&self) -> &EscrowService {
        &self.service
    }

    /// Handle to this instance's own mailbox, for spawned continuations.
    #[must_use]
    pub fn self_ref(&self) -> &InstanceRef {
        &self.self_ref
    }

    #[must_use]
    pub fn ledger(&self) -> &SeatLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut SeatLedger {
        &mut self.ledger
    }

    /// Mint one invitation into `handler`.
    pub fn make_invitation(
        &self,
        handler: OfferHandler,
        description: impl Into<String>,
        custom_terms: serde_json::Value,
        shape: Option<ProposalShape>,
    ) -> Invitation {
        self.service.invitation_issuer().issue(InvitationDetails {
            invitation: seatkeeper_types::InvitationId::new(),
            description: description.into(),
            installation: self.installation,
            instance: self.instance,
            handler,
            custom_terms,
            shape,
        })
    }

    // -- ledger shorthands used by offer handlers -------------------------

    pub fn reallocate(&mut self, staged: Vec<(SeatId, Allocation)>) -> Result<()> {
        self.ledger.reallocate(staged)
    }

    pub fn trade(&mut self, left: &TradeLeg, right: &TradeLeg) -> Result<()> {
        self.ledger.trade(left, right)
    }

    pub fn swap_exact(&mut self, left: SeatId, right: SeatId) -> Result<()> {
        self.ledger.swap_exact(left, right)
    }

    pub fn exit_seat(&mut self, seat: SeatId) -> Result<Allocation> {
        self.ledger.exit_seat(seat)
    }

    pub fn withdraw_from_seat(&mut self, seat: SeatId, amounts: Allocation) -> Result<PaymentRecord> {
        self.ledger.withdraw_from_seat(seat, amounts)
    }

    /// Move `payments` into `seat`. On failure the payments stay in a
    /// kicked-out holding seat of this ledger.
    pub fn deposit_to_seat(&mut self, seat: SeatId, payments: PaymentRecord) -> Result<()> {
        self.ledger
            .deposit_to_seat(seat, payments)
            .map_err(SeatkeeperError::from)
    }

    pub fn mint_gains(
        &mut self,
        kit: &mut IssuerKit,
        seat: SeatId,
        keyword: &str,
        amount: Amount,
    ) -> Result<()> {
        self.ledger.mint_gains(kit, seat, keyword, amount)
    }

    /// Exit `seat` with a refund and produce the `OfferRejected` to return.
    pub fn kick_out(&mut self, seat: SeatId, reason: impl Into<String>) -> SeatkeeperError {
        self.ledger.kick_out(
            seat,
            SeatkeeperError::OfferRejected {
                reason: reason.into(),
            },
        )
    }
}
