//! Covered call option.
//!
//! The seller escrows the underlying assets with an `AfterDeadline` exit
//! and receives an option invitation. Whoever exercises it before the
//! deadline pays the strike price and takes the assets. Past the deadline
//! the seller's seat exits and the assets go back to the seller.

use async_trait::async_trait;
use seatkeeper_types::{ExitKind, ExitRule, ProposalShape, Result, SeatId, SeatkeeperError};
use serde_json::json;
use tracing::info;

use crate::contract::{Contract, ContractContext, OfferResult};
use crate::invitation::{Invitation, OfferHandler};

const MAKE_CALL_OPTION: &str = "makeCallOption";
const EXERCISE_OPTION: &str = "exerciseOption";

/// The covered call has no public facet requests.
#[derive(Debug)]
pub enum CoveredCallRequest {}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoveredCall;

impl CoveredCall {
    fn make_call_option(seat: SeatId, ctx: &ContractContext) -> Result<OfferResult> {
        let proposal = &ctx.ledger().seat(seat)?.proposal;
        let ExitRule::AfterDeadline { timer, deadline } = proposal.exit else {
            return Err(SeatkeeperError::ExitRuleViolation {
                seat,
                reason: "a covered call needs an AFTER_DEADLINE exit".to_string(),
            });
        };
        let terms = json!({
            "underlyingAssets": serde_json::to_value(&proposal.give)?,
            "strikePrice": serde_json::to_value(&proposal.want)?,
            "timeAuthority": timer.to_string(),
            "expirationDate": deadline,
        });
        let option = ctx.make_invitation(
            OfferHandler::new(EXERCISE_OPTION).bound_to(seat),
            EXERCISE_OPTION,
            terms,
            None,
        );
        info!(%seat, deadline, "call option written");
        Ok(OfferResult::Invitation(option))
    }

    fn exercise_option(
        handler: &OfferHandler,
        buyer: SeatId,
        ctx: &mut ContractContext,
    ) -> Result<OfferResult> {
        let seller = handler
            .bound_seat
            .ok_or_else(|| SeatkeeperError::Internal("option invitation lost its seat".into()))?;
        if ctx.ledger().has_exited(seller)? {
            return Err(SeatkeeperError::OfferRejected {
                reason: "The covered call option is expired".to_string(),
            });
        }
        ctx.swap_exact(seller, buyer)?;
        ctx.exit_seat(seller)?;
        ctx.exit_seat(buyer)?;
        info!(%seller, %buyer, "call option exercised");
        Ok(OfferResult::Message(
            "The option was exercised. Please collect the assets in your payout.".to_string(),
        ))
    }
}

#[async_trait]
impl Contract for CoveredCall {
    type Params = ();
    type Request = CoveredCallRequest;
    type Response = ();

    const NAME: &'static str = "covered-call";

    fn start(_params: (), ctx: &mut ContractContext) -> Result<(Self, Option<Invitation>)> {
        let creator = ctx.make_invitation(
            OfferHandler::new(MAKE_CALL_OPTION),
            MAKE_CALL_OPTION,
            serde_json::Value::Null,
            Some(ProposalShape::new().exit(ExitKind::AfterDeadline)),
        );
        Ok((Self, Some(creator)))
    }

    fn handle_offer(
        &mut self,
        handler: &OfferHandler,
        seat: SeatId,
        ctx: &mut ContractContext,
    ) -> Result<OfferResult> {
        match handler.name.as_str() {
            MAKE_CALL_OPTION => Self::make_call_option(seat, ctx),
            EXERCISE_OPTION => Self::exercise_option(handler, seat, ctx),
            other => Err(SeatkeeperError::UnknownHandler(other.to_string())),
        }
    }

    async fn handle_request(
        &mut self,
        request: CoveredCallRequest,
        _ctx: &mut ContractContext,
    ) -> Result<()> {
        match request {}
    }
}
