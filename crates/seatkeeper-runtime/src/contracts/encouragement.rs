//! Encouragement: hands out messages, and an `Assurance` token to anyone
//! who tips.
//!
//! The creator invitation records the creator seat, which collects tips.
//! Each `encourage` offer publishes `{messages, count}` on the notifier.

use async_trait::async_trait;
use seatkeeper_ledger::IssuerKit;
use seatkeeper_types::{Allocation, Amount, AssetKind, Brand, Result, SeatId, SeatkeeperError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contract::{Contract, ContractContext, OfferResult};
use crate::instance::FacetHandle;
use crate::invitation::{Invitation, OfferHandler};
use crate::notifier::{Notifier, Updater, notifier_kit};

pub const TIP: &str = "Tip";
pub const ASSURANCE: &str = "Assurance";

const CREATOR: &str = "creator";
const ENCOURAGE: &str = "encourage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    pub basic: String,
    pub premium: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            basic: "You're doing great!".to_string(),
            premium: "Wow, just wow. I have never seen such talent!".to_string(),
        }
    }
}

/// Published after every encouragement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncouragementState {
    pub messages: Messages,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncouragementRequest {
    MakeInvitation,
    GetFreeEncouragement,
    AssuranceBrand,
    Notifier,
}

#[derive(Debug)]
pub enum EncouragementResponse {
    Invitation(Invitation),
    Message(String),
    Brand(Brand),
    Notifier(Notifier<EncouragementState>),
}

pub struct Encouragement {
    messages: Messages,
    count: u64,
    creator: Option<SeatId>,
    assurance: IssuerKit,
    notifier: Notifier<EncouragementState>,
    updater: Updater<EncouragementState>,
}

impl Encouragement {
    fn state(&self) -> EncouragementState {
        EncouragementState {
            messages: self.messages.clone(),
            count: self.count,
        }
    }

    fn bump(&mut self) {
        self.count += 1;
        if let Err(error) = self.updater.update_state(self.state()) {
            warn!(%error, "encouragement state not published");
        }
    }

    fn encourage(&mut self, seat: SeatId, ctx: &mut ContractContext) -> Result<OfferResult> {
        let creator = self
            .creator
            .filter(|creator| matches!(ctx.ledger().has_exited(*creator), Ok(false)))
            .ok_or_else(|| SeatkeeperError::OfferRejected {
                reason: "We are no longer giving encouragement".to_string(),
            })?;

        let tip_brand = ctx.brand(TIP)?.clone();
        let tip = ctx.ledger().amount_allocated(seat, TIP, &tip_brand)?;
        let premium = tip.is_gte(&Amount::nat(&tip_brand, 1)?)?;

        if premium {
            let token = Amount::set(self.assurance.brand(), [(self.count + 1).to_string()])?;
            ctx.mint_gains(&mut self.assurance, creator, ASSURANCE, token.clone())?;

            let creator_tips = ctx.ledger().amount_allocated(creator, TIP, &tip_brand)?;
            let creator_target = ctx.ledger().stage(
                creator,
                Allocation::from([
                    (TIP.to_string(), creator_tips.add(&tip)?),
                    (ASSURANCE.to_string(), Amount::empty(self.assurance.brand())),
                ]),
            )?;
            let user_target = ctx.ledger().stage(
                seat,
                Allocation::from([
                    (TIP.to_string(), Amount::empty(&tip_brand)),
                    (ASSURANCE.to_string(), token),
                ]),
            )?;
            ctx.reallocate(vec![(creator, creator_target), (seat, user_target)])?;
        }

        ctx.exit_seat(seat)?;
        self.bump();
        info!(%seat, premium, count = self.count, "encouraged");
        let message = if premium {
            &self.messages.premium
        } else {
            &self.messages.basic
        };
        Ok(OfferResult::Message(message.clone()))
    }
}

#[async_trait]
impl Contract for Encouragement {
    type Params = Messages;
    type Request = EncouragementRequest;
    type Response = EncouragementResponse;

    const NAME: &'static str = "encouragement";

    fn start(messages: Messages, ctx: &mut ContractContext) -> Result<(Self, Option<Invitation>)> {
        ctx.brand(TIP)?;
        let (notifier, updater) = notifier_kit(Some(EncouragementState {
            messages: messages.clone(),
            count: 0,
        }));
        let creator_invitation = ctx.make_invitation(
            OfferHandler::new(CREATOR),
            "creator",
            serde_json::Value::Null,
            None,
        );
        let contract = Self {
            messages,
            count: 0,
            creator: None,
            assurance: IssuerKit::new(ASSURANCE, AssetKind::Set),
            notifier,
            updater,
        };
        Ok((contract, Some(creator_invitation)))
    }

    fn handle_offer(
        &mut self,
        handler: &OfferHandler,
        seat: SeatId,
        ctx: &mut ContractContext,
    ) -> Result<OfferResult> {
        match handler.name.as_str() {
            CREATOR => {
                self.creator = Some(seat);
                Ok(OfferResult::Message("creator invitation redeemed".to_string()))
            }
            ENCOURAGE => self.encourage(seat, ctx),
            other => Err(SeatkeeperError::UnknownHandler(other.to_string())),
        }
    }

    async fn handle_request(
        &mut self,
        request: EncouragementRequest,
        ctx: &mut ContractContext,
    ) -> Result<EncouragementResponse> {
        Ok(match request {
            EncouragementRequest::MakeInvitation => {
                EncouragementResponse::Invitation(ctx.make_invitation(
                    OfferHandler::new(ENCOURAGE),
                    "encouragement",
                    serde_json::Value::Null,
                    None,
                ))
            }
            EncouragementRequest::GetFreeEncouragement => {
                self.bump();
                EncouragementResponse::Message(self.messages.basic.clone())
            }
            EncouragementRequest::AssuranceBrand => {
                EncouragementResponse::Brand(self.assurance.brand().clone())
            }
            EncouragementRequest::Notifier => EncouragementResponse::Notifier(self.notifier.clone()),
        })
    }
}

fn unexpected(response: &EncouragementResponse) -> SeatkeeperError {
    SeatkeeperError::Internal(format!("unexpected encouragement response: {response:?}"))
}

impl FacetHandle<Encouragement> {
    pub async fn make_invitation(&self) -> Result<Invitation> {
        match self.call(EncouragementRequest::MakeInvitation).await? {
            EncouragementResponse::Invitation(invitation) => Ok(invitation),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_free_encouragement(&self) -> Result<String> {
        match self.call(EncouragementRequest::GetFreeEncouragement).await? {
            EncouragementResponse::Message(message) => Ok(message),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn assurance_brand(&self) -> Result<Brand> {
        match self.call(EncouragementRequest::AssuranceBrand).await? {
            EncouragementResponse::Brand(brand) => Ok(brand),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn notifier(&self) -> Result<Notifier<EncouragementState>> {
        match self.call(EncouragementRequest::Notifier).await? {
            EncouragementResponse::Notifier(notifier) => Ok(notifier),
            other => Err(unexpected(&other)),
        }
    }
}
