//! OTC desk: a market maker that sells covered call options against its
//! own inventory.
//!
//! Inventory lives in one `Waived` seat. A quote withdraws the quoted
//! assets, escrows them in a fresh covered-call instance and returns the
//! option invitation. A spawned sweep waits for the option seat to exit
//! (exercised or expired) and deposits whatever it paid out back into
//! inventory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use seatkeeper_ledger::{TradeLeg, subtract_records};
use seatkeeper_types::{
    Allocation, Brand, ExitRule, Keyword, Proposal, ProposalShape, Result, SeatId,
    SeatkeeperError, TimerId,
};
use tracing::{info, warn};

use crate::contract::{Contract, ContractContext, OfferResult};
use crate::contracts::covered_call::CoveredCall;
use crate::instance::FacetHandle;
use crate::invitation::{Invitation, OfferHandler};
use crate::notifier::{Notifier, Updater, notifier_kit};
use crate::service::Installation;

const ADD_INVENTORY: &str = "addInventory";
const REMOVE_INVENTORY: &str = "removeInventory";

#[derive(Debug, Clone)]
pub struct OtcDeskParams {
    pub covered_call: Installation<CoveredCall>,
}

#[derive(Debug)]
pub enum OtcDeskRequest {
    AddInventoryInvitation {
        issuers: BTreeMap<Keyword, Brand>,
    },
    RemoveInventoryInvitation,
    MakeQuote {
        assets: Allocation,
        price: Allocation,
        timer: TimerId,
        deadline: u64,
    },
    Inventory,
    InventoryNotifier,
}

#[derive(Debug)]
pub enum OtcDeskResponse {
    Invitation(Invitation),
    Inventory(Allocation),
    Notifier(Notifier<Allocation>),
}

pub struct OtcDesk {
    covered_call: Installation<CoveredCall>,
    inventory: SeatId,
    notifier: Notifier<Allocation>,
    updater: Updater<Allocation>,
}

impl OtcDesk {
    fn publish(&self, ctx: &ContractContext) {
        match ctx.ledger().current_allocation(self.inventory) {
            Ok(inventory) => {
                if let Err(error) = self.updater.update_state(inventory) {
                    warn!(%error, "inventory not published");
                }
            }
            Err(error) => warn!(%error, "inventory unreadable"),
        }
    }

    fn add_inventory(&self, seat: SeatId, ctx: &mut ContractContext) -> Result<OfferResult> {
        let added = ctx.ledger().current_allocation(seat)?;
        ctx.trade(
            &TradeLeg::new(self.inventory).gains(added.clone()),
            &TradeLeg::new(seat).losses(added),
        )?;
        ctx.exit_seat(seat)?;
        self.publish(ctx);
        Ok(OfferResult::Message("Inventory added".to_string()))
    }

    /// The caller's `want` decides how much leaves inventory.
    fn remove_inventory(&self, seat: SeatId, ctx: &mut ContractContext) -> Result<OfferResult> {
        let removed = ctx.ledger().seat(seat)?.proposal.want.clone();
        ctx.trade(
            &TradeLeg::new(self.inventory).losses(removed.clone()),
            &TradeLeg::new(seat).gains(removed),
        )?;
        ctx.exit_seat(seat)?;
        self.publish(ctx);
        Ok(OfferResult::Message("Inventory removed".to_string()))
    }

    async fn make_quote(
        &self,
        assets: Allocation,
        price: Allocation,
        timer: TimerId,
        deadline: u64,
        ctx: &mut ContractContext,
    ) -> Result<Invitation> {
        // Inventory must cover the quote before any option instance exists.
        subtract_records(&ctx.ledger().current_allocation(self.inventory)?, &assets)?;

        let service = ctx.service().clone();
        let option_instance = service
            .start_instance(&self.covered_call, ctx.issuers().clone(), ())
            .await?;
        let creator = option_instance.creator_invitation.ok_or_else(|| {
            SeatkeeperError::Internal("covered call started without a creator invitation".into())
        })?;

        let payments = ctx.withdraw_from_seat(self.inventory, assets.clone())?;
        self.publish(ctx);
        let proposal = Proposal::new(assets, price, ExitRule::AfterDeadline { timer, deadline });
        let mut option_seat = service.offer(creator, proposal, payments).await?;
        let outcome = option_seat.take_offer_result();

        // Sweep the option seat's payouts back into inventory, whatever
        // the outcome of the offer was.
        let desk = ctx.self_ref().clone();
        let inventory = self.inventory;
        tokio::spawn(async move {
            let payouts = match option_seat.get_payouts().await {
                Ok(payouts) => payouts,
                Err(error) => {
                    warn!(%error, "option payouts unavailable");
                    return;
                }
            };
            match desk.deposit(inventory, payouts).await {
                Ok(()) => info!(instance = %desk.id(), "sweep completed"),
                Err(error) => warn!(%error, "sweep deposit failed"),
            }
        });

        let option = outcome?.into_invitation()?;
        info!(option = %option.id(), deadline, "quote made");
        Ok(option)
    }
}

#[async_trait]
impl Contract for OtcDesk {
    type Params = OtcDeskParams;
    type Request = OtcDeskRequest;
    type Response = OtcDeskResponse;

    const NAME: &'static str = "otc-desk";

    fn start(params: OtcDeskParams, ctx: &mut ContractContext) -> Result<(Self, Option<Invitation>)> {
        let inventory = ctx.ledger_mut().create_empty_seat(ExitRule::Waived)?;
        let (notifier, updater) = notifier_kit(Some(Allocation::new()));
        let desk = Self {
            covered_call: params.covered_call,
            inventory,
            notifier,
            updater,
        };
        Ok((desk, None))
    }

    fn handle_offer(
        &mut self,
        handler: &OfferHandler,
        seat: SeatId,
        ctx: &mut ContractContext,
    ) -> Result<OfferResult> {
        match handler.name.as_str() {
            ADD_INVENTORY => self.add_inventory(seat, ctx),
            REMOVE_INVENTORY => self.remove_inventory(seat, ctx),
            other => Err(SeatkeeperError::UnknownHandler(other.to_string())),
        }
    }

    async fn handle_request(
        &mut self,
        request: OtcDeskRequest,
        ctx: &mut ContractContext,
    ) -> Result<OtcDeskResponse> {
        Ok(match request {
            OtcDeskRequest::AddInventoryInvitation { issuers } => {
                for (keyword, brand) in issuers {
                    ctx.save_issuer(keyword, brand);
                }
                OtcDeskResponse::Invitation(ctx.make_invitation(
                    OfferHandler::new(ADD_INVENTORY),
                    "add inventory",
                    serde_json::Value::Null,
                    Some(ProposalShape::new().want(Vec::<Keyword>::new())),
                ))
            }
            OtcDeskRequest::RemoveInventoryInvitation => {
                OtcDeskResponse::Invitation(ctx.make_invitation(
                    OfferHandler::new(REMOVE_INVENTORY),
                    "remove inventory",
                    serde_json::Value::Null,
                    Some(ProposalShape::new().give(Vec::<Keyword>::new())),
                ))
            }
            OtcDeskRequest::MakeQuote {
                assets,
                price,
                timer,
                deadline,
            } => OtcDeskResponse::Invitation(
                self.make_quote(assets, price, timer, deadline, ctx).await?,
            ),
            OtcDeskRequest::Inventory => {
                OtcDeskResponse::Inventory(ctx.ledger().current_allocation(self.inventory)?)
            }
            OtcDeskRequest::InventoryNotifier => OtcDeskResponse::Notifier(self.notifier.clone()),
        })
    }

    fn seat_deposited(&mut self, seat: SeatId, ctx: &mut ContractContext) {
        if seat == self.inventory {
            self.publish(ctx);
        }
    }
}

fn unexpected(response: &OtcDeskResponse) -> SeatkeeperError {
    SeatkeeperError::Internal(format!("unexpected otc desk response: {response:?}"))
}

impl FacetHandle<OtcDesk> {
    async fn invitation(&self, request: OtcDeskRequest) -> Result<Invitation> {
        match self.call(request).await? {
            OtcDeskResponse::Invitation(invitation) => Ok(invitation),
            other => Err(unexpected(&other)),
        }
    }

    /// Saves `issuers`, then invites a deposit of everything the caller
    /// gives.
    pub async fn add_inventory_invitation(
        &self,
        issuers: BTreeMap<Keyword, Brand>,
    ) -> Result<Invitation> {
        self.invitation(OtcDeskRequest::AddInventoryInvitation { issuers })
            .await
    }

    pub async fn remove_inventory_invitation(&self) -> Result<Invitation> {
        self.invitation(OtcDeskRequest::RemoveInventoryInvitation)
            .await
    }

    /// Option on `assets` at `price`, exercisable until `deadline` on
    /// `timer`.
    pub async fn make_quote(
        &self,
        assets: Allocation,
        price: Allocation,
        timer: TimerId,
        deadline: u64,
    ) -> Result<Invitation> {
        self.invitation(OtcDeskRequest::MakeQuote {
            assets,
            price,
            timer,
            deadline,
        })
        .await
    }

    pub async fn inventory(&self) -> Result<Allocation> {
        match self.call(OtcDeskRequest::Inventory).await? {
            OtcDeskResponse::Inventory(inventory) => Ok(inventory),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn inventory_notifier(&self) -> Result<Notifier<Allocation>> {
        match self.call(OtcDeskRequest::InventoryNotifier).await? {
            OtcDeskResponse::Notifier(notifier) => Ok(notifier),
            other => Err(unexpected(&other)),
        }
    }
}
