//! Instance actors.
//!
//! Every contract instance runs as one tokio task that owns its
//! [`ContractContext`] (and so its seat ledger). Two mailboxes feed it:
//!
//! - **core**: unbounded; offers, seat queries, deadline wakeups and
//!   deposits. Timer callbacks send here synchronously.
//! - **facet**: bounded by `facet_mailbox_capacity`; typed public facet
//!   calls for the contract.
//!
//! One message is handled at a time, so every ledger call is serialized.

use std::fmt;

use seatkeeper_ledger::{Payment, PaymentRecord};
use seatkeeper_types::{
    Allocation, ExitRule, InstanceId, Proposal, Result, SeatId, SeatkeeperError,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::contract::{Contract, ContractContext, OfferResult};
use crate::invitation::{Invitation, InvitationDetails};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Messages on an instance's core mailbox.
pub(crate) enum CoreCommand {
    Offer {
        /// Outcome of redeeming the invitation; an error still escrows.
        redeemed: Result<InvitationDetails>,
        proposal: Proposal,
        payments: PaymentRecord,
        reply: oneshot::Sender<(SeatId, Result<OfferResult>)>,
    },
    TryExit {
        seat: SeatId,
        reply: Reply<Allocation>,
    },
    DeadlineReached {
        seat: SeatId,
        now: u64,
    },
    HasExited {
        seat: SeatId,
        reply: Reply<bool>,
    },
    CurrentAllocation {
        seat: SeatId,
        reply: Reply<Allocation>,
    },
    AwaitExit {
        seat: SeatId,
        reply: Reply<Allocation>,
    },
    WithdrawPayout {
        seat: SeatId,
        keyword: String,
        reply: Reply<Payment>,
    },
    WithdrawPayouts {
        seat: SeatId,
        reply: Reply<PaymentRecord>,
    },
    FinalAllocation {
        seat: SeatId,
        reply: Reply<Allocation>,
    },
    Deposit {
        seat: SeatId,
        payments: PaymentRecord,
        reply: Reply<()>,
    },
}

/// Untyped handle on an instance's core mailbox.
#[derive(Debug, Clone)]
pub struct InstanceRef {
    id: InstanceId,
    core: mpsc::UnboundedSender<CoreCommand>,
}

impl fmt::Debug for CoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Offer { .. } => "Offer",
            Self::TryExit { .. } => "TryExit",
            Self::DeadlineReached { .. } => "DeadlineReached",
            Self::HasExited { .. } => "HasExited",
            Self::CurrentAllocation { .. } => "CurrentAllocation",
            Self::AwaitExit { .. } => "AwaitExit",
            Self::WithdrawPayout { .. } => "WithdrawPayout",
            Self::WithdrawPayouts { .. } => "WithdrawPayouts",
            Self::FinalAllocation { .. } => "FinalAllocation",
            Self::Deposit { .. } => "Deposit",
        };
        f.write_str(name)
    }
}

impl InstanceRef {
    pub(crate) fn new(id: InstanceId, core: mpsc::UnboundedSender<CoreCommand>) -> Self {
        Self { id, core }
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn send(&self, command: CoreCommand) -> Result<()> {
        self.core
            .send(command)
            .map_err(|_| SeatkeeperError::InstanceNotFound(self.id))
    }

    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> CoreCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response
            .await
            .map_err(|_| SeatkeeperError::InstanceNotFound(self.id))?
    }

    /// Move `payments` into one of this instance's seats. The contract is
    /// told through [`Contract::seat_deposited`].
    ///
    /// # Errors
    /// `InstanceNotFound`, or the ledger's deposit error. Payments that
    /// could not be deposited stay in a kicked-out holding seat.
    pub async fn deposit(&self, seat: SeatId, payments: PaymentRecord) -> Result<()> {
        self.request(|reply| CoreCommand::Deposit {
            seat,
            payments,
            reply,
        })
        .await
    }
}

/// A facet call waiting in the bounded mailbox.
pub(crate) struct FacetCall<C: Contract> {
    request: C::Request,
    reply: Reply<C::Response>,
}

/// Typed handle on an instance's public facet.
pub struct FacetHandle<C: Contract> {
    instance: InstanceId,
    calls: mpsc::Sender<FacetCall<C>>,
}

impl<C: Contract> Clone for FacetHandle<C> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance,
            calls: self.calls.clone(),
        }
    }
}

impl<C: Contract> fmt::Debug for FacetHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetHandle")
            .field("contract", &C::NAME)
            .field("instance", &self.instance)
            .finish()
    }
}

impl<C: Contract> FacetHandle<C> {
    pub(crate) fn new(instance: InstanceId, calls: mpsc::Sender<FacetCall<C>>) -> Self {
        Self { instance, calls }
    }

    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Send a request and wait for the contract's answer. Waits for room
    /// when the mailbox is full.
    ///
    /// # Errors
    /// `InstanceNotFound` if the actor is gone, or the contract's error.
    pub async fn call(&self, request: C::Request) -> Result<C::Response> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send(FacetCall { request, reply })
            .await
            .map_err(|_| SeatkeeperError::InstanceNotFound(self.instance))?;
        response
            .await
            .map_err(|_| SeatkeeperError::InstanceNotFound(self.instance))?
    }
}

/// What `start_instance` hands back.
pub struct StartedInstance<C: Contract> {
    pub instance: InstanceId,
    pub creator_invitation: Option<Invitation>,
    pub facet: FacetHandle<C>,
}

impl<C: Contract> fmt::Debug for StartedInstance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartedInstance")
            .field("instance", &self.instance)
            .field("creator_invitation", &self.creator_invitation)
            .field("facet", &self.facet)
            .finish()
    }
}

struct InstanceActor<C: Contract> {
    contract: C,
    ctx: ContractContext,
    core: mpsc::UnboundedReceiver<CoreCommand>,
    facet: mpsc::Receiver<FacetCall<C>>,
    exit_waiters: Vec<(SeatId, Reply<Allocation>)>,
}

/// Spawn the actor for an already started contract.
pub(crate) fn spawn<C: Contract>(
    contract: C,
    ctx: ContractContext,
    core: mpsc::UnboundedReceiver<CoreCommand>,
    facet: mpsc::Receiver<FacetCall<C>>,
) {
    let actor = InstanceActor {
        contract,
        ctx,
        core,
        facet,
        exit_waiters: Vec::new(),
    };
    tokio::spawn(actor.run());
}

impl<C: Contract> InstanceActor<C> {
    async fn run(mut self) {
        let instance = self.ctx.instance();
        debug!(%instance, contract = C::NAME, "instance actor running");
        loop {
            tokio::select! {
                Some(command) = self.core.recv() => self.handle_core(command).await,
                Some(call) = self.facet.recv() => {
                    let result = self.contract.handle_request(call.request, &mut self.ctx).await;
                    let _ = call.reply.send(result);
                }
                else => break,
            }
            self.resolve_exit_waiters();
        }
        info!(%instance, "instance actor stopped");
    }

    async fn handle_core(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Offer {
                redeemed,
                proposal,
                payments,
                reply,
            } => {
                let outcome = self.offer(redeemed, proposal, payments).await;
                let _ = reply.send(outcome);
            }
            CoreCommand::TryExit { seat, reply } => {
                let _ = reply.send(self.try_exit(seat));
            }
            CoreCommand::DeadlineReached { seat, now } => self.deadline_reached(seat, now),
            CoreCommand::HasExited { seat, reply } => {
                let _ = reply.send(self.ctx.ledger().has_exited(seat));
            }
            CoreCommand::CurrentAllocation { seat, reply } => {
                let _ = reply.send(self.ctx.ledger().current_allocation(seat));
            }
            CoreCommand::AwaitExit { seat, reply } => match self.ctx.ledger().seat(seat) {
                Ok(_) => self.exit_waiters.push((seat, reply)),
                Err(error) => {
                    let _ = reply.send(Err(error));
                }
            },
            CoreCommand::WithdrawPayout {
                seat,
                keyword,
                reply,
            } => {
                let _ = reply.send(self.ctx.ledger_mut().withdraw_payout(seat, &keyword));
            }
            CoreCommand::WithdrawPayouts { seat, reply } => {
                let _ = reply.send(self.ctx.ledger_mut().withdraw_all_payouts(seat));
            }
            CoreCommand::FinalAllocation { seat, reply } => {
                let _ = reply.send(self.ctx.ledger().final_allocation(seat));
            }
            CoreCommand::Deposit {
                seat,
                payments,
                reply,
            } => {
                let result = self.ctx.deposit_to_seat(seat, payments);
                if result.is_ok() {
                    self.contract.seat_deposited(seat, &mut self.ctx);
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Escrow, validate, arm the deadline, then run the handler. Every
    /// failure after escrow kicks the seat out so its payments come back.
    async fn offer(
        &mut self,
        redeemed: Result<InvitationDetails>,
        proposal: Proposal,
        payments: PaymentRecord,
    ) -> (SeatId, Result<OfferResult>) {
        let seat = match self.ctx.ledger_mut().create_seat(proposal.clone(), payments) {
            Ok(seat) => seat,
            Err(rejection) => return (rejection.seat, Err(rejection.error)),
        };
        let details = match redeemed {
            Ok(details) => details,
            Err(error) => return (seat, Err(self.ctx.ledger_mut().kick_out(seat, error))),
        };
        if let Some(shape) = &details.shape {
            if let Err(error) = shape.check(&proposal) {
                return (seat, Err(self.ctx.ledger_mut().kick_out(seat, error)));
            }
        }
        if let ExitRule::AfterDeadline { timer, deadline } = proposal.exit {
            let timer = match self.ctx.service().timer(timer).await {
                Ok(timer) => timer,
                Err(error) => return (seat, Err(self.ctx.ledger_mut().kick_out(seat, error))),
            };
            let mailbox = self.ctx.self_ref().clone();
            timer.set_wakeup(
                deadline,
                Box::new(move |now| {
                    let _ = mailbox.send(CoreCommand::DeadlineReached { seat, now });
                }),
            );
            debug!(%seat, deadline, "deadline armed");
        }

        match self.contract.handle_offer(&details.handler, seat, &mut self.ctx) {
            Ok(result) => (seat, Ok(result)),
            Err(error) => {
                let error = match error {
                    SeatkeeperError::OfferRejected { .. } => error,
                    other => SeatkeeperError::OfferRejected {
                        reason: other.to_string(),
                    },
                };
                (seat, Err(self.ctx.ledger_mut().kick_out(seat, error)))
            }
        }
    }

    fn try_exit(&mut self, seat: SeatId) -> Result<Allocation> {
        let exit = self.ctx.ledger().seat(seat)?.proposal.exit.clone();
        if exit != ExitRule::OnDemand {
            return Err(SeatkeeperError::ExitRuleViolation {
                seat,
                reason: format!("{} seats cannot exit on demand", exit.kind()),
            });
        }
        self.ctx.exit_seat(seat)
    }

    fn deadline_reached(&mut self, seat: SeatId, now: u64) {
        match self.ctx.ledger().has_exited(seat) {
            Ok(false) => match self.ctx.exit_seat(seat) {
                Ok(_) => info!(%seat, now, "deadline fired, seat exited"),
                Err(error) => warn!(%seat, %error, "deadline exit failed"),
            },
            Ok(true) => debug!(%seat, now, "deadline fired after exit"),
            Err(error) => warn!(%seat, %error, "deadline for unknown seat"),
        }
    }

    fn resolve_exit_waiters(&mut self) {
        if self.exit_waiters.is_empty() {
            return;
        }
        for (seat, reply) in std::mem::take(&mut self.exit_waiters) {
            match self.ctx.ledger().final_allocation(seat) {
                Err(SeatkeeperError::PayoutNotReady(_)) => self.exit_waiters.push((seat, reply)),
                result => {
                    let _ = reply.send(result);
                }
            }
        }
    }
}
