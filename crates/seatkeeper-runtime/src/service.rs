//! The escrow service: installations, instances, timers and the invitation
//! arena of one runtime.
//!
//! Cheap to clone; clones share every table. Contracts receive a clone in
//! their [`ContractContext`] so they can start sub-instances and make
//! offers themselves.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use seatkeeper_ledger::PaymentRecord;
use seatkeeper_types::{
    Brand, InstallationId, InstanceId, Keyword, Proposal, Result, RuntimeConfig, SeatkeeperError,
    TimerId,
};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info};

use crate::clock::TimerService;
use crate::contract::{Contract, ContractContext};
use crate::instance::{self, CoreCommand, FacetHandle, InstanceRef, StartedInstance};
use crate::invitation::{Invitation, InvitationDetails, InvitationIssuer};
use crate::seat::UserSeat;

/// Installed logic of contract `C`.
pub struct Installation<C> {
    id: InstallationId,
    _contract: PhantomData<fn() -> C>,
}

impl<C> Installation<C> {
    #[must_use]
    pub fn id(&self) -> InstallationId {
        self.id
    }
}

impl<C> Clone for Installation<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Installation<C> {}

impl<C> PartialEq for Installation<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<C> Eq for Installation<C> {}

impl<C> fmt::Debug for Installation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Installation({})", self.id.short())
    }
}

/// Runtime service.
#[derive(Debug, Clone)]
pub struct EscrowService {
    config: Arc<RuntimeConfig>,
    /// Installation id -> contract name.
    installations: Arc<RwLock<HashMap<InstallationId, &'static str>>>,
    instances: Arc<RwLock<HashMap<InstanceId, InstanceRef>>>,
    timers: Arc<RwLock<HashMap<TimerId, Arc<dyn TimerService>>>>,
    invitations: Arc<InvitationIssuer>,
}

impl EscrowService {
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            installations: Arc::new(RwLock::new(HashMap::new())),
            instances: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(RwLock::new(HashMap::new())),
            invitations: Arc::new(InvitationIssuer::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn invitation_issuer(&self) -> &InvitationIssuer {
        &self.invitations
    }

    /// Register contract logic. Installing the same name and source twice
    /// yields the same installation.
    pub async fn install<C: Contract>(&self, source: &str) -> Installation<C> {
        let id = InstallationId::from_source(C::NAME, source);
        let fresh = self
            .installations
            .write()
            .await
            .insert(id, C::NAME)
            .is_none();
        if fresh {
            info!(installation = %id.short(), contract = C::NAME, "installed");
        }
        Installation {
            id,
            _contract: PhantomData,
        }
    }

    /// Start a fresh instance of `installation` with its own ledger,
    /// accepting the brands in `issuers`.
    ///
    /// # Errors
    /// `InstallationNotFound` if the installation belongs to another
    /// runtime, or whatever the contract's `start` returns.
    pub async fn start_instance<C: Contract>(
        &self,
        installation: &Installation<C>,
        issuers: BTreeMap<Keyword, Brand>,
        params: C::Params,
    ) -> Result<StartedInstance<C>> {
        let installed = self.installations.read().await.contains_key(&installation.id);
        if !installed {
            return Err(SeatkeeperError::InstallationNotFound(installation.id));
        }

        let id = InstanceId::new();
        let (core_tx, core_rx) = mpsc::unbounded_channel();
        let (facet_tx, facet_rx) = mpsc::channel(self.config.facet_mailbox_capacity);
        let self_ref = InstanceRef::new(id, core_tx);

        let mut ctx = ContractContext::new(installation.id, issuers, self.clone(), self_ref.clone());
        let (contract, creator_invitation) = C::start(params, &mut ctx)?;

        self.instances.write().await.insert(id, self_ref);
        instance::spawn(contract, ctx, core_rx, facet_rx);
        info!(instance = %id, contract = C::NAME, "instance started");

        Ok(StartedInstance {
            instance: id,
            creator_invitation,
            facet: FacetHandle::new(id, facet_tx),
        })
    }

    /// Look up a running instance.
    ///
    /// # Errors
    /// `InstanceNotFound`.
    pub async fn instance(&self, id: InstanceId) -> Result<InstanceRef> {
        self.instances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SeatkeeperError::InstanceNotFound(id))
    }

    /// Make `timer` available to `AfterDeadline` exit rules.
    pub async fn register_timer(&self, timer: Arc<dyn TimerService>) -> TimerId {
        let id = TimerId::new();
        self.timers.write().await.insert(id, timer);
        debug!(timer = %id, "timer registered");
        id
    }

    /// # Errors
    /// `TimerNotFound`.
    pub async fn timer(&self, id: TimerId) -> Result<Arc<dyn TimerService>> {
        self.timers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SeatkeeperError::TimerNotFound(id))
    }

    /// Redeem `invitation` with `proposal`, escrowing `payments` in a new
    /// seat.
    ///
    /// Escrow always happens first. Capability and shape errors kick the
    /// seat out with a full refund and become the seat's offer result.
    ///
    /// # Errors
    /// `InstanceNotFound` if the invitation's instance is not running here.
    pub async fn offer(
        &self,
        invitation: Invitation,
        proposal: Proposal,
        payments: PaymentRecord,
    ) -> Result<UserSeat> {
        let instance = self.instance(invitation.instance()).await?;
        let redeemed = self.invitations.redeem(&invitation);
        let (reply, response) = oneshot::channel();
        instance.send(CoreCommand::Offer {
            redeemed,
            proposal,
            payments,
            reply,
        })?;
        let (seat, result) = response
            .await
            .map_err(|_| SeatkeeperError::InstanceNotFound(instance.id()))?;
        debug!(%seat, accepted = result.is_ok(), "offer settled");
        Ok(UserSeat::new(seat, instance, result))
    }

    /// Inspect a live invitation.
    ///
    /// # Errors
    /// As [`InvitationIssuer::details`].
    pub fn get_invitation_details(&self, invitation: &Invitation) -> Result<InvitationDetails> {
        self.invitations.details(invitation)
    }
}
