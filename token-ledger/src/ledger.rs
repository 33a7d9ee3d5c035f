//! Main ledger orchestration layer
//!
//! This module ties together storage, the request engine and the actor into
//! the high-level API of one ledger instance (root or child).
//!
//! # Example
//!
//! ```no_run
//! use token_ledger::{auth::AllowAll, Address, ChainRole, Config, Ledger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> token_ledger::Result<()> {
//!     let owner: Address = "0x0101010101010101010101010101010101010101".parse()?;
//!     let config = Config::in_memory(ChainRole::Root, owner);
//!     let ledger = Ledger::open(config, Arc::new(AllowAll))?;
//!
//!     let mut events = ledger.subscribe();
//!     // let event = ledger.apply_request(caller, request).await?;
//!     // relay `events.recv().await` to the child ledger
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    auth::CallerAuthorizer,
    engine::{EntryPoint, RequestEngine},
    metrics::Metrics,
    state::{LedgerState, SlotWrite, Transition},
    types::{Address, ChainRole, Request, RequestEvent},
    Config, Result, Storage,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for async operations
    handle: LedgerHandle,

    /// Event fan-out for relays
    events: broadcast::Sender<RequestEvent>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// A persistent ledger reloads its state; a fresh one starts with
    /// `config.initial_owner`, zero supply and zero balances.
    /// Must be called from within a Tokio runtime.
    pub fn open(config: Config, authorizer: Arc<dyn CallerAuthorizer>) -> Result<Self> {
        config.validate()?;

        let storage = if config.storage.enabled {
            let storage = Storage::open(&config.storage)?;
            storage.claim_role(config.role)?;
            Some(Arc::new(storage))
        } else {
            None
        };

        let state = match storage {
            Some(ref storage) => match storage.load_state()? {
                Some(state) => state,
                None => {
                    let state = LedgerState::new(config.initial_owner)?;
                    // Record the owner so a restart finds an initialized ledger
                    storage.commit_transition(&Transition::writes(vec![SlotWrite::Owner(
                        state.owner(),
                    )]))?;
                    state
                }
            },
            None => LedgerState::new(config.initial_owner)?,
        };

        tracing::info!(
            service = %config.service_name,
            role = %config.role,
            owner = %state.owner(),
            persistent = config.storage.enabled,
            "Ledger opened"
        );

        let engine = RequestEngine::new(config.role, state, authorizer)
            .with_replay_protection(config.requests.reject_replayed_ids);

        let metrics = Metrics::new()?;
        let (events, _) = broadcast::channel(config.requests.event_buffer);

        let handle = spawn_ledger_actor(
            engine,
            storage,
            metrics.clone(),
            events.clone(),
            config.requests.mailbox_capacity,
        );

        Ok(Self {
            handle,
            events,
            metrics,
            config,
        })
    }

    /// This ledger's role
    pub fn role(&self) -> ChainRole {
        self.config.role
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Cloneable handle to the actor
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Subscribe to `Requested` events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    /// Process a request, running validate+lock or apply per role and direction
    pub async fn apply_request(&self, caller: Address, request: Request) -> Result<RequestEvent> {
        self.handle
            .apply_request(caller, request, EntryPoint::Dispatch)
            .await
    }

    /// Validate+lock a request this ledger is the origin for
    pub async fn apply_request_on_origin(
        &self,
        caller: Address,
        request: Request,
    ) -> Result<RequestEvent> {
        self.handle
            .apply_request(caller, request, EntryPoint::Origin)
            .await
    }

    /// Apply a request this ledger is the destination for
    pub async fn apply_request_on_destination(
        &self,
        caller: Address,
        request: Request,
    ) -> Result<RequestEvent> {
        self.handle
            .apply_request(caller, request, EntryPoint::Destination)
            .await
    }

    /// Owner-only mint
    pub async fn mint(&self, caller: Address, to: Address, amount: u128) -> Result<()> {
        self.handle.mint(caller, to, amount).await
    }

    /// Local transfer between holders
    pub async fn transfer(&self, from: Address, to: Address, amount: u128) -> Result<()> {
        self.handle.transfer(from, to, amount).await
    }

    /// Owner-only ownership transfer
    pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        self.handle.transfer_ownership(caller, new_owner).await
    }

    /// Current owner
    pub async fn owner(&self) -> Result<Address> {
        self.handle.owner().await
    }

    /// Current total supply
    pub async fn total_supply(&self) -> Result<u128> {
        self.handle.total_supply().await
    }

    /// Balance of a holder
    pub async fn balance_of(&self, holder: Address) -> Result<u128> {
        self.handle.balance_of(holder).await
    }

    /// Copy of the full state, replay set included
    pub async fn snapshot(&self) -> Result<LedgerState> {
        self.handle.get_state().await
    }

    /// Replay emitted events from a sequence (relay catch-up)
    pub async fn events_since(&self, from: u64, limit: usize) -> Result<Vec<RequestEvent>> {
        self.handle.events_since(from, limit).await
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, AllowList};
    use crate::Error;
    use crate::keys::StorageKey;
    use crate::types::{Direction, Word};

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn persistent_config(dir: &std::path::Path, role: ChainRole) -> Config {
        let mut config = Config::in_memory(role, addr(1));
        config.storage.enabled = true;
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    fn enter(id: u64, amount: u128) -> Request {
        Request::new(
            Direction::Enter,
            id,
            addr(3),
            &StorageKey::Balance(addr(3)),
            Word::from_amount(amount),
        )
    }

    #[tokio::test]
    async fn test_ledger_open_requires_owner() {
        let config = Config::in_memory(ChainRole::Root, Address::ZERO);
        let err = Ledger::open(config, Arc::new(AllowAll)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_ledger_open_and_read() {
        let ledger =
            Ledger::open(Config::in_memory(ChainRole::Root, addr(1)), Arc::new(AllowAll)).unwrap();

        assert_eq!(ledger.role(), ChainRole::Root);
        assert_eq!(ledger.owner().await.unwrap(), addr(1));
        assert_eq!(ledger.total_supply().await.unwrap(), 0);
        assert_eq!(ledger.balance_of(addr(3)).await.unwrap(), 0);

        ledger.mint(addr(1), addr(3), 100).await.unwrap();
        ledger.transfer(addr(3), addr(4), 40).await.unwrap();
        assert_eq!(ledger.balance_of(addr(3)).await.unwrap(), 60);
        assert_eq!(ledger.balance_of(addr(4)).await.unwrap(), 40);
        assert_eq!(ledger.total_supply().await.unwrap(), 100);

        ledger.transfer_ownership(addr(1), addr(2)).await.unwrap();
        assert_eq!(ledger.owner().await.unwrap(), addr(2));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_persistent_ledger_survives_restart() {
        let temp_dir = tempfile::tempdir().unwrap();

        {
            let ledger = Ledger::open(
                persistent_config(temp_dir.path(), ChainRole::Child),
                Arc::new(AllowAll),
            )
            .unwrap();
            ledger.apply_request(addr(9), enter(0, 70)).await.unwrap();
            ledger.apply_request(addr(9), enter(1, 30)).await.unwrap();
            ledger.shutdown().await.unwrap();
        }

        let ledger = Ledger::open(
            persistent_config(temp_dir.path(), ChainRole::Child),
            Arc::new(AllowAll),
        )
        .unwrap();

        assert_eq!(ledger.owner().await.unwrap(), addr(1));
        assert_eq!(ledger.balance_of(addr(3)).await.unwrap(), 100);

        // Replay set survives the restart
        let err = ledger.apply_request(addr(9), enter(1, 30)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateRequest { id: 1, .. }));

        // Sequence continues after the persisted log
        let event = ledger.apply_request(addr(9), enter(2, 5)).await.unwrap();
        assert_eq!(event.sequence, 2);
        assert_eq!(ledger.events_since(0, 10).await.unwrap().len(), 3);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_with_other_role_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let ledger = Ledger::open(
            persistent_config(temp_dir.path(), ChainRole::Child),
            Arc::new(AllowAll),
        )
        .unwrap();
        ledger.apply_request(addr(9), enter(0, 70)).await.unwrap();
        ledger.shutdown().await.unwrap();

        let err = Ledger::open(
            persistent_config(temp_dir.path(), ChainRole::Root),
            Arc::new(AllowAll),
        )
        .unwrap_err();
        assert!(matches!(err, Error::WrongRole(_)));
    }

    #[tokio::test]
    async fn test_destination_entry_requires_trusted_caller() {
        let relay = addr(9);
        let ledger = Ledger::open(
            Config::in_memory(ChainRole::Child, addr(1)),
            Arc::new(AllowList::new([relay])),
        )
        .unwrap();

        let err = ledger
            .apply_request_on_destination(addr(3), enter(0, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnauthorizedCaller(_)));
        assert_eq!(ledger.balance_of(addr(3)).await.unwrap(), 0);

        ledger
            .apply_request_on_destination(relay, enter(0, 10))
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(addr(3)).await.unwrap(), 10);

        ledger.shutdown().await.unwrap();
    }
}
