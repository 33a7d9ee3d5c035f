//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the [`RequestEngine`], so requests against one ledger
//!   instance never interleave
//! - Each accepted transition is persisted before it is committed in memory
//! - Accepted `Requested` events are broadcast to subscribers (the relay)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │       Holders / bridge relay (many tasks)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   plan ──► Storage::commit_transition ──► commit      │
//! │                       │                               │
//! │                       ▼                               │
//! │            broadcast::Sender<RequestEvent>            │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::engine::{EntryPoint, RequestEngine};
use crate::metrics::Metrics;
use crate::state::{LedgerState, Transition};
use crate::types::{Address, Request, RequestEvent};
use crate::{Error, Result, Storage};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Process a cross-ledger request
    ApplyRequest {
        caller: Address,
        request: Request,
        entry: EntryPoint,
        response: oneshot::Sender<Result<RequestEvent>>,
    },

    /// Privileged mint
    Mint {
        caller: Address,
        to: Address,
        amount: u128,
        response: oneshot::Sender<Result<()>>,
    },

    /// Local transfer
    Transfer {
        from: Address,
        to: Address,
        amount: u128,
        response: oneshot::Sender<Result<()>>,
    },

    /// Local ownership transfer
    TransferOwnership {
        caller: Address,
        new_owner: Address,
        response: oneshot::Sender<Result<()>>,
    },

    /// Current owner
    GetOwner { response: oneshot::Sender<Address> },

    /// Current total supply
    GetTotalSupply { response: oneshot::Sender<u128> },

    /// Balance of one holder
    GetBalance {
        holder: Address,
        response: oneshot::Sender<u128>,
    },

    /// Copy of the full state, replay set included
    GetState {
        response: oneshot::Sender<LedgerState>,
    },

    /// Events with sequence >= `from`
    GetEventsSince {
        from: u64,
        limit: usize,
        response: oneshot::Sender<Result<Vec<RequestEvent>>>,
    },

    /// Shutdown actor
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    engine: RequestEngine,

    /// Storage backend (`None` for in-memory ledgers)
    storage: Option<Arc<Storage>>,

    /// Event log for in-memory ledgers
    memory_log: Vec<RequestEvent>,

    metrics: Metrics,

    events: broadcast::Sender<RequestEvent>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        engine: RequestEngine,
        storage: Option<Arc<Storage>>,
        metrics: Metrics,
        events: broadcast::Sender<RequestEvent>,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        metrics.update_total_supply(engine.state().total_supply());

        Self {
            engine,
            storage,
            memory_log: Vec::new(),
            metrics,
            events,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut shutdown = None;
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { response } => {
                    shutdown = Some(response);
                    break;
                }
                msg => self.handle_message(msg),
            }
        }

        let role = self.engine.role();
        // Release the store before acknowledging so it can be reopened
        drop(self);

        match shutdown {
            Some(response) => {
                tracing::info!(role = %role, "Ledger actor shut down");
                let _ = response.send(());
            }
            None => tracing::debug!(role = %role, "Ledger mailbox closed"),
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::ApplyRequest {
                caller,
                request,
                entry,
                response,
            } => {
                let started = Instant::now();
                let plan = self.engine.plan_request(&caller, &request, entry);
                let result = self.run_transition(plan).and_then(|event| {
                    event.ok_or_else(|| {
                        Error::Concurrency("request plan produced no event".to_string())
                    })
                });
                self.metrics
                    .record_duration(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }

            LedgerMessage::Mint {
                caller,
                to,
                amount,
                response,
            } => {
                let plan = self.engine.plan_mint(&caller, &to, amount);
                let result = self.run_transition(plan).map(|_| ());
                if result.is_ok() {
                    tracing::info!(to = %to, amount, "Minted");
                }
                let _ = response.send(result);
            }

            LedgerMessage::Transfer {
                from,
                to,
                amount,
                response,
            } => {
                let plan = self.engine.plan_transfer(&from, &to, amount);
                let _ = response.send(self.run_transition(plan).map(|_| ()));
            }

            LedgerMessage::TransferOwnership {
                caller,
                new_owner,
                response,
            } => {
                let plan = self.engine.plan_transfer_ownership(&caller, &new_owner);
                let result = self.run_transition(plan).map(|_| ());
                if result.is_ok() {
                    tracing::info!(previous = %caller, owner = %new_owner, "Ownership transferred");
                }
                let _ = response.send(result);
            }

            LedgerMessage::GetOwner { response } => {
                let _ = response.send(self.engine.state().owner());
            }

            LedgerMessage::GetTotalSupply { response } => {
                let _ = response.send(self.engine.state().total_supply());
            }

            LedgerMessage::GetBalance { holder, response } => {
                let _ = response.send(self.engine.state().balance_of(&holder));
            }

            LedgerMessage::GetState { response } => {
                let _ = response.send(self.engine.state().clone());
            }

            LedgerMessage::GetEventsSince {
                from,
                limit,
                response,
            } => {
                let _ = response.send(self.events_since(from, limit));
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Persist, commit and publish a planned transition
    fn run_transition(&mut self, plan: Result<Transition>) -> Result<Option<RequestEvent>> {
        let transition = match plan {
            Ok(transition) => transition,
            Err(e) => {
                self.metrics.record_rejected(&e);
                return Err(e);
            }
        };

        if let Some(ref storage) = self.storage {
            if let Err(e) = storage.commit_transition(&transition) {
                tracing::error!("Error persisting transition: {}", e);
                self.metrics.record_rejected(&e);
                return Err(e);
            }
        }

        self.engine.commit(&transition);
        self.metrics
            .update_total_supply(self.engine.state().total_supply());

        let event = transition.event;
        if let Some(ref event) = event {
            self.metrics.record_accepted(event.step, &event.key);
            if self.storage.is_none() {
                self.memory_log.push(event.clone());
            }
            // No subscribers is not an error; the event stays in the log
            let _ = self.events.send(event.clone());
        }

        Ok(event)
    }

    fn events_since(&self, from: u64, limit: usize) -> Result<Vec<RequestEvent>> {
        match self.storage {
            Some(ref storage) => storage.events_since(from, limit),
            None => Ok(self
                .memory_log
                .iter()
                .skip_while(|event| event.sequence < from)
                .take(limit)
                .cloned()
                .collect()),
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Process a cross-ledger request
    pub async fn apply_request(
        &self,
        caller: Address,
        request: Request,
        entry: EntryPoint,
    ) -> Result<RequestEvent> {
        self.call(|response| LedgerMessage::ApplyRequest {
            caller,
            request,
            entry,
            response,
        })
        .await?
    }

    /// Privileged mint
    pub async fn mint(&self, caller: Address, to: Address, amount: u128) -> Result<()> {
        self.call(|response| LedgerMessage::Mint {
            caller,
            to,
            amount,
            response,
        })
        .await?
    }

    /// Local transfer
    pub async fn transfer(&self, from: Address, to: Address, amount: u128) -> Result<()> {
        self.call(|response| LedgerMessage::Transfer {
            from,
            to,
            amount,
            response,
        })
        .await?
    }

    /// Local ownership transfer
    pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        self.call(|response| LedgerMessage::TransferOwnership {
            caller,
            new_owner,
            response,
        })
        .await?
    }

    /// Current owner
    pub async fn owner(&self) -> Result<Address> {
        self.call(|response| LedgerMessage::GetOwner { response })
            .await
    }

    /// Current total supply
    pub async fn total_supply(&self) -> Result<u128> {
        self.call(|response| LedgerMessage::GetTotalSupply { response })
            .await
    }

    /// Balance of one holder
    pub async fn balance_of(&self, holder: Address) -> Result<u128> {
        self.call(|response| LedgerMessage::GetBalance { holder, response })
            .await
    }

    /// Copy of the full state
    pub async fn get_state(&self) -> Result<LedgerState> {
        self.call(|response| LedgerMessage::GetState { response })
            .await
    }

    /// Events with sequence >= `from`
    pub async fn events_since(&self, from: u64, limit: usize) -> Result<Vec<RequestEvent>> {
        self.call(|response| LedgerMessage::GetEventsSince {
            from,
            limit,
            response,
        })
        .await?
    }

    /// Shutdown actor and wait for it to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|response| LedgerMessage::Shutdown { response })
            .await
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    engine: RequestEngine,
    storage: Option<Arc<Storage>>,
    metrics: Metrics,
    events: broadcast::Sender<RequestEvent>,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(engine, storage, metrics, events, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;
    use crate::keys::StorageKey;
    use crate::types::{ChainRole, Direction, Word};

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn spawn(role: ChainRole) -> (LedgerHandle, broadcast::Receiver<RequestEvent>, Metrics) {
        let engine = RequestEngine::new(role, LedgerState::new(addr(1)).unwrap(), Arc::new(AllowAll));
        let metrics = Metrics::new().unwrap();
        let (events, rx) = broadcast::channel(16);
        let handle = spawn_ledger_actor(engine, None, metrics.clone(), events, 16);
        (handle, rx, metrics)
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
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _rx, _metrics) = spawn(ChainRole::Root);
        handle.shutdown().await.unwrap();

        // Mailbox is closed once the actor stopped
        assert!(matches!(
            handle.get_state().await,
            Err(Error::Concurrency(_))
        ));
        assert!(matches!(
            handle.balance_of(addr(3)).await,
            Err(Error::Concurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_apply_and_broadcast() {
        let (handle, mut rx, metrics) = spawn(ChainRole::Child);

        let event = handle
            .apply_request(addr(9), enter(0, 25), EntryPoint::Dispatch)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.balance_of(&addr(3)), 25);
        assert_eq!(handle.balance_of(addr(3)).await.unwrap(), 25);
        assert_eq!(handle.total_supply().await.unwrap(), 0);
        assert_eq!(handle.owner().await.unwrap(), addr(1));
        assert_eq!(
            metrics
                .requests_accepted
                .with_label_values(&["apply", "balance"])
                .get(),
            1
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejection_has_no_effect() {
        let (handle, mut rx, metrics) = spawn(ChainRole::Root);

        let err = handle
            .apply_request(addr(3), enter(0, 25), EntryPoint::Dispatch)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            metrics
                .requests_rejected
                .with_label_values(&["insufficient_balance"])
                .get(),
            1
        );
        assert!(handle.events_since(0, 10).await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_memory_event_log() {
        let (handle, _rx, _metrics) = spawn(ChainRole::Child);

        for id in 0..5 {
            handle
                .apply_request(addr(9), enter(id, 1), EntryPoint::Destination)
                .await
                .unwrap();
        }

        let events = handle.events_since(2, 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 2);
        assert_eq!(events[1].sequence, 3);

        handle.shutdown().await.unwrap();
    }
}
