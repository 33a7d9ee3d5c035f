//! Request validation and application
//!
//! Every request is routed by the receiving ledger's role and the request
//! direction (see [`ChainRole::step_for`]), then by the resolved storage
//! key:
//!
//! | key          | validate+lock (origin)            | apply (destination)        |
//! |--------------|-----------------------------------|----------------------------|
//! | owner        | requestor must be the owner       | owner := value             |
//! | total supply | requestor must be the owner       | total supply := value      |
//! | balance      | amount <= balance, then decrement | balance += amount, checked |
//!
//! The origin side removes value the moment it accepts the request. The
//! destination side credits it whenever the relay delivers the mirrored
//! call; until then the value is locked. With replay protection on, the
//! destination refuses a request it has already applied.

use crate::auth::CallerAuthorizer;
use crate::keys::StorageKey;
use crate::state::{LedgerState, SlotWrite, Transition};
use crate::types::{Address, ChainRole, Request, RequestEvent, RequestStep};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Which entry point received a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Route by role and direction
    Dispatch,
    /// Only accept when this ledger is the origin
    Origin,
    /// Only accept when this ledger is the destination
    Destination,
}

impl EntryPoint {
    fn expected_step(&self) -> Option<RequestStep> {
        match self {
            EntryPoint::Dispatch => None,
            EntryPoint::Origin => Some(RequestStep::ValidateLock),
            EntryPoint::Destination => Some(RequestStep::Apply),
        }
    }
}

/// Synchronous request state machine for one ledger instance
#[derive(Debug)]
pub struct RequestEngine {
    role: ChainRole,
    state: LedgerState,
    authorizer: Arc<dyn CallerAuthorizer>,
    reject_replayed_ids: bool,
}

impl RequestEngine {
    /// Create an engine over existing state
    pub fn new(role: ChainRole, state: LedgerState, authorizer: Arc<dyn CallerAuthorizer>) -> Self {
        Self {
            role,
            state,
            authorizer,
            reject_replayed_ids: true,
        }
    }

    /// Enable or disable rejection of already applied requests
    pub fn with_replay_protection(mut self, enabled: bool) -> Self {
        self.reject_replayed_ids = enabled;
        self
    }

    /// This ledger's role
    pub fn role(&self) -> ChainRole {
        self.role
    }

    /// Read access to the state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Commit a transition planned against the current state
    pub fn commit(&mut self, transition: &Transition) {
        self.state.commit(transition);

        if let Some(ref event) = transition.event {
            tracing::info!(
                role = %self.role,
                step = %event.step,
                direction = %event.direction,
                id = event.id,
                requestor = %event.requestor,
                key = %event.key,
                sequence = event.sequence,
                "Request accepted"
            );
        }
    }

    /// Plan a cross-ledger request without mutating state
    pub fn plan_request(
        &self,
        caller: &Address,
        request: &Request,
        entry: EntryPoint,
    ) -> Result<Transition> {
        let result = self.plan_request_inner(caller, request, entry);

        if let Err(ref e) = result {
            tracing::warn!(
                role = %self.role,
                direction = %request.direction,
                id = request.id,
                requestor = %request.requestor,
                caller = %caller,
                error = e.kind(),
                "Request rejected: {}",
                e
            );
        }

        result
    }

    fn plan_request_inner(
        &self,
        caller: &Address,
        request: &Request,
        entry: EntryPoint,
    ) -> Result<Transition> {
        let step = self.role.step_for(request.direction);

        if let Some(expected) = entry.expected_step() {
            if expected != step {
                return Err(Error::WrongRole(format!(
                    "{} ledger runs {} for {} requests, not {}",
                    self.role, step, request.direction, expected
                )));
            }
        }

        if !self.authorizer.is_authorized(caller, step) {
            return Err(Error::UnauthorizedCaller(format!(
                "{} may not submit {} requests",
                caller, step
            )));
        }

        let key = StorageKey::resolve(&request.trie_key, &request.requestor)?;

        // Only the destination can double-credit; the origin never rejects on id
        let tag = request.tag();
        let guard_replay = self.reject_replayed_ids && step == RequestStep::Apply;
        if guard_replay && self.state.is_processed(&tag) {
            return Err(Error::DuplicateRequest {
                direction: request.direction.to_string(),
                id: request.id,
            });
        }

        let writes = match step {
            RequestStep::ValidateLock => self.validate_lock(&key, request)?,
            RequestStep::Apply => self.apply(&key, request)?,
        };

        let event = RequestEvent {
            sequence: self.state.next_sequence(),
            event_id: Uuid::now_v7(),
            role: self.role,
            step,
            direction: request.direction,
            id: request.id,
            requestor: request.requestor,
            key,
            value: request.value,
            emitted_at: Utc::now(),
        };

        Ok(Transition {
            writes,
            processed: guard_replay.then_some(tag),
            event: Some(event),
        })
    }

    /// Origin side: authorize or check sufficiency, then lock
    fn validate_lock(&self, key: &StorageKey, request: &Request) -> Result<Vec<SlotWrite>> {
        match key {
            StorageKey::Owner => {
                self.require_owner(&request.requestor)?;
                // The destination must be able to decode what it will apply
                request.value.to_address()?;
                Ok(Vec::new())
            }
            StorageKey::TotalSupply => {
                self.require_owner(&request.requestor)?;
                request.value.to_amount()?;
                Ok(Vec::new())
            }
            StorageKey::Balance(holder) => {
                let amount = request.value.to_amount()?;
                let available = self.state.balance_of(holder);
                if amount > available {
                    return Err(Error::InsufficientBalance {
                        required: amount,
                        available,
                    });
                }
                Ok(vec![SlotWrite::Balance {
                    holder: *holder,
                    amount: available - amount,
                }])
            }
        }
    }

    /// Destination side: set or credit unconditionally
    fn apply(&self, key: &StorageKey, request: &Request) -> Result<Vec<SlotWrite>> {
        match key {
            StorageKey::Owner => Ok(vec![SlotWrite::Owner(request.value.to_address()?)]),
            StorageKey::TotalSupply => {
                Ok(vec![SlotWrite::TotalSupply(request.value.to_amount()?)])
            }
            StorageKey::Balance(holder) => {
                let amount = request.value.to_amount()?;
                let current = self.state.balance_of(holder);
                let credited = current.checked_add(amount).ok_or_else(|| {
                    Error::Overflow(format!(
                        "crediting {} to {} would overflow balance {}",
                        amount, holder, current
                    ))
                })?;
                Ok(vec![SlotWrite::Balance {
                    holder: *holder,
                    amount: credited,
                }])
            }
        }
    }

    fn require_owner(&self, requestor: &Address) -> Result<()> {
        if *requestor != self.state.owner() {
            return Err(Error::Unauthorized {
                requestor: requestor.to_string(),
            });
        }
        Ok(())
    }

    /// Plan a privileged mint
    pub fn plan_mint(&self, caller: &Address, to: &Address, amount: u128) -> Result<Transition> {
        self.require_owner(caller)?;

        let supply = self
            .state
            .total_supply()
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("total supply".to_string()))?;
        let balance = self
            .state
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("balance of {}", to)))?;

        Ok(Transition::writes(vec![
            SlotWrite::TotalSupply(supply),
            SlotWrite::Balance {
                holder: *to,
                amount: balance,
            },
        ]))
    }

    /// Plan a local transfer between holders
    pub fn plan_transfer(&self, from: &Address, to: &Address, amount: u128) -> Result<Transition> {
        let available = self.state.balance_of(from);
        if amount > available {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }

        if from == to {
            return Ok(Transition::default());
        }

        let credited = self
            .state
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("balance of {}", to)))?;

        Ok(Transition::writes(vec![
            SlotWrite::Balance {
                holder: *from,
                amount: available - amount,
            },
            SlotWrite::Balance {
                holder: *to,
                amount: credited,
            },
        ]))
    }

    /// Plan a local ownership transfer
    pub fn plan_transfer_ownership(
        &self,
        caller: &Address,
        new_owner: &Address,
    ) -> Result<Transition> {
        self.require_owner(caller)?;

        if new_owner.is_zero() {
            return Err(Error::InvalidOwner(
                "cannot transfer ownership to the null identity".to_string(),
            ));
        }

        Ok(Transition::writes(vec![SlotWrite::Owner(*new_owner)]))
    }

    /// Route a request by role and direction and commit it
    pub fn apply_request(&mut self, caller: &Address, request: &Request) -> Result<RequestEvent> {
        self.execute(caller, request, EntryPoint::Dispatch)
    }

    /// Validate+lock; fails with `WrongRole` on the destination ledger
    pub fn apply_request_on_origin(
        &mut self,
        caller: &Address,
        request: &Request,
    ) -> Result<RequestEvent> {
        self.execute(caller, request, EntryPoint::Origin)
    }

    /// Apply; fails with `WrongRole` on the origin ledger
    pub fn apply_request_on_destination(
        &mut self,
        caller: &Address,
        request: &Request,
    ) -> Result<RequestEvent> {
        self.execute(caller, request, EntryPoint::Destination)
    }

    fn execute(
        &mut self,
        caller: &Address,
        request: &Request,
        entry: EntryPoint,
    ) -> Result<RequestEvent> {
        let mut transition = self.plan_request(caller, request, entry)?;
        self.commit(&transition);
        transition
            .event
            .take()
            .ok_or_else(|| Error::Concurrency("request plan produced no event".to_string()))
    }

    /// Mint and commit
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> Result<()> {
        let transition = self.plan_mint(caller, to, amount)?;
        self.commit(&transition);
        Ok(())
    }

    /// Transfer and commit
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        let transition = self.plan_transfer(from, to, amount)?;
        self.commit(&transition);
        Ok(())
    }

    /// Transfer ownership and commit
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: &Address) -> Result<()> {
        let transition = self.plan_transfer_ownership(caller, new_owner)?;
        self.commit(&transition);
        Ok(())
    }
}
