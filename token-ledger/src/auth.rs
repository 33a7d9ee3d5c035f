//! Caller authorization at the request entry points
//!
//! The ledger does not verify proofs. It trusts that whoever submits a
//! destination-side request was already authenticated by the proof
//! verifier, and this module makes that trust explicit: every entry point
//! asks a [`CallerAuthorizer`] before touching state.

use crate::types::{Address, RequestStep};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;

/// Decides whether a caller may submit a request step
pub trait CallerAuthorizer: Send + Sync + fmt::Debug {
    /// Return `true` to let `caller` run `step`
    fn is_authorized(&self, caller: &Address, step: RequestStep) -> bool;
}

/// Accepts every caller
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CallerAuthorizer for AllowAll {
    fn is_authorized(&self, _caller: &Address, _step: RequestStep) -> bool {
        true
    }
}

/// Accepts a runtime-updatable set of trusted bridge callers
///
/// Apply steps always require a listed caller. Validate+lock steps are open
/// to holders unless `guard_origin` is set.
#[derive(Debug, Default)]
pub struct AllowList {
    callers: RwLock<HashSet<Address>>,
    guard_origin: bool,
}

impl AllowList {
    /// Create from an initial set of callers
    pub fn new(callers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            callers: RwLock::new(callers.into_iter().collect()),
            guard_origin: false,
        }
    }

    /// Also require a listed caller for validate+lock steps
    pub fn guard_origin(mut self, guard: bool) -> Self {
        self.guard_origin = guard;
        self
    }

    /// Trust a caller
    pub fn grant(&self, caller: Address) {
        if self.callers.write().insert(caller) {
            tracing::info!(caller = %caller, "Bridge caller granted");
        }
    }

    /// Stop trusting a caller
    pub fn revoke(&self, caller: &Address) {
        if self.callers.write().remove(caller) {
            tracing::info!(caller = %caller, "Bridge caller revoked");
        }
    }

    /// Whether a caller is listed
    pub fn contains(&self, caller: &Address) -> bool {
        self.callers.read().contains(caller)
    }
}

impl CallerAuthorizer for AllowList {
    fn is_authorized(&self, caller: &Address, step: RequestStep) -> bool {
        match step {
            RequestStep::ValidateLock if !self.guard_origin => true,
            _ => self.contains(caller),
        }
    }
}
