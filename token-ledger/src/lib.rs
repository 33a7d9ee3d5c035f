//! Requestable token ledger
//!
//! One fungible-token ledger that exists as two independently operated
//! instances, a root ledger and a child ledger, kept consistent by
//! cross-ledger requests:
//!
//! - **Enter**: value moves root -> child. The root validates and locks,
//!   the child applies.
//! - **Exit**: value moves child -> root. The child validates and locks,
//!   the root applies.
//!
//! # Architecture
//!
//! - **Keys**: Every slot (owner, total supply, holder balance) has one
//!   32-byte trie key computed identically on both instances
//! - **Engine**: Pure planning of each request into a transition, then commit
//! - **Single Writer**: One actor task per instance serializes all mutations
//! - **Storage**: Each transition lands in RocksDB as one atomic batch
//!
//! Proof verification and the relay between instances are external. The
//! ledger trusts destination-side calls that pass its [`auth::CallerAuthorizer`].
//!
//! # Invariants
//!
//! - Owner is never the null identity
//! - Balances never go negative: validate+lock checks `amount <= balance`
//! - A rejected request changes nothing and emits nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod metrics;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::{EntryPoint, RequestEngine};
pub use error::{Error, Result};
pub use keys::{balance_key, owner_key, total_supply_key, StorageKey};
pub use ledger::Ledger;
pub use state::LedgerState;
pub use storage::Storage;
pub use types::{Address, ChainRole, Direction, Request, RequestEvent, RequestStep, Word};
