//! Configuration for a ledger instance

use crate::auth::{AllowAll, AllowList, CallerAuthorizer};
use crate::types::{Address, ChainRole};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Root or child instance
    pub role: ChainRole,

    /// Owner recorded when the ledger is first created
    pub initial_owner: Address,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// RocksDB configuration
    pub storage: StorageConfig,

    /// Request processing configuration
    pub requests: RequestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "token-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            role: ChainRole::Root,
            initial_owner: Address::ZERO,
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            storage: StorageConfig::default(),
            requests: RequestConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist state; `false` keeps the ledger in memory only
    pub enabled: bool,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("./data/token-ledger"),
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
        }
    }
}

/// Request processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Reject a second request with an already processed (direction, id)
    pub reject_replayed_ids: bool,

    /// Actor mailbox capacity (bounded for backpressure)
    pub mailbox_capacity: usize,

    /// Broadcast buffer for `Requested` events
    pub event_buffer: usize,

    /// Bridge callers trusted to submit apply steps; empty trusts everyone
    #[serde(default)]
    pub trusted_callers: Vec<Address>,

    /// Also restrict validate+lock steps to `trusted_callers`
    #[serde(default)]
    pub guard_origin: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            reject_replayed_ids: true,
            mailbox_capacity: 1000,
            event_buffer: 1024,
            trusted_callers: Vec::new(),
            guard_origin: false,
        }
    }
}

impl Config {
    /// In-memory configuration (no RocksDB)
    pub fn in_memory(role: ChainRole, initial_owner: Address) -> Self {
        let mut config = Config {
            role,
            initial_owner,
            ..Config::default()
        };
        config.storage.enabled = false;
        config
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(role) = std::env::var("TOKEN_LEDGER_ROLE") {
            config.role = role.parse()?;
        }

        if let Ok(owner) = std::env::var("TOKEN_LEDGER_OWNER") {
            config.initial_owner = owner
                .parse()
                .map_err(|e| crate::Error::Config(format!("TOKEN_LEDGER_OWNER: {}", e)))?;
        }

        if let Ok(data_dir) = std::env::var("TOKEN_LEDGER_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(enabled) = std::env::var("TOKEN_LEDGER_PERSIST") {
            config.storage.enabled = enabled
                .parse()
                .map_err(|e| crate::Error::Config(format!("TOKEN_LEDGER_PERSIST: {}", e)))?;
        }

        if let Ok(addr) = std::env::var("TOKEN_LEDGER_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        Ok(config)
    }

    /// Caller authorizer described by `requests.trusted_callers`
    pub fn authorizer(&self) -> Arc<dyn CallerAuthorizer> {
        if self.requests.trusted_callers.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(
                AllowList::new(self.requests.trusted_callers.iter().copied())
                    .guard_origin(self.requests.guard_origin),
            )
        }
    }

    /// Check values that cannot be expressed in the types
    pub fn validate(&self) -> crate::Result<()> {
        if self.initial_owner.is_zero() {
            return Err(crate::Error::Config(
                "initial_owner must be set to a non-null identity".to_string(),
            ));
        }

        if self.requests.mailbox_capacity == 0 || self.requests.event_buffer == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity and event_buffer must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
