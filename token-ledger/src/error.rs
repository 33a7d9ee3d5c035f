//! Error types for the token ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every variant aborts the operation that produced it with no partial
/// mutation and no emitted event.
#[derive(Error, Debug)]
pub enum Error {
    /// Requestor is not the identity allowed to move an owner or
    /// total-supply slot (or to run a privileged local operation)
    #[error("Unauthorized: {requestor} is not the ledger owner")]
    Unauthorized {
        /// Identity that attempted the operation
        requestor: String,
    },

    /// Requested amount exceeds the recorded balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount requested
        required: u128,
        /// Amount held
        available: u128,
    },

    /// Value word cannot be interpreted for the key kind
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Arithmetic would exceed the representable range
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Trie key is neither a fixed slot nor the requestor's balance slot
    #[error("Unknown trie key: {0}")]
    UnknownKey(String),

    /// Entry point does not match this ledger's role for the direction
    #[error("Wrong role: {0}")]
    WrongRole(String),

    /// Request (direction, id) already processed on this ledger
    #[error("Duplicate request: {direction} #{id}")]
    DuplicateRequest {
        /// Request direction
        direction: String,
        /// Request id
        id: u64,
    },

    /// Submitting caller rejected by the trust boundary
    #[error("Unauthorized caller: {0}")]
    UnauthorizedCaller(String),

    /// Owner would become the null identity
    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthorized { .. } => "unauthorized",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::DecodeError(_) => "decode_error",
            Error::Overflow(_) => "overflow",
            Error::UnknownKey(_) => "unknown_key",
            Error::WrongRole(_) => "wrong_role",
            Error::DuplicateRequest { .. } => "duplicate_request",
            Error::UnauthorizedCaller(_) => "unauthorized_caller",
            Error::InvalidOwner(_) => "invalid_owner",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
