//! Storage key derivation
//!
//! Both ledger instances address their slots with the same 32-byte trie
//! keys, so a `(key, value)` pair names "what changed and to what" on
//! either side:
//!
//! - owner slot: the word `0x00..00`
//! - total supply slot: the word `0x00..01`
//! - balance slot of `holder`: `SHA-256(BALANCE_KEY_TAG || holder)`
//!
//! Raw keys are resolved to [`StorageKey`] once, at the entry point, and
//! every later decision dispatches on the variant.

use crate::types::{Address, Word, WORD_LEN};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain tag mixed into every balance key
pub const BALANCE_KEY_TAG: &[u8] = b"requestable.balance";

/// Trie key of the owner slot
pub const OWNER_KEY: Word = Word::new([0u8; WORD_LEN]);

/// Trie key of the total supply slot
pub const TOTAL_SUPPLY_KEY: Word = {
    let mut bytes = [0u8; WORD_LEN];
    bytes[WORD_LEN - 1] = 1;
    Word::new(bytes)
};

/// Resolved storage slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKey {
    /// Ledger owner identity
    Owner,
    /// Total supply
    TotalSupply,
    /// Balance of one holder
    Balance(Address),
}

impl StorageKey {
    /// Raw trie key for this slot
    pub fn trie_key(&self) -> Word {
        match self {
            StorageKey::Owner => OWNER_KEY,
            StorageKey::TotalSupply => TOTAL_SUPPLY_KEY,
            StorageKey::Balance(holder) => balance_key(holder),
        }
    }

    /// Resolve a raw trie key submitted by `requestor`
    ///
    /// Balance requests may only name the requestor's own balance slot.
    pub fn resolve(raw: &Word, requestor: &Address) -> Result<Self> {
        if *raw == OWNER_KEY {
            Ok(StorageKey::Owner)
        } else if *raw == TOTAL_SUPPLY_KEY {
            Ok(StorageKey::TotalSupply)
        } else if *raw == balance_key(requestor) {
            Ok(StorageKey::Balance(*requestor))
        } else {
            Err(Error::UnknownKey(format!(
                "{} is not a known slot for requestor {}",
                raw, requestor
            )))
        }
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            StorageKey::Owner => "owner",
            StorageKey::TotalSupply => "total_supply",
            StorageKey::Balance(_) => "balance",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKey::Balance(holder) => write!(f, "balance({})", holder),
            other => f.write_str(other.kind()),
        }
    }
}

/// Owner slot key
pub fn owner_key() -> Word {
    OWNER_KEY
}

/// Total supply slot key
pub fn total_supply_key() -> Word {
    TOTAL_SUPPLY_KEY
}

/// Balance slot key for a holder
pub fn balance_key(holder: &Address) -> Word {
    let mut hasher = Sha256::new();
    hasher.update(BALANCE_KEY_TAG);
    hasher.update(holder.as_bytes());
    Word::new(hasher.finalize().into())
}
