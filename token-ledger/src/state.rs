//! Ledger state and state transitions
//!
//! Operations never mutate [`LedgerState`] directly. They first plan a
//! [`Transition`] against a shared borrow, then the caller persists it and
//! commits it with [`LedgerState::commit`]. A failed plan leaves nothing
//! behind.

use crate::keys::StorageKey;
use crate::types::{Address, RequestEvent, RequestTag, Word};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// State of one ledger instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    owner: Address,
    total_supply: u128,
    balances: HashMap<Address, u128>,
    processed: HashSet<RequestTag>,
    next_sequence: u64,
}

impl LedgerState {
    /// Fresh state: zero supply, zero balances
    pub fn new(owner: Address) -> Result<Self> {
        if owner.is_zero() {
            return Err(Error::InvalidOwner(
                "ledger owner cannot be the null identity".to_string(),
            ));
        }

        Ok(Self {
            owner,
            total_supply: 0,
            balances: HashMap::new(),
            processed: HashSet::new(),
            next_sequence: 0,
        })
    }

    /// Current owner
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Current total supply
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Balance of a holder (zero when absent)
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Sum of all balances, `None` on overflow
    pub fn balance_sum(&self) -> Option<u128> {
        self.balances
            .values()
            .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
    }

    /// Holders with a recorded balance
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.balances.iter()
    }

    /// Whether a request tag has already been processed
    pub fn is_processed(&self, tag: &RequestTag) -> bool {
        self.processed.contains(tag)
    }

    /// Sequence the next emitted event will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Value word currently stored under a key
    pub fn read(&self, key: &StorageKey) -> Word {
        match key {
            StorageKey::Owner => Word::from_address(&self.owner),
            StorageKey::TotalSupply => Word::from_amount(self.total_supply),
            StorageKey::Balance(holder) => Word::from_amount(self.balance_of(holder)),
        }
    }

    /// Commit a planned transition
    pub fn commit(&mut self, transition: &Transition) {
        for write in &transition.writes {
            self.write_slot(write);
        }

        if let Some(tag) = transition.processed {
            self.processed.insert(tag);
        }

        if let Some(ref event) = transition.event {
            self.next_sequence = event.sequence + 1;
        }
    }

    /// Restore a slot loaded from storage
    pub(crate) fn write_slot(&mut self, write: &SlotWrite) {
        match *write {
            SlotWrite::Owner(owner) => self.owner = owner,
            SlotWrite::TotalSupply(amount) => self.total_supply = amount,
            SlotWrite::Balance { holder, amount } => {
                if amount == 0 {
                    self.balances.remove(&holder);
                } else {
                    self.balances.insert(holder, amount);
                }
            }
        }
    }

    /// Restore a processed tag loaded from storage
    pub(crate) fn mark_processed(&mut self, tag: RequestTag) {
        self.processed.insert(tag);
    }

    /// Restore the event sequence loaded from storage
    pub(crate) fn set_next_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence;
    }
}

/// New value of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotWrite {
    /// Owner becomes this identity
    Owner(Address),
    /// Total supply becomes this amount
    TotalSupply(u128),
    /// Holder balance becomes this amount
    Balance {
        /// Holder
        holder: Address,
        /// New balance
        amount: u128,
    },
}

impl SlotWrite {
    /// Slot this write targets
    pub fn key(&self) -> StorageKey {
        match self {
            SlotWrite::Owner(_) => StorageKey::Owner,
            SlotWrite::TotalSupply(_) => StorageKey::TotalSupply,
            SlotWrite::Balance { holder, .. } => StorageKey::Balance(*holder),
        }
    }

    /// Stored value word
    pub fn value(&self) -> Word {
        match self {
            SlotWrite::Owner(owner) => Word::from_address(owner),
            SlotWrite::TotalSupply(amount) => Word::from_amount(*amount),
            SlotWrite::Balance { amount, .. } => Word::from_amount(*amount),
        }
    }

    /// Rebuild a write from its stored form
    pub fn from_stored(key: StorageKey, value: &Word) -> Result<Self> {
        Ok(match key {
            StorageKey::Owner => SlotWrite::Owner(value.to_address()?),
            StorageKey::TotalSupply => SlotWrite::TotalSupply(value.to_amount()?),
            StorageKey::Balance(holder) => SlotWrite::Balance {
                holder,
                amount: value.to_amount()?,
            },
        })
    }
}

/// Planned, not yet committed, effect of one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Slot writes, applied in order
    pub writes: Vec<SlotWrite>,

    /// Request tag to record for replay protection
    pub processed: Option<RequestTag>,

    /// Event to emit
    pub event: Option<RequestEvent>,
}

impl Transition {
    /// Transition made only of slot writes
    pub fn writes(writes: Vec<SlotWrite>) -> Self {
        Self {
            writes,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_new_rejects_null_owner() {
        assert!(matches!(
            LedgerState::new(Address::ZERO),
            Err(Error::InvalidOwner(_))
        ));
    }

    #[test]
    fn test_commit_writes() {
        let mut state = LedgerState::new(addr(1)).unwrap();
        state.commit(&Transition::writes(vec![
            SlotWrite::Balance {
                holder: addr(2),
                amount: 50,
            },
            SlotWrite::TotalSupply(50),
            SlotWrite::Owner(addr(9)),
        ]));

        assert_eq!(state.owner(), addr(9));
        assert_eq!(state.total_supply(), 50);
        assert_eq!(state.balance_of(&addr(2)), 50);
        assert_eq!(state.balance_sum(), Some(50));
        assert_eq!(state.read(&StorageKey::Balance(addr(2))), Word::from_amount(50));
    }

    #[test]
    fn test_zero_balance_is_dropped() {
        let mut state = LedgerState::new(addr(1)).unwrap();
        state.write_slot(&SlotWrite::Balance {
            holder: addr(2),
            amount: 5,
        });
        state.write_slot(&SlotWrite::Balance {
            holder: addr(2),
            amount: 0,
        });
        assert_eq!(state.holders().count(), 0);
        assert_eq!(state.balance_of(&addr(2)), 0);
    }

    #[test]
    fn test_slot_write_stored_form() {
        let write = SlotWrite::Balance {
            holder: addr(4),
            amount: 77,
        };
        let restored = SlotWrite::from_stored(write.key(), &write.value()).unwrap();
        assert_eq!(restored, write);
    }
}
