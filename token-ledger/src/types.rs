//! Core types for the token ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for storage, hex strings for JSON)
//! - Fixed-width encodings shared verbatim by the root and child instances
//! - Exact integer arithmetic (no floating point)

use crate::keys::StorageKey;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Width of a storage value word in bytes
pub const WORD_LEN: usize = 32;

/// Width of an identity in bytes
pub const ADDRESS_LEN: usize = 20;

/// Ledger identity (holder, owner, caller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The null identity
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Check for the null identity
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::DecodeError(format!("invalid address {}: {}", s, e)))?;
        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            Error::DecodeError(format!("address {} must be {} bytes", s, ADDRESS_LEN))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LEN]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Fixed-width value word carried by requests and stored per slot
///
/// Amounts are big-endian and left-padded. Identities are left-aligned
/// and right-padded with zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Word([u8; WORD_LEN]);

impl Word {
    /// All-zero word
    pub const ZERO: Word = Word([0u8; WORD_LEN]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; WORD_LEN]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; WORD_LEN] {
        &self.0
    }

    /// Encode an amount (left-padded, big-endian)
    pub fn from_amount(amount: u128) -> Self {
        let mut bytes = [0u8; WORD_LEN];
        bytes[WORD_LEN - 16..].copy_from_slice(&amount.to_be_bytes());
        Self(bytes)
    }

    /// Encode an identity (left-aligned, right-padded)
    pub fn from_address(address: &Address) -> Self {
        let mut bytes = [0u8; WORD_LEN];
        bytes[..ADDRESS_LEN].copy_from_slice(address.as_bytes());
        Self(bytes)
    }

    /// Decode an amount
    pub fn to_amount(&self) -> Result<u128> {
        let (high, low) = self.0.split_at(WORD_LEN - 16);
        if high.iter().any(|b| *b != 0) {
            return Err(Error::DecodeError(format!(
                "amount {} exceeds 128-bit range",
                self
            )));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(low);
        Ok(u128::from_be_bytes(buf))
    }

    /// Decode a non-null identity
    pub fn to_address(&self) -> Result<Address> {
        let (head, padding) = self.0.split_at(ADDRESS_LEN);
        if padding.iter().any(|b| *b != 0) {
            return Err(Error::DecodeError(format!(
                "identity word {} has non-zero padding",
                self
            )));
        }
        let mut buf = [0u8; ADDRESS_LEN];
        buf.copy_from_slice(head);
        let address = Address(buf);
        if address.is_zero() {
            return Err(Error::DecodeError("identity word is the null identity".to_string()));
        }
        Ok(address)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({})", self)
    }
}

impl FromStr for Word {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::DecodeError(format!("invalid word {}: {}", s, e)))?;
        let bytes: [u8; WORD_LEN] = bytes
            .try_into()
            .map_err(|_| Error::DecodeError(format!("word {} must be {} bytes", s, WORD_LEN)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; WORD_LEN]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Direction a request moves value in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Direction {
    /// Root -> Child
    Enter = 0,
    /// Child -> Root
    Exit = 1,
}

impl Direction {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Enter => "enter",
            Direction::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two ledger instances this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    /// Origin chain instance
    Root,
    /// Destination chain instance
    Child,
}

impl ChainRole {
    /// Step this instance performs for a direction
    ///
    /// | role  | enter         | exit          |
    /// |-------|---------------|---------------|
    /// | root  | validate+lock | apply         |
    /// | child | apply         | validate+lock |
    pub fn step_for(&self, direction: Direction) -> RequestStep {
        match (self, direction) {
            (ChainRole::Root, Direction::Enter) => RequestStep::ValidateLock,
            (ChainRole::Root, Direction::Exit) => RequestStep::Apply,
            (ChainRole::Child, Direction::Enter) => RequestStep::Apply,
            (ChainRole::Child, Direction::Exit) => RequestStep::ValidateLock,
        }
    }

    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRole::Root => "root",
            ChainRole::Child => "child",
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root" => Ok(ChainRole::Root),
            "child" => Ok(ChainRole::Child),
            other => Err(Error::Config(format!("unknown chain role: {}", other))),
        }
    }
}

/// Behaviour a ledger runs for an incoming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStep {
    /// Check authorization / sufficiency and remove value locally
    ValidateLock,
    /// Credit or set value unconditionally
    Apply,
}

impl RequestStep {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStep::ValidateLock => "validate_lock",
            RequestStep::Apply => "apply",
        }
    }
}

impl fmt::Display for RequestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-ledger request as submitted to an entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Enter or exit
    pub direction: Direction,

    /// Relay correlation id
    pub id: u64,

    /// Holder the request acts for
    pub requestor: Address,

    /// Raw trie key naming the slot
    pub trie_key: Word,

    /// New value for the slot
    pub value: Word,
}

impl Request {
    /// Build a request for a resolved storage key
    pub fn new(
        direction: Direction,
        id: u64,
        requestor: Address,
        key: &StorageKey,
        value: Word,
    ) -> Self {
        Self {
            direction,
            id,
            requestor,
            trie_key: key.trie_key(),
            value,
        }
    }

    /// Replay-protection tag
    ///
    /// Covers direction, id, requestor and slot, so two holders (or two
    /// slots) reusing one id stay distinct requests.
    pub fn tag(&self) -> RequestTag {
        let mut hasher = Sha256::new();
        hasher.update(REQUEST_TAG_DOMAIN);
        hasher.update([self.direction as u8]);
        hasher.update(self.id.to_be_bytes());
        hasher.update(self.requestor.as_bytes());
        hasher.update(self.trie_key.as_bytes());
        RequestTag(hasher.finalize().into())
    }
}

/// Domain separator for request tags
const REQUEST_TAG_DOMAIN: &[u8] = b"requestable.request";

/// Identity of an applied request on one ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestTag([u8; 32]);

impl RequestTag {
    /// Storage form (the digest itself)
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Parse the storage form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let digest: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Storage(format!("replay key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(digest))
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// `Requested` notification emitted for every accepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Position in this ledger's event log (starts at 0)
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Ledger that emitted the event
    pub role: ChainRole,

    /// Step that ran
    pub step: RequestStep,

    /// Request direction
    pub direction: Direction,

    /// Relay correlation id
    pub id: u64,

    /// Holder the request acted for
    pub requestor: Address,

    /// Resolved storage key
    pub key: StorageKey,

    /// Value carried by the request
    pub value: Word,

    /// Emission time
    pub emitted_at: DateTime<Utc>,
}

impl RequestEvent {
    /// Rebuild the request this event mirrors on the other ledger
    pub fn to_request(&self) -> Request {
        Request::new(self.direction, self.id, self.requestor, &self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; ADDRESS_LEN])
    }

    #[test]
    fn test_amount_word_is_left_padded() {
        let word = Word::from_amount(1_000_000_000_000_000_000);
        assert!(word.as_bytes()[..24].iter().all(|b| *b == 0));
        assert_eq!(word.to_amount().unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_amount_out_of_range() {
        let mut bytes = [0u8; WORD_LEN];
        bytes[0] = 1;
        let err = Word::new(bytes).to_amount().unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));
    }

    #[test]
    fn test_address_word_is_right_padded() {
        let word = Word::from_address(&addr(0xab));
        assert_eq!(&word.as_bytes()[..ADDRESS_LEN], &[0xab; ADDRESS_LEN]);
        assert!(word.as_bytes()[ADDRESS_LEN..].iter().all(|b| *b == 0));
        assert_eq!(word.to_address().unwrap(), addr(0xab));
    }

    #[test]
    fn test_address_word_rejects_padding_and_null() {
        // Amount encoding of a small number lands in the padding bytes
        assert!(Word::from_amount(7).to_address().is_err());
        assert!(Word::ZERO.to_address().is_err());
    }

    #[test]
    fn test_address_parse_and_display() {
        let text = "0x00000000000000000000000000000000000000ff";
        let address: Address = text.parse().unwrap();
        assert_eq!(address.to_string(), text);
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_json_is_hex() {
        let json = serde_json::to_string(&addr(1)).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(ADDRESS_LEN)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr(1));
    }

    #[test]
    fn test_step_table() {
        assert_eq!(ChainRole::Root.step_for(Direction::Enter), RequestStep::ValidateLock);
        assert_eq!(ChainRole::Root.step_for(Direction::Exit), RequestStep::Apply);
        assert_eq!(ChainRole::Child.step_for(Direction::Enter), RequestStep::Apply);
        assert_eq!(ChainRole::Child.step_for(Direction::Exit), RequestStep::ValidateLock);
    }

    #[test]
    fn test_request_tag_bytes() {
        let request = Request::new(
            Direction::Exit,
            42,
            Address::new([3u8; 20]),
            &StorageKey::Balance(Address::new([3u8; 20])),
            Word::from_amount(5),
        );
        let tag = request.tag();
        assert_eq!(RequestTag::from_bytes(&tag.to_bytes()).unwrap(), tag);
        assert!(RequestTag::from_bytes(&[9u8; 9]).is_err());
    }

    #[test]
    fn test_request_tag_identity() {
        let holder = Address::new([3u8; 20]);
        let other = Address::new([4u8; 20]);
        let base = Request::new(
            Direction::Enter,
            0,
            holder,
            &StorageKey::Balance(holder),
            Word::from_amount(5),
        );

        // Same request, same tag, whatever the amount
        let larger = Request {
            value: Word::from_amount(6),
            ..base.clone()
        };
        assert_eq!(base.tag(), larger.tag());

        let other_holder =
            Request::new(Direction::Enter, 0, other, &StorageKey::Balance(other), base.value);
        let owner_slot = Request::new(
            Direction::Enter,
            0,
            holder,
            &StorageKey::Owner,
            Word::from_address(&holder),
        );
        let exit = Request {
            direction: Direction::Exit,
            ..base.clone()
        };
        let next_id = Request { id: 1, ..base.clone() };

        for distinct in [&other_holder, &owner_slot, &exit, &next_id] {
            assert_ne!(base.tag(), distinct.tag());
        }
    }
}
