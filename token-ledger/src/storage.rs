//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `state` - Slot values (key: bincode(StorageKey), value: 32-byte word)
//! - `events` - `Requested` event log (key: big-endian sequence)
//! - `replay` - Applied request tags (key: 32-byte request digest)
//! - `meta` - Store metadata (the role the store was created for)
//!
//! Every transition is written as a single `WriteBatch`, so a crash never
//! leaves a slot update without its event or replay record.

use crate::{
    config::StorageConfig,
    error::{Error, Result},
    keys::StorageKey,
    state::{LedgerState, SlotWrite, Transition},
    types::{Address, ChainRole, RequestEvent, RequestTag, Word, WORD_LEN},
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;

/// Column family names
const CF_STATE: &str = "state";
const CF_EVENTS: &str = "events";
const CF_REPLAY: &str = "replay";
const CF_META: &str = "meta";

const META_ROLE: &[u8] = b"role";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_STATE, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_REPLAY, Self::cf_options_replay()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // State is read on every restart, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_replay() -> Options {
        let mut opts = Options::default();
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Bind the store to a role, rejecting a store created for the other one
    pub fn claim_role(&self, role: ChainRole) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;

        match self.db.get_cf(cf, META_ROLE)? {
            Some(stored) => {
                let stored: ChainRole = bincode::deserialize(&stored)?;
                if stored != role {
                    return Err(Error::WrongRole(format!(
                        "store at {:?} belongs to a {} ledger, not {}",
                        self.db.path(),
                        stored,
                        role
                    )));
                }
            }
            None => {
                self.db.put_cf(cf, META_ROLE, bincode::serialize(&role)?)?;
                tracing::info!(role = %role, "Store bound to role");
            }
        }

        Ok(())
    }

    /// Persist a transition atomically
    pub fn commit_transition(&self, transition: &Transition) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_state = self.cf_handle(CF_STATE)?;
        for write in &transition.writes {
            let key = bincode::serialize(&write.key())?;
            batch.put_cf(cf_state, key, write.value().as_bytes());
        }

        if let Some(tag) = transition.processed {
            let cf_replay = self.cf_handle(CF_REPLAY)?;
            batch.put_cf(cf_replay, tag.to_bytes(), b"");
        }

        if let Some(ref event) = transition.event {
            let cf_events = self.cf_handle(CF_EVENTS)?;
            batch.put_cf(cf_events, event.sequence.to_be_bytes(), bincode::serialize(event)?);
        }

        self.db.write(batch)?;

        tracing::debug!(
            writes = transition.writes.len(),
            event = transition.event.as_ref().map(|e| e.sequence),
            "Transition persisted"
        );

        Ok(())
    }

    /// Load persisted state, `None` when the store is empty
    pub fn load_state(&self) -> Result<Option<LedgerState>> {
        let cf_state = self.cf_handle(CF_STATE)?;

        let mut writes = Vec::new();
        for item in self.db.iterator_cf(cf_state, IteratorMode::Start) {
            let (key, value) = item?;
            let key: StorageKey = bincode::deserialize(&key)?;
            let value: [u8; WORD_LEN] = value.as_ref().try_into().map_err(|_| {
                Error::Storage(format!("slot {} holds {} bytes", key, value.len()))
            })?;
            writes.push(SlotWrite::from_stored(key, &Word::new(value))?);
        }

        let owner = writes.iter().find_map(|write| match write {
            SlotWrite::Owner(owner) => Some(*owner),
            _ => None,
        });

        let owner: Address = match owner {
            Some(owner) => owner,
            None if writes.is_empty() => return Ok(None),
            None => {
                return Err(Error::Storage(
                    "persisted state has no owner slot".to_string(),
                ))
            }
        };

        let mut state = LedgerState::new(owner)?;
        for write in &writes {
            state.write_slot(write);
        }

        let cf_replay = self.cf_handle(CF_REPLAY)?;
        for item in self.db.iterator_cf(cf_replay, IteratorMode::Start) {
            let (key, _) = item?;
            state.mark_processed(RequestTag::from_bytes(&key)?);
        }

        if let Some(last) = self.latest_event()? {
            state.set_next_sequence(last.sequence + 1);
        }

        tracing::info!(
            owner = %state.owner(),
            total_supply = state.total_supply(),
            next_sequence = state.next_sequence(),
            "Loaded ledger state"
        );

        Ok(Some(state))
    }

    /// Get the most recent event
    pub fn latest_event(&self) -> Result<Option<RequestEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;

        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Get events with `sequence >= from`, at most `limit`
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<RequestEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();
        let iter = self.db.iterator_cf(
            cf,
            IteratorMode::From(&start, rocksdb::Direction::Forward),
        );

        let mut events = Vec::new();
        for item in iter.take(limit) {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }

        Ok(events)
    }
}
