use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use log::{info, warn};
use sled::Db;
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Uniform save/load contract over a backing medium, keyed by logical resource name
pub trait PersistenceStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Loads the value stored under `key`
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Makes previous saves durable
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// File-backed store on top of a sled database
pub struct SledStore {
    db: Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens (or creates) a store in the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Opens a store that is removed when dropped (for testing)
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl PersistenceStore for SledStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key.as_bytes())?.map(|value| value.to_vec()))
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Process-memory store, used when no file store is available
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for MemoryStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }
}

/// Opens the sled store at `path`, falling back to process memory if that fails
pub fn open_or_memory<P: AsRef<Path>>(path: P) -> Arc<dyn PersistenceStore> {
    let path = path.as_ref();
    match SledStore::open(path) {
        Ok(store) => {
            info!("Opened ledger store at {}", path.display());
            Arc::new(store)
        }
        Err(err) => {
            warn!("Failed to open ledger store at {}: {}", path.display(), err);
            warn!("Keeping ledger state in memory instead");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Key of the committed chain record for a participant
pub fn chain_key(participant: &str) -> String {
    format!("{}/blockchain", participant)
}

/// Key of the pending pool record for a participant
pub fn pool_key(participant: &str) -> String {
    format!("{}/open_transactions", participant)
}

/// Writes both ledger records for `participant` and flushes the store
pub fn save_ledger(
    store: &dyn PersistenceStore,
    participant: &str,
    chain: &[Block],
    pool: &[Transaction],
) -> Result<(), StorageError> {
    let chain_bytes =
        serde_json::to_vec(chain).map_err(|e| StorageError::SerializationError(e.to_string()))?;
    let pool_bytes =
        serde_json::to_vec(pool).map_err(|e| StorageError::SerializationError(e.to_string()))?;

    store.save(&chain_key(participant), &chain_bytes)?;
    store.save(&pool_key(participant), &pool_bytes)?;
    store.flush()
}

/// Reads both ledger records for `participant`
///
/// Returns `Ok(None)` when no chain has been stored yet. A stored chain with
/// no pool record loads with an empty pool.
pub fn load_ledger(
    store: &dyn PersistenceStore,
    participant: &str,
) -> Result<Option<(Vec<Block>, Vec<Transaction>)>, StorageError> {
    let chain_bytes = match store.load(&chain_key(participant))? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let chain: Vec<Block> = serde_json::from_slice(&chain_bytes)
        .map_err(|e| StorageError::DeserializationError(e.to_string()))?;

    let pool = match store.load(&pool_key(participant))? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?,
        None => Vec::new(),
    };

    Ok(Some((chain, pool)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();

        assert!(store.load("missing").unwrap().is_none());
        store.save("key", b"value").unwrap();
        assert_eq!(store.load("key").unwrap(), Some(b"value".to_vec()));
        store.save("key", b"other").unwrap();
        assert_eq!(store.load("key").unwrap(), Some(b"other".to_vec()));
    }

    #[test]
    fn test_sled_store_roundtrip() {
        let store = SledStore::temporary().unwrap();

        store.save("alice/blockchain", b"[]").unwrap();
        store.flush().unwrap();
        assert_eq!(store.load("alice/blockchain").unwrap(), Some(b"[]".to_vec()));
        assert!(store.load("bob/blockchain").unwrap().is_none());
    }

    #[test]
    fn test_ledger_records_roundtrip() {
        let store = MemoryStore::new();
        let chain = vec![Block::genesis()];
        let pool = vec![Transaction::new("alice", "bob", 2.5)];

        assert!(load_ledger(&store, "alice").unwrap().is_none());

        save_ledger(&store, "alice", &chain, &pool).unwrap();
        let (loaded_chain, loaded_pool) = load_ledger(&store, "alice").unwrap().unwrap();

        assert_eq!(loaded_chain, chain);
        assert_eq!(loaded_pool, pool);
        assert!(load_ledger(&store, "bob").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let store = MemoryStore::new();
        store.save(&chain_key("alice"), b"not json").unwrap();

        assert!(matches!(
            load_ledger(&store, "alice"),
            Err(StorageError::DeserializationError(_))
        ));
    }
}
