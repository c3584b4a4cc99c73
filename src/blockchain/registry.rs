use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use uuid::Uuid;

use super::chain::{Ledger, LedgerConfig};
use super::storage::{self, MemoryStore, PersistenceStore};

/// Maps participant identities to their ledgers
///
/// Ledgers are created on first use and restored from the shared store, so
/// dropping the registry loses nothing that was persisted.
#[derive(Clone)]
pub struct LedgerRegistry {
    ledgers: Arc<DashMap<String, Arc<Ledger>>>,
    store: Arc<dyn PersistenceStore>,
    config: LedgerConfig,
}

impl std::fmt::Debug for LedgerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRegistry")
            .field("ledgers", &self.ledgers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl LedgerRegistry {
    /// Creates a registry whose ledgers persist to `store`
    pub fn new(store: Arc<dyn PersistenceStore>, config: LedgerConfig) -> Self {
        LedgerRegistry {
            ledgers: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    /// Creates a registry backed by process memory
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Gets the ledger for `participant`, creating it if needed
    pub fn ledger(&self, participant: &str) -> Arc<Ledger> {
        if let Some(ledger) = self.ledgers.get(participant) {
            return ledger.clone();
        }

        self.ledgers
            .entry(participant.to_string())
            .or_insert_with(|| {
                info!("Opening ledger for {}", participant);
                Arc::new(Ledger::new(participant, self.store.clone(), self.config.clone()))
            })
            .clone()
    }

    /// Gets the ledger for `participant` for reading
    ///
    /// Identities with no open or stored ledger get a detached genesis-only
    /// ledger that is not registered, so lookups of unknown identities leave
    /// the registry unchanged.
    pub fn view(&self, participant: &str) -> Arc<Ledger> {
        if let Some(ledger) = self.ledgers.get(participant) {
            return ledger.clone();
        }

        if self.is_stored(participant) {
            return self.ledger(participant);
        }

        Arc::new(Ledger::new(participant, self.store.clone(), self.config.clone()))
    }

    fn is_stored(&self, participant: &str) -> bool {
        matches!(self.store.load(&storage::chain_key(participant)), Ok(Some(_)))
    }

    /// Opens a ledger under a freshly generated identity
    pub fn create_anonymous(&self) -> Arc<Ledger> {
        let participant = Uuid::new_v4().to_string();
        self.ledger(&participant)
    }

    /// Forgets the in-memory ledger for `participant`; its stored state remains
    pub fn release(&self, participant: &str) -> bool {
        self.ledgers.remove(participant).is_some()
    }

    /// Identities with an open ledger, sorted
    pub fn participants(&self) -> Vec<String> {
        let mut participants: Vec<String> =
            self.ledgers.iter().map(|entry| entry.key().clone()).collect();
        participants.sort();
        participants
    }
}
