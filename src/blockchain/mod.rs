// Blockchain module
//
// This module contains the ledger engine:
// - Transaction and Block data model
// - Proof of work search and verification
// - Ledger (chain plus pending pool) per participant
// - Registry of ledgers by participant identity
// - Persistence backends

pub mod block;
pub mod chain;
pub mod proof;
pub mod registry;
pub mod storage;
pub mod transaction;
pub mod verification;

// Re-export main components for easier access
pub use block::{Block, BlockView, HashAudit, PowAttempt};
pub use chain::{Ledger, LedgerConfig, LedgerError, MINING_REWARD};
pub use registry::LedgerRegistry;
pub use storage::{MemoryStore, PersistenceStore, SledStore, StorageError};
pub use transaction::Transaction;
pub use verification::ChainViolation;
