use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use super::block::{Block, HashAudit, PowAttempt};
use super::proof::{search_proof, search_proof_bounded, ProofSearch, DEBUG_ATTEMPT_CAP};
use super::storage::{self, MemoryStore, PersistenceStore, StorageError};
use super::transaction::{Transaction, MINING_SENDER};
use super::verification::{self, ChainViolation};

/// Reward credited to the miner of every block
pub const MINING_REWARD: f64 = 10.0;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("No valid proof found after {attempts} attempts")]
    ProofNotFound { attempts: u64 },

    #[error("Invalid chain: {0}")]
    InvalidChain(ChainViolation),

    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

/// Tunables for a ledger instance
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Amount credited to the hosting participant per mined block
    pub mining_reward: f64,

    /// Give up mining after this many proof candidates; `None` never gives up
    pub max_proof_attempts: Option<u64>,

    /// Keep a trace of proof attempts on each mined block
    pub record_pow_attempts: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            mining_reward: MINING_REWARD,
            max_proof_attempts: None,
            record_pow_attempts: false,
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl LedgerState {
    fn fresh() -> Self {
        LedgerState {
            chain: vec![Block::genesis()],
            pending: Vec::new(),
        }
    }

    /// Received over committed blocks minus sent over committed blocks and the pool
    fn balance_of(&self, participant: &str) -> f64 {
        let sent_pending: f64 = self
            .pending
            .iter()
            .filter(|tx| tx.sender == participant)
            .map(|tx| tx.amount)
            .sum();
        self.confirmed_balance_of(participant) - sent_pending
    }

    fn confirmed_balance_of(&self, participant: &str) -> f64 {
        let mut received = 0.0;
        let mut sent = 0.0;
        for tx in self.chain.iter().flat_map(|block| &block.transactions) {
            if tx.recipient == participant {
                received += tx.amount;
            }
            if tx.sender == participant {
                sent += tx.amount;
            }
        }
        received - sent
    }

    fn block(&self, index: u64) -> Result<&Block, LedgerError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.chain.get(i))
            .ok_or(LedgerError::BlockNotFound(index))
    }
}

/// The chain and pending pool owned by one participant
///
/// All reads and writes go through a single lock, and every mutation is
/// followed by a save to the backing store.
pub struct Ledger {
    /// Identity balances and mining rewards are computed for
    participant: String,

    config: LedgerConfig,

    store: Arc<dyn PersistenceStore>,

    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("participant", &self.participant)
            .field("config", &self.config)
            .finish()
    }
}

impl Ledger {
    /// Creates a ledger for `participant`, restoring any state saved in `store`
    ///
    /// # Arguments
    ///
    /// * `participant` - The identity this ledger belongs to
    /// * `store` - Where the chain and pending pool are persisted
    /// * `config` - Mining reward and proof search settings
    pub fn new(
        participant: impl Into<String>,
        store: Arc<dyn PersistenceStore>,
        config: LedgerConfig,
    ) -> Self {
        let ledger = Ledger {
            participant: participant.into(),
            config,
            store,
            state: Mutex::new(LedgerState::fresh()),
        };
        ledger.load_data();
        ledger
    }

    /// Creates a ledger backed by a private in-memory store
    pub fn in_memory(participant: impl Into<String>) -> Self {
        Self::new(participant, Arc::new(MemoryStore::new()), LedgerConfig::default())
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Replaces the in-memory state with what the store holds
    ///
    /// Missing, unreadable or corrupt records leave a fresh genesis-only ledger.
    pub fn load_data(&self) {
        let restored = self.restore();
        *self.state.lock() = restored;
    }

    fn restore(&self) -> LedgerState {
        match storage::load_ledger(self.store.as_ref(), &self.participant) {
            Ok(Some((chain, pending))) => match verification::find_violation(&chain) {
                None => {
                    info!(
                        "Loaded ledger for {} with {} blocks and {} open transactions",
                        self.participant,
                        chain.len(),
                        pending.len()
                    );
                    LedgerState { chain, pending }
                }
                Some(violation) => {
                    warn!(
                        "Stored chain for {} is corrupt ({}), starting from genesis",
                        self.participant, violation
                    );
                    LedgerState::fresh()
                }
            },
            Ok(None) => {
                info!("No stored ledger for {}, starting from genesis", self.participant);
                LedgerState::fresh()
            }
            Err(err) => {
                warn!("Failed to load ledger for {}: {}", self.participant, err);
                warn!("Starting {} from genesis", self.participant);
                LedgerState::fresh()
            }
        }
    }

    /// Writes the current chain and pending pool to the store
    pub fn save_data(&self) -> Result<(), LedgerError> {
        let state = self.state.lock();
        storage::save_ledger(self.store.as_ref(), &self.participant, &state.chain, &state.pending)?;
        Ok(())
    }

    /// Saves after a mutation. The mutation stands even if the save fails.
    fn persist(&self, state: &LedgerState) {
        if let Err(err) =
            storage::save_ledger(self.store.as_ref(), &self.participant, &state.chain, &state.pending)
        {
            error!("Failed to persist ledger for {}: {}", self.participant, err);
        }
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        let state = self.state.lock();
        state.chain.last().cloned().unwrap_or_else(Block::genesis)
    }

    /// Balance of the hosting participant
    pub fn get_balance(&self) -> f64 {
        self.balance_of(&self.participant)
    }

    /// Balance of any participant
    ///
    /// Pending sends are subtracted, pending receipts are not counted until
    /// they are mined in.
    pub fn balance_of(&self, participant: &str) -> f64 {
        self.state.lock().balance_of(participant)
    }

    /// Builds a transaction and admits it to the pending pool if the sender can cover it
    ///
    /// # Returns
    ///
    /// false if the solvency check failed; nothing is added in that case
    pub fn add_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> bool {
        self.submit(Transaction::new(sender, recipient, amount))
    }

    /// Admits an already built transaction to the pending pool if the sender can cover it
    pub fn submit(&self, transaction: Transaction) -> bool {
        let mut state = self.state.lock();

        if !verification::verify_transaction(&transaction, |p| state.balance_of(p)) {
            info!(
                "Rejected transaction of {} from {} to {}",
                transaction.amount, transaction.sender, transaction.recipient
            );
            return false;
        }

        info!(
            "Accepted transaction of {} from {} to {}",
            transaction.amount, transaction.sender, transaction.recipient
        );
        state.pending.push(transaction);
        self.persist(&state);
        true
    }

    /// Mines a new block from the pending pool and credits the mining reward
    ///
    /// # Returns
    ///
    /// The newly appended block, or `ProofNotFound` when a proof attempt cap is
    /// configured and was exhausted
    pub fn mine_block(&self) -> Result<Block, LedgerError> {
        let mut state = self.state.lock();

        let last = state
            .chain
            .last()
            .ok_or(LedgerError::InvalidChain(ChainViolation::Empty))?;
        let previous_hash = last.calculate_hash();
        let index = last.index + 1;

        let (proof, trace) = if self.config.max_proof_attempts.is_none() && !self.config.record_pow_attempts {
            (search_proof(&state.pending, &previous_hash), None)
        } else {
            let trace_limit = if self.config.record_pow_attempts {
                DEBUG_ATTEMPT_CAP as usize
            } else {
                0
            };
            let search = search_proof_bounded(
                &state.pending,
                &previous_hash,
                self.config.max_proof_attempts,
                trace_limit,
            );
            match search.proof {
                Some(proof) => (proof, self.config.record_pow_attempts.then_some(search.trace)),
                None => {
                    warn!(
                        "Mining for {} gave up after {} attempts",
                        self.participant, search.attempts
                    );
                    return Err(LedgerError::ProofNotFound {
                        attempts: search.attempts,
                    });
                }
            }
        };

        let mut transactions = state.pending.clone();
        transactions.push(Transaction::new_reward(
            self.participant.clone(),
            self.config.mining_reward,
        ));

        let mut block = Block::new(index, previous_hash, transactions, proof);
        if let Some(trace) = trace {
            block = block.with_pow_attempts(trace);
        }

        state.chain.push(block.clone());
        state.pending.clear();
        self.persist(&state);

        info!(
            "Mined block {} for {} with proof {} and {} transactions",
            block.index,
            self.participant,
            block.proof,
            block.transactions.len()
        );
        Ok(block)
    }

    /// Returns the pending pool after dropping expired transactions
    pub fn get_open_transactions(&self) -> Vec<Transaction> {
        self.open_transactions_at(Utc::now())
    }

    /// Returns the pending pool after dropping transactions expired at `now`
    pub fn open_transactions_at(&self, now: DateTime<Utc>) -> Vec<Transaction> {
        let mut state = self.state.lock();

        let before = state.pending.len();
        state.pending.retain(|tx| !tx.is_expired_at(now));
        let purged = before - state.pending.len();
        if purged > 0 {
            info!("Purged {} expired transactions for {}", purged, self.participant);
            self.persist(&state);
        }

        state.pending.clone()
    }

    /// Re-validates hash links and proofs over the whole chain
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        let state = self.state.lock();
        match verification::find_violation(&state.chain) {
            Some(violation) => Err(LedgerError::InvalidChain(violation)),
            None => Ok(()),
        }
    }

    /// Checks each pending transaction against its sender's committed balance
    ///
    /// Entries are checked independently, so two pending spends that together
    /// exceed the balance both pass here. Admission through `add_transaction`
    /// already counts earlier pending sends.
    pub fn verify_transactions(&self) -> bool {
        let state = self.state.lock();
        verification::verify_transactions(&state.pending, |p| state.confirmed_balance_of(p))
    }

    /// Every identity seen as sender or recipient, plus the hosting participant
    pub fn participants(&self) -> BTreeSet<String> {
        let state = self.state.lock();
        let mut participants = BTreeSet::new();
        participants.insert(self.participant.clone());

        let committed = state.chain.iter().flat_map(|block| &block.transactions);
        for tx in committed.chain(&state.pending) {
            if tx.sender != MINING_SENDER {
                participants.insert(tx.sender.clone());
            }
            participants.insert(tx.recipient.clone());
        }
        participants
    }

    /// The canonical string hashed for block `index` and its digest
    pub fn hash_audit(&self, index: u64) -> Result<HashAudit, LedgerError> {
        let state = self.state.lock();
        Ok(state.block(index)?.hash_audit())
    }

    /// Recorded proof attempts for block `index`
    ///
    /// Blocks mined without recording report a single successful attempt
    /// carrying the stored proof and the block hash.
    pub fn pow_attempts(&self, index: u64) -> Result<Vec<PowAttempt>, LedgerError> {
        let state = self.state.lock();
        let block = state.block(index)?;

        Ok(match &block.pow_attempts {
            Some(attempts) => attempts.clone(),
            None => vec![PowAttempt {
                proof: block.proof,
                hash: block.calculate_hash(),
                valid: true,
            }],
        })
    }

    /// Re-runs a capped proof search over the transactions covered by block `index`
    pub fn simulate_proof_search(&self, index: u64) -> Result<ProofSearch, LedgerError> {
        let (covered, previous_hash) = {
            let state = self.state.lock();
            let block = state.block(index)?;
            let covered = match block.transactions.split_last() {
                Some((_reward, rest)) => rest.to_vec(),
                None => Vec::new(),
            };
            (covered, block.previous_hash.clone())
        };

        Ok(search_proof_bounded(
            &covered,
            &previous_hash,
            Some(DEBUG_ATTEMPT_CAP),
            DEBUG_ATTEMPT_CAP as usize,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::proof::valid_proof;
    use chrono::Duration;

    #[test]
    fn test_new_ledger() {
        let ledger = Ledger::in_memory("alice");
        let chain = ledger.get_chain();

        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_genesis());
        assert_eq!(ledger.get_balance(), 0.0);
        assert!(ledger.get_open_transactions().is_empty());
    }

    #[test]
    fn test_add_transaction_requires_funds() {
        let ledger = Ledger::in_memory("alice");

        assert!(!ledger.add_transaction("alice", "bob", 50.0));
        assert!(ledger.get_open_transactions().is_empty());
    }

    #[test]
    fn test_mine_empty_pool() {
        let ledger = Ledger::in_memory("alice");
        let genesis_hash = Block::genesis().calculate_hash();

        let block = ledger.mine_block().unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, genesis_hash);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].sender, MINING_SENDER);
        assert_eq!(block.transactions[0].recipient, "alice");
        assert_eq!(block.transactions[0].amount, 10.0);
        assert!(valid_proof(&[], &genesis_hash, block.proof));
        assert_eq!(ledger.get_balance(), 10.0);
    }

    #[test]
    fn test_pending_receipts_do_not_count() {
        let ledger = Ledger::in_memory("alice");
        ledger.mine_block().unwrap();

        assert!(ledger.add_transaction("alice", "bob", 10.0));
        assert_eq!(ledger.get_balance(), 0.0);
        assert_eq!(ledger.balance_of("bob"), 0.0);
        assert_eq!(ledger.get_open_transactions().len(), 1);

        // The pending send already counts against alice
        assert!(!ledger.add_transaction("alice", "carol", 1.0));

        ledger.mine_block().unwrap();
        assert_eq!(ledger.balance_of("bob"), 10.0);
        assert_eq!(ledger.get_balance(), 10.0);
        assert!(ledger.get_open_transactions().is_empty());
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn test_expired_transactions_are_purged_on_read() {
        let ledger = Ledger::in_memory("alice");
        ledger.mine_block().unwrap();
        assert!(ledger.add_transaction("alice", "bob", 3.0));

        let now = Utc::now();
        assert_eq!(ledger.open_transactions_at(now).len(), 1);
        assert!(ledger
            .open_transactions_at(now + Duration::seconds(3601))
            .is_empty());
        assert_eq!(ledger.get_balance(), 10.0);
    }

    #[test]
    fn test_verify_transactions_uses_committed_balance() {
        let ledger = Ledger::in_memory("alice");
        ledger.mine_block().unwrap();

        assert!(ledger.add_transaction("alice", "bob", 6.0));
        assert!(ledger.verify_transactions());
    }

    #[test]
    fn test_participants() {
        let ledger = Ledger::in_memory("alice");
        ledger.mine_block().unwrap();
        ledger.add_transaction("alice", "bob", 1.0);

        let participants: Vec<String> = ledger.participants().into_iter().collect();
        assert_eq!(participants, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_hash_audit_and_attempts() {
        let ledger = Ledger::in_memory("alice");
        let block = ledger.mine_block().unwrap();

        let audit = ledger.hash_audit(1).unwrap();
        assert_eq!(audit.hash, block.calculate_hash());
        assert!(matches!(ledger.hash_audit(2), Err(LedgerError::BlockNotFound(2))));

        let attempts = ledger.pow_attempts(1).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].proof, block.proof);
        assert!(attempts[0].valid);
    }

    #[test]
    fn test_recorded_attempts() {
        let config = LedgerConfig {
            record_pow_attempts: true,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new("alice", Arc::new(MemoryStore::new()), config);
        let block = ledger.mine_block().unwrap();

        let attempts = ledger.pow_attempts(1).unwrap();
        assert_eq!(attempts.len() as u64, block.proof.min(DEBUG_ATTEMPT_CAP) + 1);
        assert_eq!(attempts.last().unwrap().proof, block.proof);
        assert!(attempts.last().unwrap().valid);
        assert!(attempts[..attempts.len() - 1].iter().all(|a| !a.valid));
        assert!(ledger.verify_chain().is_ok());

        let simulated = ledger.simulate_proof_search(1).unwrap();
        if block.proof < DEBUG_ATTEMPT_CAP {
            assert_eq!(simulated.proof, Some(block.proof));
        } else {
            assert_eq!(simulated.proof, None);
        }
    }

    #[test]
    fn test_attempt_cap_reports_failure() {
        let expected = search_proof(&[], &Block::genesis().calculate_hash());
        if expected == 0 {
            return;
        }

        let config = LedgerConfig {
            max_proof_attempts: Some(expected),
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new("alice", Arc::new(MemoryStore::new()), config);

        assert!(matches!(
            ledger.mine_block(),
            Err(LedgerError::ProofNotFound { attempts }) if attempts == expected
        ));
        assert_eq!(ledger.get_chain().len(), 1);
    }
}
