use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Proof stored in the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// One step of a proof-of-work search, kept for inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PowAttempt {
    /// Candidate proof value
    pub proof: u64,

    /// Digest produced by the candidate
    pub hash: String,

    /// Whether the digest met the difficulty prefix
    pub valid: bool,
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Hash of the previous block, empty for genesis
    pub previous_hash: String,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Proof of work (nonce)
    pub proof: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Attempts recorded while mining this block, if recording was enabled.
    /// Not part of the hashed content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pow_attempts: Option<Vec<PowAttempt>>,
}

/// Block shape exposed across the API boundary
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockView {
    pub index: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// The exact string that was hashed for a block, alongside its digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HashAudit {
    pub input: String,
    pub hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `previous_hash` - The hash of the previous block
    /// * `transactions` - The list of transactions to include in the block
    /// * `proof` - The proof of work (nonce)
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>, proof: u64) -> Self {
        Self::with_timestamp(index, previous_hash, transactions, proof, Utc::now())
    }

    /// Creates a new block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        proof: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Block {
            index,
            previous_hash,
            transactions,
            proof,
            timestamp,
            pow_attempts: None,
        }
    }

    /// The fixed first block of every chain
    pub fn genesis() -> Self {
        // DateTime<Utc>::default() is the Unix epoch, so genesis hashes identically everywhere
        Self::with_timestamp(0, String::new(), Vec::new(), GENESIS_PROOF, DateTime::<Utc>::default())
    }

    /// Whether this block matches the genesis sentinel
    pub fn is_genesis(&self) -> bool {
        self.index == 0
            && self.previous_hash.is_empty()
            && self.transactions.is_empty()
            && self.proof == GENESIS_PROOF
            && self.timestamp == DateTime::<Utc>::default()
    }

    /// Attaches recorded proof-of-work attempts
    pub fn with_pow_attempts(self, attempts: Vec<PowAttempt>) -> Self {
        Block {
            pow_attempts: Some(attempts),
            ..self
        }
    }

    /// The hashed fields in canonical form. `serde_json::Map` keeps keys
    /// sorted, so the rendered string does not depend on field order here.
    fn canonical_form(&self) -> Value {
        serde_json::json!({
            "index": self.index,
            "previous_hash": self.previous_hash,
            "transactions": self
                .transactions
                .iter()
                .map(Transaction::canonical_form)
                .collect::<Vec<_>>(),
            "proof": self.proof,
            "timestamp": self.timestamp,
        })
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        self.hash_audit().hash
    }

    /// Returns the canonical string that was hashed together with its digest
    pub fn hash_audit(&self) -> HashAudit {
        let input = self.canonical_form().to_string();
        let hash = sha256_hex(input.as_bytes());
        HashAudit { input, hash }
    }

    /// Converts the block to its boundary representation
    pub fn to_view(&self, include_hash: bool) -> BlockView {
        BlockView {
            index: self.index,
            previous_hash: self.previous_hash.clone(),
            transactions: self.transactions.clone(),
            proof: self.proof,
            timestamp: self.timestamp,
            hash: include_hash.then(|| self.calculate_hash()),
        }
    }
}

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
