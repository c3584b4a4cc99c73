use std::fmt;

use super::block::Block;
use super::proof::valid_proof;
use super::transaction::Transaction;

/// Why a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    /// The chain has no blocks at all
    Empty,

    /// The first block is not the genesis sentinel
    BadGenesis,

    /// `previous_hash` does not match the hash of the preceding block
    BrokenLink { index: u64 },

    /// The stored proof does not solve the puzzle for the block's transactions
    InvalidProof { index: u64 },
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainViolation::Empty => write!(f, "chain is empty"),
            ChainViolation::BadGenesis => write!(f, "first block is not the genesis block"),
            ChainViolation::BrokenLink { index } => {
                write!(f, "block {} does not link to its predecessor", index)
            }
            ChainViolation::InvalidProof { index } => {
                write!(f, "block {} carries an invalid proof of work", index)
            }
        }
    }
}

/// Checks that the sender can cover the amount
///
/// Negative and non-finite amounts are rejected outright so a transfer can
/// never increase the sender's balance.
pub fn verify_transaction<F>(transaction: &Transaction, balance_of: F) -> bool
where
    F: Fn(&str) -> f64,
{
    if !transaction.amount.is_finite() || transaction.amount < 0.0 {
        return false;
    }
    balance_of(&transaction.sender) >= transaction.amount
}

/// Checks every pending transaction against the current balance of its sender
///
/// Each entry is checked on its own. Balances are not carried forward from
/// earlier entries in the pool.
pub fn verify_transactions<F>(pool: &[Transaction], balance_of: F) -> bool
where
    F: Fn(&str) -> f64,
{
    pool.iter().all(|tx| verify_transaction(tx, &balance_of))
}

/// Returns the first integrity violation in `chain`, if any
pub fn find_violation(chain: &[Block]) -> Option<ChainViolation> {
    let first = match chain.first() {
        Some(block) => block,
        None => return Some(ChainViolation::Empty),
    };
    if !first.is_genesis() {
        return Some(ChainViolation::BadGenesis);
    }

    for pair in chain.windows(2) {
        let (previous, block) = (&pair[0], &pair[1]);

        if block.previous_hash != previous.calculate_hash() {
            return Some(ChainViolation::BrokenLink { index: block.index });
        }

        // The reward is appended after the proof is found, so it is not covered by it
        let covered = match block.transactions.split_last() {
            Some((_reward, rest)) => rest,
            None => &[][..],
        };
        if !valid_proof(covered, &block.previous_hash, block.proof) {
            return Some(ChainViolation::InvalidProof { index: block.index });
        }
    }

    None
}

/// Replays hash linkage and proof validity over the whole chain
pub fn verify_chain(chain: &[Block]) -> bool {
    find_violation(chain).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::proof::search_proof;

    fn mine_onto(chain: &mut Vec<Block>, pending: Vec<Transaction>, miner: &str) {
        let last = chain.last().unwrap();
        let previous_hash = last.calculate_hash();
        let proof = search_proof(&pending, &previous_hash);
        let mut transactions = pending;
        transactions.push(Transaction::new_reward(miner, 10.0));
        let index = last.index + 1;
        chain.push(Block::new(index, previous_hash, transactions, proof));
    }

    fn sample_chain() -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        mine_onto(&mut chain, Vec::new(), "alice");
        mine_onto(&mut chain, vec![Transaction::new("alice", "bob", 4.0)], "alice");
        chain
    }

    #[test]
    fn test_mined_chain_is_valid() {
        let chain = sample_chain();
        assert!(verify_chain(&chain));
        assert_eq!(find_violation(&chain), None);
    }

    #[test]
    fn test_tampered_amount_breaks_chain() {
        let mut chain = sample_chain();
        let mut amount = 400.0;
        // A forged amount keeps a valid proof with probability 1/256; skip past those
        loop {
            chain[2].transactions[0].amount = amount;
            if !valid_proof(&chain[2].transactions[..1], &chain[2].previous_hash, chain[2].proof) {
                break;
            }
            amount += 1.0;
        }

        assert_eq!(find_violation(&chain), Some(ChainViolation::InvalidProof { index: 2 }));

        let mut chain = sample_chain();
        chain[1].transactions[0].amount = 1000.0;
        assert_eq!(find_violation(&chain), Some(ChainViolation::BrokenLink { index: 2 }));
    }

    #[test]
    fn test_empty_and_bad_genesis() {
        assert_eq!(find_violation(&[]), Some(ChainViolation::Empty));

        let mut chain = sample_chain();
        chain[0].proof = 1;
        assert!(!verify_chain(&chain));
        assert_eq!(find_violation(&chain), Some(ChainViolation::BadGenesis));
    }

    #[test]
    fn test_verify_transaction_uses_sender_balance() {
        let balance = |participant: &str| if participant == "alice" { 5.0 } else { 0.0 };

        assert!(verify_transaction(&Transaction::new("alice", "bob", 5.0), balance));
        assert!(!verify_transaction(&Transaction::new("alice", "bob", 5.5), balance));
        assert!(!verify_transaction(&Transaction::new("bob", "alice", 1.0), balance));
        assert!(!verify_transaction(&Transaction::new("alice", "bob", -1.0), balance));
        assert!(!verify_transaction(&Transaction::new("alice", "bob", f64::NAN), balance));
    }

    #[test]
    fn test_pool_checked_against_current_balance() {
        let balance = |participant: &str| if participant == "alice" { 5.0 } else { 0.0 };
        let pool = vec![
            Transaction::new("alice", "bob", 4.0),
            Transaction::new("alice", "carol", 4.0),
        ];

        // Each entry fits the current balance even though together they do not
        assert!(verify_transactions(&pool, balance));
        assert!(!verify_transactions(&[Transaction::new("bob", "alice", 1.0)], balance));
    }
}
