// Proof of work
//
// The puzzle hashes the pending transactions, the previous block hash and a
// candidate proof. A proof is valid when the hex digest starts with a fixed
// prefix; difficulty never changes.

use log::debug;

use super::block::{sha256_hex, PowAttempt};
use super::transaction::Transaction;

/// Prefix a proof digest must start with (8 leading zero bits)
pub const DIFFICULTY_PREFIX: &str = "00";

/// Attempt cap used by debug and simulation paths
pub const DEBUG_ATTEMPT_CAP: u64 = 1000;

/// Outcome of a bounded or traced proof search
#[derive(Debug, Clone, PartialEq)]
pub struct ProofSearch {
    /// The winning proof, if one was found within the budget
    pub proof: Option<u64>,

    /// Number of candidates tried
    pub attempts: u64,

    /// The first candidates tried, plus the winner when it fell outside that window
    pub trace: Vec<PowAttempt>,
}

/// Renders the transactions part of the puzzle input
fn transactions_input(transactions: &[Transaction]) -> String {
    let forms = transactions
        .iter()
        .map(Transaction::canonical_form)
        .collect::<Vec<_>>();
    serde_json::Value::Array(forms).to_string()
}

/// Digest for a candidate proof
pub fn proof_hash(transactions: &[Transaction], previous_hash: &str, proof: u64) -> String {
    hash_with_prefix(&transactions_input(transactions), previous_hash, proof)
}

fn hash_with_prefix(transactions: &str, previous_hash: &str, proof: u64) -> String {
    let guess = format!("{}{}{}", transactions, previous_hash, proof);
    sha256_hex(guess.as_bytes())
}

/// Checks whether `proof` solves the puzzle for the given transactions and previous hash
pub fn valid_proof(transactions: &[Transaction], previous_hash: &str, proof: u64) -> bool {
    proof_hash(transactions, previous_hash, proof).starts_with(DIFFICULTY_PREFIX)
}

/// Scans proofs from zero upwards and returns the first valid one
///
/// This loop has no upper bound; use `search_proof_bounded` when a cap is needed.
pub fn search_proof(transactions: &[Transaction], previous_hash: &str) -> u64 {
    let input = transactions_input(transactions);
    let mut proof = 0;
    while !hash_with_prefix(&input, previous_hash, proof).starts_with(DIFFICULTY_PREFIX) {
        proof += 1;
    }
    debug!("Found proof {} after {} attempts", proof, proof + 1);
    proof
}

/// Proof search with an optional attempt cap that records up to `trace_limit` attempts
///
/// # Arguments
///
/// * `transactions` - The transactions the proof covers
/// * `previous_hash` - Hash of the block being extended
/// * `max_attempts` - Stop after this many candidates; `None` searches without bound
/// * `trace_limit` - How many attempts to keep in the trace
pub fn search_proof_bounded(
    transactions: &[Transaction],
    previous_hash: &str,
    max_attempts: Option<u64>,
    trace_limit: usize,
) -> ProofSearch {
    let input = transactions_input(transactions);
    let mut trace = Vec::new();
    let mut attempts = 0u64;

    loop {
        if max_attempts.is_some_and(|max| attempts >= max) {
            debug!("Proof search gave up after {} attempts", attempts);
            return ProofSearch {
                proof: None,
                attempts,
                trace,
            };
        }

        let proof = attempts;
        let hash = hash_with_prefix(&input, previous_hash, proof);
        let valid = hash.starts_with(DIFFICULTY_PREFIX);
        attempts += 1;

        if trace.len() < trace_limit || valid {
            trace.push(PowAttempt { proof, hash, valid });
        }

        if valid {
            debug!("Found proof {} after {} attempts", proof, attempts);
            return ProofSearch {
                proof: Some(proof),
                attempts,
                trace,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> Vec<Transaction> {
        vec![
            Transaction::new("alice", "bob", 3.0),
            Transaction::new("bob", "carol", 1.5),
        ]
    }

    #[test]
    fn test_search_finds_valid_proof() {
        let pool = sample_pool();
        let proof = search_proof(&pool, "abc");

        assert!(valid_proof(&pool, "abc", proof));
        for earlier in 0..proof {
            assert!(!valid_proof(&pool, "abc", earlier));
        }
    }

    #[test]
    fn test_empty_pool_has_proof() {
        let proof = search_proof(&[], "");
        assert!(valid_proof(&[], "", proof));
    }

    #[test]
    fn test_proof_is_bound_to_previous_hash() {
        let pool = sample_pool();
        let proof = search_proof(&pool, "abc");
        let other = search_proof(&pool, "abd");

        assert!(valid_proof(&pool, "abd", other));
        assert_eq!(proof_hash(&pool, "abc", proof).len(), 64);
        assert_ne!(proof_hash(&pool, "abc", proof), proof_hash(&pool, "abd", proof));
    }

    #[test]
    fn test_bounded_search_matches_unbounded() {
        let pool = sample_pool();
        let expected = search_proof(&pool, "prev");
        let search = search_proof_bounded(&pool, "prev", None, 5);

        assert_eq!(search.proof, Some(expected));
        assert_eq!(search.attempts, expected + 1);
        let last = search.trace.last().unwrap();
        assert!(last.valid);
        assert_eq!(last.proof, expected);
        assert!(search.trace.len() <= 6);
    }

    #[test]
    fn test_bounded_search_reports_partial_result() {
        let pool = sample_pool();
        let expected = search_proof(&pool, "prev");
        if expected == 0 {
            return;
        }

        let search = search_proof_bounded(&pool, "prev", Some(expected), DEBUG_ATTEMPT_CAP as usize);
        assert_eq!(search.proof, None);
        assert_eq!(search.attempts, expected);
        assert!(search.trace.iter().all(|attempt| !attempt.valid));
    }
}
