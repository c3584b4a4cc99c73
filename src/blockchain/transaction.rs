use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Sender used for the reward transaction appended to every mined block
pub const MINING_SENDER: &str = "MINING";

/// Seconds after which a pending transaction is dropped from the pool
pub const TRANSACTION_TIMEOUT_SECS: i64 = 3600;

/// Represents a value transfer between two participants
///
/// Transactions are value objects: they are never mutated once created,
/// and the field order below is the order used by `display_form`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Participant sending the amount
    pub sender: String,

    /// Participant receiving the amount
    pub recipient: String,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new transaction stamped with the current time
    ///
    /// The amount is not validated here; solvency and sign checks belong
    /// to the verifier.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, Utc::now())
    }

    /// Creates a transaction with an explicit timestamp
    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
        }
    }

    /// Creates the mining reward transaction credited to `recipient`
    pub fn new_reward(recipient: impl Into<String>, amount: f64) -> Self {
        Self::new(MINING_SENDER, recipient, amount)
    }

    /// Checks if this is a mining reward transaction
    pub fn is_reward(&self) -> bool {
        self.sender == MINING_SENDER
    }

    /// Checks whether the transaction has outlived the pool timeout at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp > Duration::seconds(TRANSACTION_TIMEOUT_SECS)
    }

    /// Checks whether the transaction has outlived the pool timeout
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Canonical form used for hashing and persistence.
    /// Its compact rendering lists keys in sorted order.
    pub fn canonical_form(&self) -> Value {
        serde_json::json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "timestamp": self.timestamp,
        })
    }

    /// Display-only rendering without the timestamp.
    ///
    /// Never feed this into a hash: two transactions that differ only in
    /// their creation time render identically here.
    pub fn display_form(&self) -> String {
        format!(
            "{{sender: {}, recipient: {}, amount: {}}}",
            self.sender, self.recipient, self.amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new("alice", "bob", 10.5);

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
        assert_eq!(transaction.amount, 10.5);
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::new_reward("miner", 10.0);

        assert_eq!(transaction.sender, MINING_SENDER);
        assert_eq!(transaction.recipient, "miner");
        assert_eq!(transaction.amount, 10.0);
        assert!(transaction.is_reward());
    }

    #[test]
    fn test_expiry_boundary() {
        let created = Utc::now();
        let transaction = Transaction::with_timestamp("alice", "bob", 1.0, created);

        assert!(!transaction.is_expired_at(created));
        assert!(!transaction.is_expired_at(created + Duration::seconds(TRANSACTION_TIMEOUT_SECS)));
        assert!(transaction.is_expired_at(created + Duration::seconds(TRANSACTION_TIMEOUT_SECS + 1)));
    }

    #[test]
    fn test_canonical_form_includes_timestamp() {
        let created = Utc::now();
        let a = Transaction::with_timestamp("alice", "bob", 1.0, created);
        let b = Transaction::with_timestamp("alice", "bob", 1.0, created + Duration::seconds(1));

        assert_ne!(a.canonical_form(), b.canonical_form());
        assert_eq!(a.display_form(), b.display_form());

        let rendered = a.canonical_form().to_string();
        assert!(rendered.starts_with("{\"amount\":1.0,\"recipient\":\"bob\""));
    }
}
