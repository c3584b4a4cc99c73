// Server settings, read from the command line with environment fallbacks

use std::path::PathBuf;

use clap::Parser;

use crate::blockchain::{LedgerConfig, MINING_REWARD};

#[derive(Debug, Clone, Parser)]
#[command(name = "pow-ledger")]
#[command(about = "Single-node proof-of-work ledger with a REST API", long_about = None)]
pub struct Settings {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory of the ledger database
    #[arg(long, env = "DATA_DIR", default_value = "data/ledger")]
    pub data_dir: PathBuf,

    /// Keep ledger state in process memory only
    #[arg(long)]
    pub in_memory: bool,

    /// Amount credited per mined block
    #[arg(long, env = "MINING_REWARD", default_value_t = MINING_REWARD)]
    pub mining_reward: f64,

    /// Give up mining after this many proof candidates
    #[arg(long, env = "MAX_PROOF_ATTEMPTS")]
    pub max_proof_attempts: Option<u64>,

    /// Store proof-of-work attempts on mined blocks
    #[arg(long)]
    pub record_pow_attempts: bool,
}

impl Settings {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            mining_reward: self.mining_reward,
            max_proof_attempts: self.max_proof_attempts,
            record_pow_attempts: self.record_pow_attempts,
        }
    }
}
