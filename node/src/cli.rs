//! # CLI Interface
//!
//! Command-line argument structure for `shroud-node`, built with `clap`
//! derive. Two subcommands: `simulate` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shroud consortium devnet operator.
///
/// Wires the Shroud core to its reference collaborators and runs a
/// simulated consortium end to end: private transfers, anonymous batch
/// votes, settlement, re-verification with slashing, a consortium freeze
/// and a court-ordered decryption.
#[derive(Parser, Debug)]
#[command(
    name = "shroud-node",
    about = "Shroud consortium devnet operator",
    version,
    propagate_version = true
)]
pub struct ShroudNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulated consortium end to end and print metrics.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of consortium members.
    #[arg(long, default_value_t = 12)]
    pub members: usize,

    /// Number of private transfers to submit.
    #[arg(long, default_value_t = 250)]
    pub transactions: usize,

    /// Members that vote against the evidence on every ballot.
    #[arg(long, default_value_t = 2)]
    pub dishonest: usize,

    /// Directory for the sled store. A temporary store is used when omitted.
    #[arg(long, short = 'd', env = "SHROUD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON file with `ProtocolConfig` overrides.
    #[arg(long, short = 'c', env = "SHROUD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "SHROUD_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Seed for the simulation's randomness (amounts, latencies, sampling).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
