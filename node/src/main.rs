// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Shroud Devnet Operator
//!
//! Entry point for the `shroud-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and runs the requested subcommand:
//!
//! - `simulate` — run a simulated consortium end to end, then print metrics
//! - `version`  — print build version information

mod cli;
mod logging;
mod metrics;
mod simulate;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cli::{Commands, ShroudNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShroudNodeCli::parse();

    match cli.command {
        Commands::Simulate(args) => {
            logging::init_logging(
                "shroud_node=info,shroud_protocol=info,shroud::audit=info",
                LogFormat::from_str_lossy(&args.log_format),
            );
            info!(
                version = env!("CARGO_PKG_VERSION"),
                protocol = shroud_protocol::config::PROTOCOL_VERSION,
                "starting simulation"
            );
            let metrics = NodeMetrics::new().context("failed to register metrics")?;
            simulate::run(args, &metrics).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_version() {
    println!("shroud-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", shroud_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
