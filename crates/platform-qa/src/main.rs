//! platform-qa CLI
//!
//! Resolves services and test identities of a registry platform environment.

use clap::Parser;

use platform_qa::cli::CliResult;
use platform_qa::Cli;
use platform_qa_common::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(LogConfig {
        json: cli.json_logs,
        ..LogConfig::default()
    })?;
    cli.run().await
}
