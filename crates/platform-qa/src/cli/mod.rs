//! Command line front end
//!
//! Resolves a single service or identity of the environment and prints it.
//! With `--hold` the process keeps any tunnels it opened alive until Ctrl-C,
//! which makes it usable as a port-forward helper during manual testing.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{Overrides, ResourceLayout};
use crate::environment::Environment;

pub use commands::{CentralService, DatabaseRole, RegistryService};
pub use error::{CliError, CliResult};

/// Resolve platform services and test identities
#[derive(Parser, Debug)]
#[command(name = "platform-qa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `properties/platform.json` and friends
    #[arg(long, env = "PLATFORM_QA_RESOURCES", default_value = "resources")]
    pub resources: PathBuf,

    /// Emit JSON log lines
    #[arg(long, env = "PLATFORM_QA_JSON_LOGS")]
    pub json_logs: bool,

    /// Keep opened tunnels alive until Ctrl-C
    #[arg(long)]
    pub hold: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a platform-wide service
    Central {
        /// Service to resolve
        #[arg(value_enum)]
        service: CentralService,
    },
    /// Resolve a registry service
    Registry {
        /// Service to resolve
        #[arg(value_enum)]
        service: RegistryService,
        /// Registry namespace (defaults to the configured one)
        #[arg(long = "registry")]
        registry: Option<String>,
        /// Identity for user-scoped services
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the credentials owner of a citus database role
    CitusRole {
        /// Database role
        #[arg(value_enum)]
        role: DatabaseRole,
        /// Registry namespace (defaults to the configured one)
        #[arg(long = "registry")]
        registry: Option<String>,
    },
    /// List identity names from the identity store
    Users {
        /// Registry namespace; platform identities when omitted
        #[arg(long = "registry")]
        registry: Option<String>,
    },
    /// Provision and print a test identity
    User {
        /// Identity name in the identity store
        name: String,
        /// Registry namespace; platform identities when omitted
        #[arg(long = "registry")]
        registry: Option<String>,
    },
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> CliResult<()> {
        let layout = ResourceLayout::new(&self.resources);
        let env = Environment::connect(&layout, &self.overrides).await?;

        let outcome = commands::run(&env, self.command).await;
        if outcome.is_ok() && self.hold && !env.tunnels().is_empty() {
            info!(tunnels = env.tunnels().len(), "Holding tunnels open, press Ctrl-C to exit");
            tokio::signal::ctrl_c().await?;
        }
        env.shutdown().await;
        outcome
    }
}
