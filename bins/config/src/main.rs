//! netadmin-config - Gateway network configuration utility
//!
//! Inspects and checks flat network property files (JSON or YAML) with the
//! same engine the gateway runs.

mod diff;
mod firewall;
mod load;
mod migrate;
mod show;
mod wan;

use clap::{Parser, Subcommand, ValueEnum};
use netadmin::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netadmin-config")]
#[command(about = "Gateway network configuration utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine decisions at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the typed configuration of a properties file
    Show(show::ShowArgs),

    /// Compare two properties files interface by interface
    Diff(diff::DiffArgs),

    /// Rename legacy PPP interfaces against a previous configuration
    Migrate(migrate::MigrateArgs),

    /// Check a new configuration against the live interface list
    WanCheck(wan::WanCheckArgs),

    /// Decode, render or apply firewall rules
    #[command(subcommand)]
    Firewall(firewall::FirewallCmd),
}

/// Serialization format for structured output.
#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Show(args) => show::run(args),
        Command::Diff(args) => diff::run(args),
        Command::Migrate(args) => migrate::run(args),
        Command::WanCheck(args) => wan::run(args).await,
        Command::Firewall(cmd) => firewall::run(cmd).await,
    }
}
