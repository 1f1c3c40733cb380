//! Firewall commands - decode stored rule sets, render or apply them.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use netadmin::firewall::{ApplyOptions, FirewallApplier, FirewallConfiguration, render};
use netadmin::services::TokioCommandExecutor;
use netadmin::validation::Validatable;
use netadmin::{Error, Result};

use crate::{OutputFormat, load};

#[derive(Subcommand)]
pub enum FirewallCmd {
    /// Print the decoded rules
    Decode(DecodeArgs),

    /// Print the iptables commands for the rules
    Rules(RulesArgs),

    /// Replace the managed chains with the rules
    Apply(ApplyArgs),
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Firewall properties file
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct RulesArgs {
    /// Firewall properties file
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Firewall properties file
    pub file: PathBuf,

    /// Print the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(cmd: FirewallCmd) -> Result<()> {
    match cmd {
        FirewallCmd::Decode(args) => load::print(&decode(&args.file)?, args.format),
        FirewallCmd::Rules(args) => {
            let config = decode(&args.file)?;
            config.validate().into_result()?;
            for rule in render(&config) {
                println!("{}", rule);
            }
            Ok(())
        }
        FirewallCmd::Apply(args) => apply(args).await,
    }
}

fn decode(path: &std::path::Path) -> Result<FirewallConfiguration> {
    Ok(FirewallConfiguration::from_properties(&load::properties(path)?))
}

async fn apply(args: ApplyArgs) -> Result<()> {
    let config = decode(&args.file)?;
    let applier = FirewallApplier::new(Arc::new(TokioCommandExecutor));
    let result = applier
        .apply(&config, ApplyOptions { dry_run: args.dry_run })
        .await?;

    if args.dry_run {
        for line in &result.summary {
            println!("{}", line);
        }
    } else {
        println!("{}", result.summary_text());
    }
    for failure in &result.errors {
        eprintln!("{}", failure);
    }

    if result.is_success() {
        Ok(())
    } else {
        Err(Error::Internal(format!(
            "{} firewall rule(s) failed",
            result.errors.len()
        )))
    }
}
