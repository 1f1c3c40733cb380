//! Migrate command - rename legacy PPP interfaces.

use std::path::PathBuf;

use clap::Args;
use netadmin::Result;
use netadmin::migrate::InterfaceMigrator;

use crate::{OutputFormat, load};

#[derive(Args)]
pub struct MigrateArgs {
    /// Incoming properties file
    pub file: PathBuf,

    /// Properties file currently in effect
    #[arg(long)]
    pub previous: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub format: OutputFormat,
}

pub fn run(args: MigrateArgs) -> Result<()> {
    let mut incoming = load::properties(&args.file)?;
    let previous = load::properties(&args.previous)?;

    let migrations = InterfaceMigrator::new().migrate(&mut incoming, &previous);
    for m in &migrations {
        eprintln!("{} -> {}", m.from, m.to);
    }
    if migrations.is_empty() {
        eprintln!("nothing to migrate");
    }
    load::print(&incoming, args.format)
}
