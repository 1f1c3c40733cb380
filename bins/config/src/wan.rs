//! WAN check command - apply WAN exclusivity against live interfaces.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Args;
use netadmin::Result;
use netadmin::services::{NetworkService, SysfsNetworkService};
use netadmin::wan::WanExclusivityGuard;

use crate::{OutputFormat, load};

#[derive(Args)]
pub struct WanCheckArgs {
    /// Properties file currently in effect
    pub old: PathBuf,

    /// Incoming properties file
    pub new: PathBuf,

    /// Directory listing the live interfaces
    #[arg(long, default_value = "/sys/class/net")]
    pub sysfs: PathBuf,

    /// Print the resulting properties
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

pub async fn run(args: WanCheckArgs) -> Result<()> {
    let old = load::properties(&args.old)?;
    let mut new = load::properties(&args.new)?;

    let live: BTreeSet<String> = SysfsNetworkService::new(args.sysfs.clone())
        .interfaces()
        .await?
        .into_iter()
        .map(|i| i.name)
        .collect();

    let disabled = WanExclusivityGuard::new().enforce_with_live(&old, &mut new, &live);
    if disabled.is_empty() {
        println!("no WAN changes");
    } else {
        for name in &disabled {
            println!("WAN disabled on {} (not present)", name);
        }
    }

    match args.format {
        Some(format) => load::print(&new, format),
        None => Ok(()),
    }
}
