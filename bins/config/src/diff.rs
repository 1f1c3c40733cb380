//! Diff command - compare two properties files.

use std::path::PathBuf;

use clap::Args;
use netadmin::config::ConfigDiff;
use netadmin::{NetworkConfiguration, Result};

use crate::load;

#[derive(Args)]
pub struct DiffArgs {
    /// Current properties file
    pub current: PathBuf,

    /// Desired properties file
    pub desired: PathBuf,
}

pub fn run(args: DiffArgs) -> Result<()> {
    let current = NetworkConfiguration::from_properties(&load::properties(&args.current)?, &[]);
    let desired = NetworkConfiguration::from_properties(&load::properties(&args.desired)?, &[]);

    let diff = ConfigDiff::compute(&current, &desired);
    println!("{}", diff.summary());
    if !diff.is_empty() {
        eprintln!("{} interface(s) differ", diff.change_count());
    }
    Ok(())
}
