//! Shared utilities for netadmin.

pub mod addr;
pub mod ifname;

pub use addr::{netmask, network_address};
