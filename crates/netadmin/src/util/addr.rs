//! IPv4 subnet arithmetic.

use std::net::Ipv4Addr;

/// IPv4 netmask for a prefix length; lengths above 32 saturate.
pub fn netmask(prefix: u8) -> Ipv4Addr {
    let bits = u32::MAX.checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Network address of `addr/prefix`.
pub fn network_address(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(netmask(prefix)))
}
