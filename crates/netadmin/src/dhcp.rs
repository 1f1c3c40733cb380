//! `dhcpd` configuration rendering.
//!
//! Every Ethernet or WiFi interface with an enabled DHCPv4 server and an
//! addressed IPv4 role (LAN or WAN) gets a configuration file at
//! [`LifecycleOptions::conf_file`]`("dhcpd", name)`, which is where the
//! lifecycle controller starts the server from.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lifecycle::LifecycleOptions;
use crate::model::{
    DhcpServer4Config, InterfaceType, NetInterfaceConfig, NetStatus, NetworkConfiguration,
};
use crate::util::{netmask, network_address};

/// The enabled DHCP server of `iface`, if it should run one.
pub fn server_config(iface: &NetInterfaceConfig) -> Option<&DhcpServer4Config> {
    if !matches!(iface.kind, InterfaceType::Ethernet | InterfaceType::Wifi) {
        return None;
    }
    if !matches!(iface.ip4_status(), NetStatus::EnabledLan | NetStatus::EnabledWan) {
        return None;
    }
    iface
        .addresses
        .iter()
        .find_map(|a| a.dhcp_server4())
        .filter(|d| d.enabled)
}

/// Render the `dhcpd` configuration of `iface`.
///
/// Returns `Ok(None)` when the interface runs no DHCP server. The router and,
/// with DNS pass-through, the name server are the interface address itself.
pub fn render(iface: &NetInterfaceConfig) -> Result<Option<String>> {
    let Some(server) = server_config(iface) else {
        return Ok(None);
    };
    let name = &iface.name;
    let address = iface.ip4().and_then(|ip4| ip4.address).ok_or_else(|| {
        Error::Configuration(format!("DHCP server on {} needs a static IPv4 address", name))
    })?;
    let (start, end) = server.range_start.zip(server.range_end).ok_or_else(|| {
        Error::RequiredAttributeMissing(format!("DHCP server range of {}", name))
    })?;

    Ok(Some(render_subnet(name, address, server, start, end)))
}

fn render_subnet(
    name: &str,
    address: Ipv4Addr,
    server: &DhcpServer4Config,
    start: Ipv4Addr,
    end: Ipv4Addr,
) -> String {
    let mut out = String::new();
    // writing to a String cannot fail
    let _ = writeln!(out, "# enabled? {}", server.enabled);
    let _ = writeln!(out, "# prefix: {}", server.prefix);
    let _ = writeln!(out, "# pass DNS? {}", server.pass_dns);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "subnet {} netmask {} {{",
        network_address(address, server.prefix),
        netmask(server.prefix)
    );
    if server.pass_dns {
        let _ = writeln!(out, "    option domain-name-servers {};", address);
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "    interface {};", name);
    let _ = writeln!(out, "    option routers {};", address);
    let _ = writeln!(out, "    default-lease-time {};", server.default_lease_time);
    let _ = writeln!(out, "    max-lease-time {};", server.max_lease_time);
    let _ = writeln!(out, "    pool {{");
    let _ = writeln!(out, "        range {} {};", start, end);
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

/// Write the configuration of every DHCP server in `config`.
///
/// Best effort: an interface whose configuration cannot be rendered or
/// written is logged and skipped. Returns the files written.
pub async fn write_configs(
    config: &NetworkConfiguration,
    options: &LifecycleOptions,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for iface in config.interfaces() {
        let contents = match render(iface) {
            Ok(Some(contents)) => contents,
            Ok(None) => continue,
            Err(e) => {
                warn!(interface = %iface.name, error = %e, "cannot render DHCP server configuration");
                continue;
            }
        };

        let path = options.conf_file("dhcpd", &iface.name);
        match write_file(&path, &contents).await {
            Ok(()) => {
                debug!(interface = %iface.name, path = %path.display(), "DHCP server configuration written");
                written.push(path);
            }
            Err(e) => {
                warn!(interface = %iface.name, error = %e, "cannot write DHCP server configuration")
            }
        }
    }
    written
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::from(e).with_context(format!("writing {}", path.display())))
}
