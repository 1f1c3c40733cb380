//! Interface name classification and sysfs enumeration.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Where the kernel exposes network devices.
pub const SYSFS_NET: &str = "/sys/class/net";

static PPP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppp[0-9]+$").expect("valid regex"));

static USB_PORT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-\d+(\.\d+)?$").expect("valid regex"));

/// Ephemeral PPP unit name such as `ppp0`.
pub fn is_ppp_name(name: &str) -> bool {
    PPP_NAME.is_match(name)
}

/// USB-port identity such as `1-1` or `2-1.4`, used for modems that have not
/// brought up a PPP link yet.
pub fn is_usb_port_name(name: &str) -> bool {
    USB_PORT_NAME.is_match(name)
}

/// Monitor-mode and vendor pseudo interfaces that are never managed.
pub fn is_ignored_wifi(name: &str) -> bool {
    name.starts_with("mon.") || name.starts_with("rpine")
}

/// Split a sysfs USB device directory name (`1-1.2`, optionally followed by
/// `:<config>.<iface>`) into bus number and device path.
pub fn split_usb_port(dir: &str) -> Option<(String, String)> {
    let port = dir.split(':').next()?;
    if !is_usb_port_name(port) {
        return None;
    }
    let (bus, path) = port.split_once('-')?;
    Some((bus.to_string(), path.to_string()))
}

/// Get all interface names under `root` (normally [`SYSFS_NET`]).
pub async fn list_interfaces(root: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root).await?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    names.sort();
    Ok(names)
}
