//! Typed network configuration model.
//!
//! A [`NetworkConfiguration`] is an immutable snapshot built from a
//! [`PropertyStore`] and the live interface list. Each reconciliation pass
//! builds a new snapshot; nothing mutates one in place once published.
//!
//! # Example
//!
//! ```rust
//! use netadmin::model::{InterfaceType, NetworkConfiguration};
//! use netadmin::properties::PropertyStore;
//!
//! let mut props = PropertyStore::new();
//! props.set_interface_names(["eth0"]);
//! props.insert("net.interface.eth0.type", "ETHERNET");
//! props.insert("net.interface.eth0.config.ip4.status", "netIPv4StatusEnabledLAN");
//! props.insert("net.interface.eth0.config.dhcpClient4.enabled", true);
//!
//! let config = NetworkConfiguration::from_properties(&props, &[]);
//! let eth0 = config.get("eth0").unwrap();
//! assert_eq!(eth0.kind, InterfaceType::Ethernet);
//! assert!(eth0.ip4().unwrap().dhcp);
//! ```

mod interpret;
mod types;

pub use interpret::{interface_from_properties, interface_to_properties};
pub use types::*;

use serde::Serialize;
use tracing::{info, warn};

use crate::properties::{PropertyStore, keys, split_list};
use crate::services::LiveInterface;

/// USB identity of a NIC or modem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UsbDevice {
    pub vendor_id: String,
    pub vendor_name: String,
    pub product_id: String,
    pub product_name: String,
    pub bus_number: String,
    pub device_path: String,
}

impl UsbDevice {
    /// Stable port-based name, `<bus>-<devpath>`.
    pub fn port_name(&self) -> String {
        format!("{}-{}", self.bus_number, self.device_path)
    }
}

/// One address configuration of an interface: an ordered fragment list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NetInterfaceAddressConfig {
    /// Selected WiFi mode; `None` for non-WiFi interfaces.
    pub wifi_mode: Option<WifiMode>,
    pub configs: Vec<NetConfig>,
}

impl NetInterfaceAddressConfig {
    pub fn new(configs: Vec<NetConfig>) -> Self {
        Self {
            wifi_mode: None,
            configs,
        }
    }

    /// First fragment of the given kind.
    pub fn find(&self, kind: NetConfigKind) -> Option<&NetConfig> {
        self.configs.iter().find(|c| c.kind() == kind)
    }

    pub fn ip4(&self) -> Option<&Ip4Config> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::Ip4(ip4) => Some(ip4),
            _ => None,
        })
    }

    pub fn ip6(&self) -> Option<&Ip6Config> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::Ip6(ip6) => Some(ip6),
            _ => None,
        })
    }

    /// WiFi fragment for `mode`.
    pub fn wifi(&self, mode: WifiMode) -> Option<&WifiConfig> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::Wifi(w) if w.mode == mode => Some(w),
            _ => None,
        })
    }

    /// WiFi fragment for the selected mode.
    pub fn active_wifi(&self) -> Option<&WifiConfig> {
        self.wifi_mode.and_then(|mode| self.wifi(mode))
    }

    pub fn modem(&self) -> Option<&ModemConfig> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::Modem(m) => Some(m),
            _ => None,
        })
    }

    pub fn dhcp_server4(&self) -> Option<&DhcpServer4Config> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::DhcpServer4(d) => Some(d),
            _ => None,
        })
    }

    pub fn nat(&self) -> Option<&NatAutoConfig> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::NatAuto(n) => Some(n),
            _ => None,
        })
    }
}

/// Configuration of one network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetInterfaceConfig {
    pub name: String,
    pub kind: InterfaceType,
    pub mtu: u32,
    pub auto_connect: bool,
    /// Derived from the live interface list.
    pub is_virtual: bool,
    pub usb: Option<UsbDevice>,
    /// Modem model identifier, for MODEM interfaces.
    pub modem_id: Option<String>,
    pub addresses: Vec<NetInterfaceAddressConfig>,
}

impl NetInterfaceConfig {
    /// Create an interface with a single empty address configuration.
    pub fn new(name: impl Into<String>, kind: InterfaceType) -> Self {
        Self {
            name: name.into(),
            kind,
            mtu: 1500,
            auto_connect: false,
            is_virtual: false,
            usb: None,
            modem_id: None,
            addresses: vec![NetInterfaceAddressConfig::default()],
        }
    }

    /// Builder-style fragment append to the primary address configuration.
    pub fn with_config(mut self, config: NetConfig) -> Self {
        if self.addresses.is_empty() {
            self.addresses.push(NetInterfaceAddressConfig::default());
        }
        self.addresses[0].configs.push(config);
        self
    }

    pub fn primary(&self) -> Option<&NetInterfaceAddressConfig> {
        self.addresses.first()
    }

    pub fn ip4(&self) -> Option<&Ip4Config> {
        self.addresses.iter().find_map(|a| a.ip4())
    }

    pub fn ip4_status(&self) -> NetStatus {
        self.ip4().map(|ip4| ip4.status).unwrap_or_default()
    }

    pub fn is_wan(&self) -> bool {
        self.ip4_status() == NetStatus::EnabledWan
    }

    /// Eligible as a NAT source: nat enabled on a LAN-enabled Ethernet,
    /// WiFi or modem interface.
    pub fn is_nat_source(&self) -> bool {
        matches!(
            self.kind,
            InterfaceType::Ethernet | InterfaceType::Wifi | InterfaceType::Modem
        ) && self.ip4_status() == NetStatus::EnabledLan
            && self
                .addresses
                .iter()
                .any(|a| a.nat().is_some_and(|n| n.masquerade))
    }
}

/// Snapshot of the configuration of every listed interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NetworkConfiguration {
    interfaces: Vec<NetInterfaceConfig>,
    modified: Vec<String>,
}

impl NetworkConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a property bag.
    ///
    /// Best effort: `mon.` interfaces and UNKNOWN-typed interfaces are
    /// skipped, and an interface that fails to build is logged and skipped
    /// without affecting the others.
    pub fn from_properties(props: &PropertyStore, live: &[LiveInterface]) -> Self {
        let mut config = Self::new();

        for name in props.interface_names() {
            if name.starts_with("mon.") {
                continue;
            }
            let live_iface = live.iter().find(|l| l.name == name);
            match interface_from_properties(props, &name, live_iface) {
                Ok(Some(iface)) => config.interfaces.push(iface),
                Ok(None) => info!(interface = %name, "skipping interface of unknown type"),
                Err(e) => warn!(interface = %name, error = %e, "failed to build interface configuration"),
            }
        }

        config.modified = props
            .get_str(keys::MODIFIED_INTERFACE_NAMES)
            .map(split_list)
            .unwrap_or_default();
        config
    }

    /// Flatten the snapshot back into a property bag.
    pub fn to_properties(&self) -> PropertyStore {
        let mut props = PropertyStore::new();
        props.set_interface_names(self.interfaces.iter().map(|i| i.name.as_str()));
        for iface in &self.interfaces {
            interface_to_properties(iface, &mut props);
        }
        if !self.modified.is_empty() {
            props.insert(keys::MODIFIED_INTERFACE_NAMES, self.modified.join(","));
        }
        props
    }

    pub fn get(&self, name: &str) -> Option<&NetInterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn interfaces(&self) -> &[NetInterfaceConfig] {
        &self.interfaces
    }

    /// Insert or replace an interface, keeping list position on replace.
    pub fn upsert(&mut self, iface: NetInterfaceConfig) {
        match self.interfaces.iter_mut().find(|i| i.name == iface.name) {
            Some(slot) => *slot = iface,
            None => self.interfaces.push(iface),
        }
    }

    /// Interfaces touched by the last submission.
    pub fn modified_interface_names(&self) -> &[String] {
        &self.modified
    }

    /// Add to the modified set, ignoring duplicates.
    pub fn mark_modified(&mut self, name: &str) {
        if !self.modified.iter().any(|n| n == name) {
            self.modified.push(name.to_string());
        }
    }

    pub fn wan_interfaces(&self) -> impl Iterator<Item = &NetInterfaceConfig> {
        self.interfaces.iter().filter(|i| i.is_wan())
    }
}
