//! Change reporting between interface configurations.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{
    InterfaceType, NetConfig, NetConfigKind, NetInterfaceConfig, NetworkConfiguration, WifiMode,
};

/// Identity of a fragment within an interface. WiFi fragments are keyed by
/// mode as well, since one per mode may coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentId {
    pub kind: NetConfigKind,
    pub wifi_mode: Option<WifiMode>,
}

impl FragmentId {
    pub fn of(config: &NetConfig) -> Self {
        Self {
            kind: config.kind(),
            wifi_mode: match config {
                NetConfig::Wifi(w) => Some(w.mode),
                _ => None,
            },
        }
    }
}

impl From<NetConfigKind> for FragmentId {
    fn from(kind: NetConfigKind) -> Self {
        Self {
            kind,
            wifi_mode: None,
        }
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wifi_mode {
            Some(mode) => write!(f, "{}.{}", self.kind, mode.key_segment()),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Changes between two configurations of the same interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceChanges {
    /// Fragments present only in the new configuration.
    pub added: Vec<FragmentId>,
    /// Fragments present in both, with different values.
    pub replaced: Vec<FragmentId>,
    /// Fragments present only in the old configuration.
    pub removed: Vec<FragmentId>,
    pub kind: Option<(InterfaceType, InterfaceType)>,
    pub mtu: Option<(u32, u32)>,
    pub auto_connect: Option<(bool, bool)>,
    pub wifi_mode: Option<(Option<WifiMode>, Option<WifiMode>)>,
    pub modem_id: Option<(Option<String>, Option<String>)>,
}

impl InterfaceChanges {
    /// Compare two configurations of one interface, ignoring fragment order.
    pub fn between(old: &NetInterfaceConfig, new: &NetInterfaceConfig) -> Self {
        let old_fragments = fragments_by_id(old);
        let new_fragments = fragments_by_id(new);
        let mut changes = Self::default();

        for (id, old_value) in &old_fragments {
            match new_fragments.get(id) {
                None => changes.removed.push(*id),
                Some(new_value) if new_value != old_value => changes.replaced.push(*id),
                Some(_) => {}
            }
        }
        changes.added = new_fragments
            .keys()
            .filter(|id| !old_fragments.contains_key(id))
            .copied()
            .collect();

        if old.kind != new.kind {
            changes.kind = Some((old.kind, new.kind));
        }
        if old.mtu != new.mtu {
            changes.mtu = Some((old.mtu, new.mtu));
        }
        if old.auto_connect != new.auto_connect {
            changes.auto_connect = Some((old.auto_connect, new.auto_connect));
        }
        let old_mode = old.primary().and_then(|a| a.wifi_mode);
        let new_mode = new.primary().and_then(|a| a.wifi_mode);
        if old_mode != new_mode {
            changes.wifi_mode = Some((old_mode, new_mode));
        }
        if old.modem_id != new.modem_id {
            changes.modem_id = Some((old.modem_id.clone(), new.modem_id.clone()));
        }

        changes
    }

    /// Check if the configurations are equivalent.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.replaced.is_empty()
            && self.removed.is_empty()
            && self.kind.is_none()
            && self.mtu.is_none()
            && self.auto_connect.is_none()
            && self.wifi_mode.is_none()
            && self.modem_id.is_none()
    }

    /// One-line summary, e.g. `mtu=1400, +ip6, ~ip4, -dhcpServer4`.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some((old, new)) = self.kind {
            parts.push(format!("type {}->{}", old, new));
        }
        if let Some((_, mtu)) = self.mtu {
            parts.push(format!("mtu={}", mtu));
        }
        if let Some((_, auto_connect)) = self.auto_connect {
            parts.push(format!("autoconnect={}", auto_connect));
        }
        if let Some((_, mode)) = self.wifi_mode {
            parts.push(format!(
                "wifi.mode={}",
                mode.map(|m| m.as_str()).unwrap_or("none")
            ));
        }
        if let Some((_, id)) = &self.modem_id {
            parts.push(format!("modem={}", id.as_deref().unwrap_or("none")));
        }
        parts.extend(self.added.iter().map(|id| format!("+{}", id)));
        parts.extend(self.replaced.iter().map(|id| format!("~{}", id)));
        parts.extend(self.removed.iter().map(|id| format!("-{}", id)));
        parts.join(", ")
    }
}

fn fragments_by_id(iface: &NetInterfaceConfig) -> BTreeMap<FragmentId, &NetConfig> {
    let mut map = BTreeMap::new();
    for config in iface.addresses.iter().flat_map(|a| a.configs.iter()) {
        map.entry(FragmentId::of(config)).or_insert(config);
    }
    map
}

/// Differences between two whole configurations.
#[derive(Debug, Default)]
pub struct ConfigDiff {
    /// Interfaces only in the desired configuration.
    pub interfaces_to_add: Vec<NetInterfaceConfig>,
    /// Interfaces only in the current configuration.
    pub interfaces_to_remove: Vec<String>,
    /// Interfaces in both whose configuration differs.
    pub interfaces_to_modify: Vec<(String, InterfaceChanges)>,
}

impl ConfigDiff {
    /// Compare `current` against `desired`.
    pub fn compute(current: &NetworkConfiguration, desired: &NetworkConfiguration) -> Self {
        let mut diff = Self::default();

        for wanted in desired.interfaces() {
            match current.get(&wanted.name) {
                Some(existing) => {
                    let changes = InterfaceChanges::between(existing, wanted);
                    if !changes.is_empty() {
                        diff.interfaces_to_modify.push((wanted.name.clone(), changes));
                    }
                }
                None => diff.interfaces_to_add.push(wanted.clone()),
            }
        }
        for existing in current.interfaces() {
            if desired.get(&existing.name).is_none() {
                diff.interfaces_to_remove.push(existing.name.clone());
            }
        }

        diff
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.interfaces_to_add.is_empty()
            && self.interfaces_to_remove.is_empty()
            && self.interfaces_to_modify.is_empty()
    }

    /// Number of interfaces affected.
    pub fn change_count(&self) -> usize {
        self.interfaces_to_add.len()
            + self.interfaces_to_remove.len()
            + self.interfaces_to_modify.len()
    }

    /// Human-readable summary of the changes.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        for iface in &self.interfaces_to_add {
            lines.push(format!("+ interface {} ({})", iface.name, iface.kind));
        }
        for (name, changes) in &self.interfaces_to_modify {
            lines.push(format!("~ interface {}: {}", name, changes.summary()));
        }
        for name in &self.interfaces_to_remove {
            lines.push(format!("- interface {}", name));
        }

        if lines.is_empty() {
            "No changes needed".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DhcpServer4Config, Ip4Config, NetStatus, WifiConfig};
    use pretty_assertions::assert_eq;

    fn eth0() -> NetInterfaceConfig {
        NetInterfaceConfig::new("eth0", InterfaceType::Ethernet)
            .with_config(NetConfig::Ip4(Ip4Config {
                status: NetStatus::Disabled,
                ..Default::default()
            }))
            .with_config(NetConfig::DhcpServer4(DhcpServer4Config::default()))
    }

    #[test]
    fn test_identical_interfaces_have_no_changes() {
        let changes = InterfaceChanges::between(&eth0(), &eth0());
        assert!(changes.is_empty());
        assert_eq!(changes.summary(), "");
    }

    #[test]
    fn test_changes_ignore_fragment_order() {
        let mut reordered = eth0();
        reordered.addresses[0].configs.reverse();
        assert!(InterfaceChanges::between(&eth0(), &reordered).is_empty());
    }

    #[test]
    fn test_changes_summary() {
        let mut new = NetInterfaceConfig::new("eth0", InterfaceType::Ethernet).with_config(
            NetConfig::Ip4(Ip4Config {
                status: NetStatus::EnabledLan,
                dhcp: true,
                ..Default::default()
            }),
        );
        new.mtu = 1400;

        let changes = InterfaceChanges::between(&eth0(), &new);
        assert_eq!(changes.replaced, vec![FragmentId::from(NetConfigKind::Ip4)]);
        assert_eq!(
            changes.removed,
            vec![FragmentId::from(NetConfigKind::DhcpServer4)]
        );
        assert_eq!(changes.summary(), "mtu=1400, ~ip4, -dhcpServer4");
    }

    #[test]
    fn test_wifi_fragments_are_keyed_by_mode() {
        let base = NetInterfaceConfig::new("wlan0", InterfaceType::Wifi)
            .with_config(NetConfig::Wifi(WifiConfig::new(WifiMode::Master, "ap")));
        let with_infra = base
            .clone()
            .with_config(NetConfig::Wifi(WifiConfig::new(WifiMode::Infra, "uplink")));

        let changes = InterfaceChanges::between(&base, &with_infra);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].to_string(), "wifi.infra");
        assert!(changes.replaced.is_empty());
    }

    #[test]
    fn test_config_diff_summary() {
        let mut current = NetworkConfiguration::new();
        current.upsert(eth0());
        current.upsert(NetInterfaceConfig::new("eth1", InterfaceType::Ethernet));

        let mut desired = NetworkConfiguration::new();
        let mut changed = eth0();
        changed.auto_connect = true;
        desired.upsert(changed);
        desired.upsert(NetInterfaceConfig::new("wlan0", InterfaceType::Wifi));

        let diff = ConfigDiff::compute(&current, &desired);
        assert_eq!(diff.change_count(), 3);
        assert_eq!(
            diff.summary(),
            "+ interface wlan0 (WIFI)\n~ interface eth0: autoconnect=true\n- interface eth1"
        );
        assert!(ConfigDiff::compute(&current, &current).is_empty());
    }
}
