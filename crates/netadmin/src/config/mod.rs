//! Fragment-level merge for single-interface updates.
//!
//! A caller replaces the configuration of one interface by submitting an
//! [`InterfaceUpdate`]: link settings plus at most one fragment per relevant
//! [`NetConfigKind`]. The engine validates the whole update first, so a bad
//! fragment never leaves a partially merged interface behind.
//!
//! # Merge rules
//!
//! - A relevant fragment with a replacement takes the replacement value.
//! - A relevant fragment without a replacement is dropped.
//! - Fragments irrelevant to the interface type are carried over.
//! - WiFi keeps one fragment per mode; only the mode being submitted is
//!   replaced.
//! - Replacements with no existing counterpart are appended.
//!
//! # Example
//!
//! ```rust
//! use netadmin::config::{ConfigDiffEngine, InterfaceUpdate};
//! use netadmin::model::*;
//!
//! let existing = NetInterfaceConfig::new("eth0", InterfaceType::Ethernet)
//!     .with_config(NetConfig::Ip4(Ip4Config { status: NetStatus::Disabled, ..Default::default() }))
//!     .with_config(NetConfig::DhcpServer4(DhcpServer4Config::default()));
//!
//! let update = InterfaceUpdate::new(vec![NetConfig::Ip4(Ip4Config {
//!     status: NetStatus::EnabledLan,
//!     dhcp: true,
//!     ..Default::default()
//! })]);
//!
//! let outcome = ConfigDiffEngine::new().apply(&existing, &update)?;
//! assert!(outcome.changed());
//! assert_eq!(outcome.config.addresses[0].configs.len(), 1);
//! # Ok::<(), netadmin::Error>(())
//! ```

mod diff;

pub use diff::{ConfigDiff, FragmentId, InterfaceChanges};

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    InterfaceType, NetConfig, NetConfigKind, NetInterfaceAddressConfig, NetInterfaceConfig,
    NetworkConfiguration, WifiMode,
};
use crate::validation::{Validatable, ValidationResult};

/// Replacement configuration for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceUpdate {
    pub mtu: u32,
    pub auto_connect: bool,
    /// At most one fragment per kind.
    pub configs: Vec<NetConfig>,
    /// Modem model identifier; `None` keeps the existing one.
    pub modem_id: Option<String>,
}

impl InterfaceUpdate {
    /// An update with default link settings (mtu 1500, no autoconnect).
    pub fn new(configs: Vec<NetConfig>) -> Self {
        Self {
            mtu: 1500,
            auto_connect: false,
            configs,
            modem_id: None,
        }
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn modem_id(mut self, modem_id: impl Into<String>) -> Self {
        self.modem_id = Some(modem_id.into());
        self
    }

    fn find(&self, kind: NetConfigKind) -> Option<&NetConfig> {
        self.configs.iter().find(|c| c.kind() == kind)
    }

    fn wifi_mode(&self) -> Option<WifiMode> {
        self.configs.iter().find_map(|c| match c {
            NetConfig::Wifi(w) => Some(w.mode),
            _ => None,
        })
    }
}

/// Result of merging an update into an interface.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// The merged interface configuration.
    pub config: NetInterfaceConfig,
    pub changes: InterfaceChanges,
}

impl DiffOutcome {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Fragment kinds an update may carry for each interface type.
pub fn relevant_kinds(kind: InterfaceType) -> Option<&'static [NetConfigKind]> {
    use NetConfigKind::*;
    match kind {
        InterfaceType::Ethernet => Some(&[Ip4, Ip6, DhcpServer4, NatAuto]),
        InterfaceType::Wifi => Some(&[Ip4, Ip6, Wifi, DhcpServer4, NatAuto]),
        InterfaceType::Modem => Some(&[Ip4, Ip6, Modem]),
        InterfaceType::Loopback | InterfaceType::Unknown => None,
    }
}

/// Merges per-interface updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigDiffEngine;

impl ConfigDiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merge `update` into `existing`.
    ///
    /// Fails without side effects if any fragment is invalid, a kind appears
    /// twice, or a mandatory fragment is missing. Applying the same update to
    /// the result reports no change.
    pub fn apply(
        &self,
        existing: &NetInterfaceConfig,
        update: &InterfaceUpdate,
    ) -> Result<DiffOutcome> {
        let relevant =
            relevant_kinds(existing.kind).ok_or_else(|| Error::UnsupportedInterfaceType {
                name: existing.name.clone(),
                kind: existing.kind.to_string(),
            })?;

        self.check(existing, relevant, update)?;

        let mut merged = existing.clone();
        if merged.addresses.is_empty() {
            merged.addresses.push(NetInterfaceAddressConfig::default());
        }
        let wifi_mode = update.wifi_mode();
        let address = &mut merged.addresses[0];

        let mut had = BTreeSet::new();
        let mut configs = Vec::with_capacity(address.configs.len() + update.configs.len());
        for old in std::mem::take(&mut address.configs) {
            let kind = old.kind();
            if !relevant.contains(&kind) {
                configs.push(old);
                continue;
            }
            if let NetConfig::Wifi(w) = &old
                && Some(w.mode) != wifi_mode
            {
                configs.push(old);
                continue;
            }
            match update.find(kind) {
                Some(new) if had.insert(kind) => configs.push(new.clone()),
                Some(_) => debug!(interface = %existing.name, %kind, "dropping duplicate fragment"),
                None => debug!(interface = %existing.name, %kind, "fragment removed"),
            }
        }
        for new in &update.configs {
            if !had.contains(&new.kind()) {
                configs.push(new.clone());
            }
        }
        address.configs = configs;
        if wifi_mode.is_some() {
            address.wifi_mode = wifi_mode;
        }

        merged.mtu = update.mtu;
        merged.auto_connect = update.auto_connect;
        if update.modem_id.is_some() {
            merged.modem_id = update.modem_id.clone();
        }

        let changes = InterfaceChanges::between(existing, &merged);
        if !changes.is_empty() {
            debug!(interface = %existing.name, changes = %changes.summary(), "interface changed");
        }
        Ok(DiffOutcome {
            config: merged,
            changes,
        })
    }

    /// Merge `update` into the interface `name` of `config`, checking that it
    /// has type `expected`. Marks the interface modified when it changed.
    pub fn apply_to(
        &self,
        config: &mut NetworkConfiguration,
        name: &str,
        expected: InterfaceType,
        update: &InterfaceUpdate,
    ) -> Result<InterfaceChanges> {
        let existing = config.get(name).ok_or_else(|| Error::InterfaceNotFound {
            name: name.to_string(),
        })?;
        if existing.kind != expected {
            return Err(Error::UnsupportedInterfaceType {
                name: name.to_string(),
                kind: existing.kind.to_string(),
            });
        }

        let outcome = self.apply(existing, update)?;
        if outcome.changed() {
            config.upsert(outcome.config);
            config.mark_modified(name);
        }
        Ok(outcome.changes)
    }

    fn check(
        &self,
        existing: &NetInterfaceConfig,
        relevant: &[NetConfigKind],
        update: &InterfaceUpdate,
    ) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut validation = ValidationResult::new();

        for fragment in &update.configs {
            let kind = fragment.kind();
            if !relevant.contains(&kind) {
                return Err(Error::Configuration(format!(
                    "{} configuration does not apply to {} interface {}",
                    kind, existing.kind, existing.name
                )));
            }
            if !seen.insert(kind) {
                return Err(Error::Configuration(format!(
                    "more than one {} configuration for {}",
                    kind, existing.name
                )));
            }
            validation.merge(fragment.validate());
        }
        validation.into_result()?;

        if !seen.contains(&NetConfigKind::Ip4) && !seen.contains(&NetConfigKind::Ip6) {
            return Err(Error::RequiredAttributeMissing(format!(
                "{}: ip4 or ip6 configuration",
                existing.name
            )));
        }
        let mandatory = match existing.kind {
            InterfaceType::Wifi => Some(NetConfigKind::Wifi),
            InterfaceType::Modem => Some(NetConfigKind::Modem),
            _ => None,
        };
        if let Some(kind) = mandatory
            && !seen.contains(&kind)
        {
            return Err(Error::RequiredAttributeMissing(format!(
                "{}: {} configuration",
                existing.name, kind
            )));
        }

        Ok(())
    }
}
