//! Migration of ephemeral PPP interface names to USB-port identities.
//!
//! A modem shows up as `pppN` only while its link is up and the unit number
//! can change across reboots. Configuration is therefore keyed by the USB port
//! the modem is plugged into (`<bus>-<devpath>`, e.g. `1-1.2`). Stores written
//! before that convention still carry `net.interface.ppp0.*` keys; the
//! migrator renames them.
//!
//! # Example
//!
//! ```rust
//! use netadmin::migrate::InterfaceMigrator;
//! use netadmin::properties::PropertyStore;
//!
//! let mut previous = PropertyStore::new();
//! previous.insert("net.interface.ppp0.usb.busNumber", "1");
//! previous.insert("net.interface.ppp0.usb.devicePath", "1.2");
//!
//! let mut incoming = PropertyStore::new();
//! incoming.set_interface_names(["eth0", "ppp0"]);
//! incoming.insert("net.interface.ppp0.config.apn", "internet");
//!
//! let migrated = InterfaceMigrator::new().migrate(&mut incoming, &previous);
//! assert_eq!(migrated[0].to, "1-1.2");
//! assert_eq!(incoming.interface_names(), vec!["eth0", "1-1.2"]);
//! assert_eq!(incoming.get_str("net.interface.1-1.2.config.apn"), Some("internet"));
//! ```

use tracing::{debug, info, warn};

use crate::properties::keys::{self, field};
use crate::properties::PropertyStore;
use crate::util::ifname::is_ppp_name;

/// One completed rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub from: String,
    pub to: String,
}

/// Renames `ppp[0-9]+` interfaces to their USB-port identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceMigrator;

impl InterfaceMigrator {
    pub fn new() -> Self {
        Self
    }

    /// Migrate every legacy name in `incoming`, using USB identity recorded in
    /// `previous`.
    ///
    /// An interface whose identity is missing or not a string is left under
    /// its legacy name. Running the migrator on a store without legacy names
    /// is a no-op.
    pub fn migrate(
        &self,
        incoming: &mut PropertyStore,
        previous: &PropertyStore,
    ) -> Vec<Migration> {
        let mut names = incoming.interface_names();
        let mut migrations = Vec::new();

        for index in 0..names.len() {
            let name = names[index].clone();
            if !is_ppp_name(&name) {
                continue;
            }

            let Some(target) = Self::migrated_name(&name, previous) else {
                continue;
            };
            if target == name {
                continue;
            }

            Self::move_keys(incoming, &name, &target);
            if names.contains(&target) {
                // blanked rather than removed so indices stay stable
                names[index] = String::new();
            } else {
                names[index] = target.clone();
            }
            info!(from = %name, to = %target, "migrated interface name");
            migrations.push(Migration {
                from: name,
                to: target,
            });
        }

        if !migrations.is_empty() {
            names.retain(|n| !n.is_empty());
            incoming.set_interface_names(&names);
        }
        migrations
    }

    fn migrated_name(name: &str, previous: &PropertyStore) -> Option<String> {
        let lookup = |f: &str| {
            let key = keys::interface_key(name, f);
            match previous.get(&key) {
                None => {
                    warn!(interface = %name, key = %key, "cannot migrate interface: missing USB identity");
                    None
                }
                Some(value) => match value.as_str() {
                    Some(s) if !s.is_empty() => Some(s.to_string()),
                    _ => {
                        warn!(interface = %name, key = %key, "cannot migrate interface: USB identity is not a string");
                        None
                    }
                },
            }
        };

        let bus = lookup(field::USB_BUS_NUMBER)?;
        let path = lookup(field::USB_DEVICE_PATH)?;
        Some(format!("{}-{}", bus, path))
    }

    /// Move `net.interface.<from>.*` to `net.interface.<to>.*`. Keys already
    /// present under the new prefix win over copied ones.
    fn move_keys(store: &mut PropertyStore, from: &str, to: &str) {
        let old_prefix = keys::interface_prefix(from);
        let new_prefix = keys::interface_prefix(to);

        for (key, value) in store.remove_prefix(&old_prefix) {
            let new_key = format!("{}{}", new_prefix, &key[old_prefix.len()..]);
            if store.contains_key(&new_key) {
                debug!(key = %new_key, "keeping existing value over migrated one");
                continue;
            }
            store.insert(new_key, value);
        }
    }
}
