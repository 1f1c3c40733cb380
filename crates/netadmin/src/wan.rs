//! WAN exclusivity.
//!
//! When an update enables WAN on an interface that was not WAN before, every
//! WAN-configured interface that is not currently present on the system is
//! forced to disabled. A configured-but-absent WAN link must not come back
//! later and compete with the newly enabled one.
//!
//! The live check is best effort: interfaces may appear or disappear between
//! enumeration and the write.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::model::NetStatus;
use crate::properties::{PropertyStore, keys};
use crate::services::NetworkService;

/// Names of interfaces whose IPv4 status is `EnabledWAN`.
pub fn wan_interfaces(props: &PropertyStore) -> BTreeSet<String> {
    props
        .interface_names()
        .into_iter()
        .filter(|name| {
            props
                .get_str(&keys::ip4_status_key(name))
                .and_then(NetStatus::parse)
                == Some(NetStatus::EnabledWan)
        })
        .collect()
}

/// Enforces that a newly enabled WAN interface does not coexist with absent
/// WAN interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct WanExclusivityGuard;

impl WanExclusivityGuard {
    pub fn new() -> Self {
        Self
    }

    /// Apply the guard to `new` given the set of live interface names.
    ///
    /// Returns the interfaces that were disabled, in name order.
    pub fn enforce_with_live(
        &self,
        old: &PropertyStore,
        new: &mut PropertyStore,
        live: &BTreeSet<String>,
    ) -> Vec<String> {
        let old_wan = wan_interfaces(old);
        let new_wan = wan_interfaces(new);
        if new_wan.is_subset(&old_wan) {
            return Vec::new();
        }

        let mut disabled = Vec::new();
        for name in new_wan.iter().filter(|n| !live.contains(*n)) {
            info!(interface = %name, "disabling WAN on interface that is not present");
            new.insert(keys::ip4_status_key(name), NetStatus::Disabled.as_ip4_str());
            disabled.push(name.clone());
        }
        disabled
    }

    /// Apply the guard, enumerating live interfaces only when a new WAN
    /// interface appeared. Returns `true` if `new` was modified.
    ///
    /// A failure to enumerate is logged and leaves `new` untouched.
    pub async fn enforce(
        &self,
        old: &PropertyStore,
        new: &mut PropertyStore,
        network: &dyn NetworkService,
    ) -> bool {
        if wan_interfaces(new).is_subset(&wan_interfaces(old)) {
            debug!("no newly enabled WAN interface");
            return false;
        }

        let live: BTreeSet<String> = match network.interfaces().await {
            Ok(interfaces) => interfaces.into_iter().map(|i| i.name).collect(),
            Err(e) => {
                warn!(error = %e, "cannot enumerate interfaces, skipping WAN check");
                return false;
            }
        };
        !self.enforce_with_live(old, new, &live).is_empty()
    }
}
