//! The reconciliation engine.
//!
//! [`NetworkAdmin`] owns the network property bag and drives every other
//! module from two entry points:
//!
//! - [`updated`](NetworkAdmin::updated) receives a configuration delivered by
//!   the configuration store. It migrates legacy names, types interfaces,
//!   enforces WAN exclusivity, merges into the previous properties, stores
//!   credentials encrypted, renders DHCP server files, refreshes automatic
//!   NAT and finally posts [`NETWORK_CONFIG_CHANGE_TOPIC`].
//! - The `update_*_interface_config` methods merge a typed update into one
//!   interface, submit the result to the configuration store and wait on the
//!   [`ChangeConfirmationGate`] for `updated` to confirm it.
//!
//! Both hold one state lock for the duration of their critical section, so
//! reconciliation passes never interleave. Readers get an immutable
//! [`NetworkConfiguration`] snapshot that is swapped whole at the end of each
//! pass.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ConfigDiffEngine, InterfaceUpdate};
use crate::confirm::{ChangeConfirmationGate, Confirmation};
use crate::dhcp;
use crate::error::{Error, Result};
use crate::firewall::{
    ApplyOptions, ApplyResult, FirewallApplier, FirewallConfiguration, NatRule, NatRuleKind,
    NetworkPair, OpenPortRule, PortForwardRule, auto_nat_rules,
};
use crate::lifecycle::{InterfaceLifecycleController, LifecycleOptions};
use crate::migrate::InterfaceMigrator;
use crate::model::{
    InterfaceType, NetInterfaceConfig, NetworkConfiguration, interface_to_properties,
};
use crate::properties::keys::{self, field};
use crate::properties::{PropertyStore, merge, split_list};
use crate::services::{
    CommandExecutor, ConfigurationService, CryptoService, Event, EventBus, LiveInterface,
    NETWORK_CONFIG_CHANGE_TOPIC, NetworkService, SysfsNetworkService, TokioCommandExecutor,
};
use crate::util::ifname::is_usb_port_name;
use crate::validation::Validatable;
use crate::wan::WanExclusivityGuard;
use crate::wifi;

/// Tunables for [`NetworkAdmin`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AdminOptions {
    /// Interval between confirmation checks.
    pub confirm_poll_interval_ms: u64,
    /// Bound on waiting for confirmation.
    pub confirm_timeout_ms: u64,
    /// Component id the network properties are stored under.
    pub network_pid: String,
    /// Component id the firewall properties are stored under.
    pub firewall_pid: String,
    pub lifecycle: LifecycleOptions,
}

impl Default for AdminOptions {
    fn default() -> Self {
        Self {
            confirm_poll_interval_ms: 500,
            confirm_timeout_ms: 30_000,
            network_pid: "net.admin.network".to_string(),
            firewall_pid: "net.admin.firewall".to_string(),
            lifecycle: LifecycleOptions::default(),
        }
    }
}

impl AdminOptions {
    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

/// Builder for [`NetworkAdmin`].
///
/// The configuration store and the crypto service are required. Commands
/// default to [`TokioCommandExecutor`] and live interfaces to
/// [`SysfsNetworkService`].
#[derive(Default)]
pub struct NetworkAdminBuilder {
    executor: Option<Arc<dyn CommandExecutor>>,
    config_service: Option<Arc<dyn ConfigurationService>>,
    network: Option<Arc<dyn NetworkService>>,
    crypto: Option<Arc<dyn CryptoService>>,
    bus: Option<EventBus>,
    options: AdminOptions,
}

impl NetworkAdminBuilder {
    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn configuration_service(mut self, service: Arc<dyn ConfigurationService>) -> Self {
        self.config_service = Some(service);
        self
    }

    pub fn network_service(mut self, service: Arc<dyn NetworkService>) -> Self {
        self.network = Some(service);
        self
    }

    pub fn crypto_service(mut self, service: Arc<dyn CryptoService>) -> Self {
        self.crypto = Some(service);
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn options(mut self, options: AdminOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<NetworkAdmin> {
        let config_service = self.config_service.ok_or_else(|| {
            Error::Configuration("a configuration service is required".to_string())
        })?;
        let crypto = self
            .crypto
            .ok_or_else(|| Error::Configuration("a crypto service is required".to_string()))?;
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(TokioCommandExecutor));
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(SysfsNetworkService::default()));
        let options = self.options;

        Ok(NetworkAdmin {
            gate: ChangeConfirmationGate::new(
                options.confirm_poll_interval(),
                options.confirm_timeout(),
            ),
            lifecycle: InterfaceLifecycleController::new(
                executor.clone(),
                options.lifecycle.clone(),
            ),
            firewall: FirewallApplier::new(executor),
            config_service,
            network,
            crypto,
            bus: self.bus.unwrap_or_default(),
            state: Mutex::new(State::default()),
            snapshot: RwLock::new(Arc::new(NetworkConfiguration::new())),
            closed: AtomicBool::new(false),
            options,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    properties: PropertyStore,
    /// Explicitly configured rules.
    firewall: FirewallConfiguration,
    /// Rules derived from the current network configuration.
    auto_nat: Vec<NatRule>,
}

impl State {
    fn effective_firewall(&self) -> FirewallConfiguration {
        let mut config = self.firewall.clone();
        config.nat.extend(self.auto_nat.iter().cloned());
        config
    }
}

/// Network configuration reconciliation engine.
pub struct NetworkAdmin {
    config_service: Arc<dyn ConfigurationService>,
    network: Arc<dyn NetworkService>,
    crypto: Arc<dyn CryptoService>,
    bus: EventBus,
    options: AdminOptions,
    gate: ChangeConfirmationGate,
    lifecycle: InterfaceLifecycleController,
    firewall: FirewallApplier,
    state: Mutex<State>,
    snapshot: RwLock<Arc<NetworkConfiguration>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for NetworkAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkAdmin")
            .field("options", &self.options)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl NetworkAdmin {
    pub fn builder() -> NetworkAdminBuilder {
        NetworkAdminBuilder::default()
    }

    pub fn options(&self) -> &AdminOptions {
        &self.options
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn lifecycle(&self) -> &InterfaceLifecycleController {
        &self.lifecycle
    }

    /// Stop accepting updates. Calls after this fail; an in-flight pass
    /// finishes normally.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("network admin closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Internal("network admin is closed".to_string()));
        }
        Ok(())
    }

    /// The current configuration snapshot.
    pub fn network_configuration(&self) -> Arc<NetworkConfiguration> {
        match self.snapshot.read() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, config: NetworkConfiguration) {
        let config = Arc::new(config);
        match self.snapshot.write() {
            Ok(mut snapshot) => *snapshot = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// A copy of the stored network properties.
    pub async fn properties(&self) -> PropertyStore {
        self.state.lock().await.properties.clone()
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile a configuration delivered by the configuration store.
    pub async fn updated(&self, mut incoming: PropertyStore) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let previous = state.properties.clone();

        let migrations = InterfaceMigrator::new().migrate(&mut incoming, &previous);
        if !migrations.is_empty() {
            debug!(count = migrations.len(), "migrated legacy interface names");
        }

        let live = match self.network.interfaces().await {
            Ok(live) => Some(live),
            Err(e) => {
                warn!(error = %e, "cannot enumerate interfaces");
                None
            }
        };
        assign_interface_types(&mut incoming, &previous, live.as_deref());

        match &live {
            Some(live) => {
                let names: BTreeSet<String> = live.iter().map(|l| l.name.clone()).collect();
                let disabled =
                    WanExclusivityGuard::new().enforce_with_live(&previous, &mut incoming, &names);
                if !disabled.is_empty()
                    && let Err(e) = self.config_service.snapshot().await
                {
                    warn!(error = %e, "cannot snapshot configuration after WAN change");
                }
            }
            None => warn!("skipping WAN exclusivity check"),
        }

        let modified = incoming
            .get_str(keys::MODIFIED_INTERFACE_NAMES)
            .map(split_list)
            .unwrap_or_default();
        let mut merged = previous;
        let snapshot = self.network_configuration();
        for name in &modified {
            remove_modeled_config(&mut merged, snapshot.get(name));
        }
        merge(&incoming, &mut merged);
        merged.remove(keys::MODIFIED_INTERFACE_NAMES);
        self.normalize_passwords(&mut merged)?;

        let config = NetworkConfiguration::from_properties(&merged, live.as_deref().unwrap_or(&[]));
        dhcp::write_configs(&config, &self.options.lifecycle).await;
        wifi::write_configs(&config, &self.options.lifecycle, self.crypto.as_ref()).await;

        let auto_nat = auto_nat_rules(&config);
        state.properties = merged;
        if auto_nat != state.auto_nat {
            state.auto_nat = auto_nat;
            self.apply_firewall(&state).await;
        }
        self.publish(config);
        drop(state);

        info!(modified = %modified.join(","), "network configuration updated");
        self.bus.post(
            Event::new(NETWORK_CONFIG_CHANGE_TOPIC).with_property("interfaces", modified.join(",")),
        );
        Ok(())
    }

    /// Store every credential encrypted. A value the crypto service can
    /// decrypt is already encrypted and kept.
    fn normalize_passwords(&self, props: &mut PropertyStore) -> Result<()> {
        let plain: Vec<(String, String)> = props
            .iter()
            .filter(|(key, _)| key.ends_with("password") || key.ends_with("passphrase"))
            .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
            .filter(|(_, value)| !value.is_empty() && self.crypto.decrypt(value).is_err())
            .collect();

        for (key, value) in plain {
            let cipher = self
                .crypto
                .encrypt(&value)
                .map_err(|e| e.with_context(format!("encrypting {}", key)))?;
            props.insert(key, cipher);
        }
        Ok(())
    }

    // ========================================================================
    // Single-interface updates
    // ========================================================================

    /// Merge `update` into the Ethernet interface `name` and submit it.
    /// Returns whether anything changed.
    pub async fn update_ethernet_interface_config(
        &self,
        name: &str,
        update: InterfaceUpdate,
    ) -> Result<bool> {
        self.update_interface(name, InterfaceType::Ethernet, update).await
    }

    /// Merge `update` into the WiFi interface `name` and submit it.
    pub async fn update_wifi_interface_config(
        &self,
        name: &str,
        update: InterfaceUpdate,
    ) -> Result<bool> {
        self.update_interface(name, InterfaceType::Wifi, update).await
    }

    /// Merge `update` into the modem interface `name` and submit it.
    pub async fn update_modem_interface_config(
        &self,
        name: &str,
        update: InterfaceUpdate,
    ) -> Result<bool> {
        self.update_interface(name, InterfaceType::Modem, update).await
    }

    async fn update_interface(
        &self,
        name: &str,
        kind: InterfaceType,
        update: InterfaceUpdate,
    ) -> Result<bool> {
        self.ensure_open()?;
        let props = {
            let state = self.state.lock().await;
            let mut config = (*self.network_configuration()).clone();
            let changes = ConfigDiffEngine::new().apply_to(&mut config, name, kind, &update)?;
            if changes.is_empty() {
                debug!(interface = %name, "no changes to submit");
                return Ok(false);
            }
            info!(
                interface = %name,
                changes = %changes.summary(),
                "submitting interface configuration"
            );

            let mut props = state.properties.clone();
            remove_modeled_config(&mut props, self.network_configuration().get(name));
            merge(&config.to_properties(), &mut props);
            props
        };

        let confirmation = self
            .gate
            .submit(
                &self.bus,
                self.config_service
                    .update_configuration(&self.options.network_pid, &props, true),
            )
            .await?;
        if let Confirmation::Confirmed { elapsed } = confirmation {
            debug!(interface = %name, ?elapsed, "interface configuration confirmed");
        }
        Ok(true)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring up the configured interface `name`.
    pub async fn enable_interface(&self, name: &str, dhcp: bool) -> Result<()> {
        self.ensure_open()?;
        let config = self.network_configuration();
        let iface = config.get(name).ok_or_else(|| Error::InterfaceNotFound {
            name: name.to_string(),
        })?;
        self.lifecycle.enable_interface(iface, dhcp).await
    }

    /// Tear down `name`, configured or not.
    pub async fn disable_interface(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.lifecycle.disable_interface(name).await
    }

    // ========================================================================
    // Firewall
    // ========================================================================

    /// Configured rules plus the automatic NAT rules.
    pub async fn firewall_configuration(&self) -> FirewallConfiguration {
        self.state.lock().await.effective_firewall()
    }

    /// Load rules delivered by the configuration store and apply them.
    pub async fn firewall_updated(&self, props: &PropertyStore) -> Result<ApplyResult> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state.firewall = FirewallConfiguration::from_properties(props);
        self.firewall
            .apply(&state.effective_firewall(), ApplyOptions::default())
            .await
    }

    /// Recompute the automatic NAT rules and re-apply the firewall.
    ///
    /// With a `gateway`, NAT only targets that WAN interface. Without
    /// eligible interfaces every automatic rule is removed.
    pub async fn manage_firewall(&self, gateway: Option<&str>) -> Result<ApplyResult> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let mut auto_nat = auto_nat_rules(&self.network_configuration());
        if let Some(gateway) = gateway {
            auto_nat.retain(|r| r.destination_interface == gateway);
        }
        debug!(rules = auto_nat.len(), ?gateway, "refreshing automatic NAT");
        state.auto_nat = auto_nat;
        self.firewall
            .apply(&state.effective_firewall(), ApplyOptions::default())
            .await
    }

    /// Replace the open port rules.
    pub async fn set_firewall_open_ports(&self, rules: Vec<OpenPortRule>) -> Result<ApplyResult> {
        let rules = rules
            .into_iter()
            .map(|mut r| {
                r.permitted_network = r.permitted_network.or(Some(NetworkPair::any_v4()));
                r
            })
            .collect();
        self.set_firewall(|fw| fw.open_ports = rules).await
    }

    /// Replace the port forwarding rules.
    pub async fn set_firewall_port_forwarding(
        &self,
        rules: Vec<PortForwardRule>,
    ) -> Result<ApplyResult> {
        let rules = rules
            .into_iter()
            .map(|mut r| {
                r.permitted_network = r.permitted_network.or(Some(NetworkPair::any_v4()));
                r
            })
            .collect();
        self.set_firewall(|fw| fw.port_forwards = rules).await
    }

    /// Replace the configured NAT rules. Automatic rules are not affected.
    pub async fn set_firewall_nat(&self, rules: Vec<NatRule>) -> Result<ApplyResult> {
        let rules = rules
            .into_iter()
            .map(|mut r| {
                r.kind = NatRuleKind::Generic;
                r
            })
            .collect();
        self.set_firewall(|fw| fw.nat = rules).await
    }

    async fn set_firewall<F>(&self, change: F) -> Result<ApplyResult>
    where
        F: FnOnce(&mut FirewallConfiguration),
    {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let mut firewall = state.firewall.clone();
        change(&mut firewall);
        firewall.validate().into_result()?;

        self.config_service
            .update_configuration(&self.options.firewall_pid, &firewall.to_properties(), true)
            .await?;
        state.firewall = firewall;
        self.firewall
            .apply(&state.effective_firewall(), ApplyOptions::default())
            .await
    }

    async fn apply_firewall(&self, state: &State) {
        match self
            .firewall
            .apply(&state.effective_firewall(), ApplyOptions::default())
            .await
        {
            Ok(result) if !result.is_success() => {
                warn!(failed = result.errors.len(), "some firewall rules were not applied")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cannot apply firewall"),
        }
    }
}

/// Record a type for every listed interface.
///
/// A live interface (matched by name or USB port) gives its type. Otherwise a
/// USB-port-shaped name is a modem, and anything else keeps the type it was
/// stored with, or UNKNOWN. Live modems also get their USB identity recorded
/// when it is missing.
fn assign_interface_types(
    incoming: &mut PropertyStore,
    previous: &PropertyStore,
    live: Option<&[LiveInterface]>,
) {
    for name in incoming.interface_names() {
        let key = keys::type_key(&name);
        let live_iface = live.and_then(|live| {
            live.iter().find(|l| {
                l.name == name || l.usb.as_ref().is_some_and(|u| u.port_name() == name)
            })
        });

        let kind = match live_iface {
            Some(l) => l.kind,
            None if is_usb_port_name(&name) => InterfaceType::Modem,
            None => [incoming.get_str(&key), previous.get_str(&key)]
                .into_iter()
                .flatten()
                .find_map(|t| t.parse::<InterfaceType>().ok())
                .unwrap_or(InterfaceType::Unknown),
        };
        incoming.insert(key, kind.as_str());

        let Some(usb) = live_iface
            .filter(|l| l.kind == InterfaceType::Modem)
            .and_then(|l| l.usb.as_ref())
        else {
            continue;
        };
        for (field, value) in [
            (field::USB_VENDOR_ID, &usb.vendor_id),
            (field::USB_VENDOR_NAME, &usb.vendor_name),
            (field::USB_PRODUCT_ID, &usb.product_id),
            (field::USB_PRODUCT_NAME, &usb.product_name),
            (field::USB_BUS_NUMBER, &usb.bus_number),
            (field::USB_DEVICE_PATH, &usb.device_path),
        ] {
            let key = keys::interface_key(&name, field);
            if !incoming.contains_key(&key) {
                incoming.insert(key, value.as_str());
            }
        }
    }
}

/// Remove the configuration keys the typed model of `iface` was read from.
///
/// Keys under `net.interface.<name>.config.` that no fragment represents are
/// left in place, so replacing an interface's fragments never drops them.
fn remove_modeled_config(props: &mut PropertyStore, iface: Option<&NetInterfaceConfig>) {
    let Some(iface) = iface else {
        return;
    };
    let mut modeled = PropertyStore::new();
    interface_to_properties(iface, &mut modeled);
    let prefix = keys::config_key(&iface.name, "");
    for (key, _) in modeled.iter().filter(|(key, _)| key.starts_with(&prefix)) {
        props.remove(key);
    }
}
