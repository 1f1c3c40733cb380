//! Interface bring-up and tear-down.
//!
//! The controller drives the system daemons that realize an interface
//! configuration: the link itself (`ip`), the DHCP client (`dhclient`), the
//! DHCP server (`dhcpd`), the access point daemon (`hostapd`) and the station
//! daemon (`wpa_supplicant`). Every daemon runs with a pid file under
//! [`LifecycleOptions::run_dir`], so stopping one is idempotent.
//!
//! # WiFi
//!
//! Enabling WiFi moves the interface through [`WifiState`]:
//!
//! ```text
//! Disabled -> Starting -> Connecting -> Connected | TimedOut
//! ```
//!
//! An access point is considered ready as soon as `hostapd` starts. A station
//! polls `wpa_cli status` until association completes or the timeout expires.
//! A timeout is reported through the returned state, never as an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{
    InterfaceType, NetInterfaceAddressConfig, NetInterfaceConfig, NetStatus, WifiMode,
};
use crate::services::{Command, CommandExecutor};
use crate::util::ifname::is_ignored_wifi;

/// Tunables for [`InterfaceLifecycleController`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LifecycleOptions {
    /// Interval between association checks.
    pub wifi_poll_interval_ms: u64,
    /// Bound on waiting for association.
    pub wifi_timeout_ms: u64,
    /// Driver passed to `wpa_supplicant` when the configuration names none.
    pub default_driver: String,
    /// Directory for daemon pid files.
    pub run_dir: PathBuf,
    /// Directory holding daemon configuration files.
    pub conf_dir: PathBuf,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            wifi_poll_interval_ms: 1_000,
            wifi_timeout_ms: 60_000,
            default_driver: "nl80211".to_string(),
            run_dir: PathBuf::from("/var/run"),
            conf_dir: PathBuf::from("/etc"),
        }
    }
}

impl LifecycleOptions {
    pub fn wifi_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_poll_interval_ms)
    }

    pub fn wifi_timeout(&self) -> Duration {
        Duration::from_millis(self.wifi_timeout_ms)
    }

    /// `<run_dir>/<daemon>-<interface>.pid`
    pub fn pid_file(&self, daemon: &str, interface: &str) -> PathBuf {
        self.run_dir.join(format!("{}-{}.pid", daemon, interface))
    }

    /// `<conf_dir>/<daemon>-<interface>.conf`
    pub fn conf_file(&self, daemon: &str, interface: &str) -> PathBuf {
        self.conf_dir.join(format!("{}-{}.conf", daemon, interface))
    }
}

/// Connection state of a WiFi interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WifiState {
    #[default]
    Disabled,
    /// Daemons being restarted.
    Starting,
    /// Station daemon started, waiting for association.
    Connecting,
    Connected,
    /// Association did not complete in time.
    TimedOut,
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Starts and stops the daemons behind each interface.
pub struct InterfaceLifecycleController {
    executor: Arc<dyn CommandExecutor>,
    options: LifecycleOptions,
    wifi_states: Mutex<HashMap<String, WifiState>>,
}

impl std::fmt::Debug for InterfaceLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceLifecycleController")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl InterfaceLifecycleController {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: LifecycleOptions) -> Self {
        Self {
            executor,
            options,
            wifi_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Last known WiFi state of `name`.
    pub fn wifi_state(&self, name: &str) -> WifiState {
        self.wifi_states
            .lock()
            .map(|states| states.get(name).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set_wifi_state(&self, name: &str, state: WifiState) {
        if let Ok(mut states) = self.wifi_states.lock() {
            states.insert(name.to_string(), state);
        }
    }

    // ========================================================================
    // Interfaces
    // ========================================================================

    /// Bring `iface` up.
    ///
    /// A down interface gets its WiFi daemons started (for WiFi), then either
    /// a DHCP lease or a link up with its static address. An interface that is
    /// already up only renews its lease when `dhcp` is set.
    pub async fn enable_interface(&self, iface: &NetInterfaceConfig, dhcp: bool) -> Result<()> {
        let name = iface.name.as_str();
        debug!(interface = %name, dhcp, "enabling interface");

        if self.is_up(name).await? {
            if dhcp {
                self.renew_dhcp_lease(name).await?;
            }
            return Ok(());
        }

        if iface.kind == InterfaceType::Wifi {
            self.enable_wifi(iface).await?;
        }
        if dhcp {
            self.renew_dhcp_lease(name).await
        } else {
            self.link_up(name).await?;
            self.apply_static_address(iface).await
        }
    }

    /// Tear `name` down: DHCP client and server, WiFi daemons, addresses, then
    /// the link. The loopback interface is never disabled.
    ///
    /// Every step works by name, so an interface without configuration is
    /// torn down the same way.
    pub async fn disable_interface(&self, name: &str) -> Result<()> {
        if name == "lo" {
            debug!("not disabling loopback");
            return Ok(());
        }
        debug!(interface = %name, "disabling interface");

        self.manage_dhcp_client(name, false).await?;
        self.manage_dhcp_server(name, false).await?;
        self.disable_wifi(name).await;
        self.stop(Command::new("ip").args(["addr", "flush", "dev", name])).await;
        self.link_down(name).await
    }

    /// Check the `UP` flag reported by `ip -o link show`.
    pub async fn is_up(&self, name: &str) -> Result<bool> {
        let output = self
            .executor
            .execute(&Command::new("ip").args(["-o", "link", "show", "dev", name]))
            .await?;
        if !output.success() {
            return Err(Error::InterfaceNotFound {
                name: name.to_string(),
            });
        }
        Ok(parse_link_flags(&output.stdout).any(|flag| flag == "UP"))
    }

    pub async fn link_up(&self, name: &str) -> Result<()> {
        self.executor
            .execute_checked(&Command::new("ip").args(["link", "set", "dev", name, "up"]))
            .await?;
        Ok(())
    }

    pub async fn link_down(&self, name: &str) -> Result<()> {
        self.executor
            .execute_checked(&Command::new("ip").args(["link", "set", "dev", name, "down"]))
            .await?;
        Ok(())
    }

    /// Replace the addresses of `iface` with its static IPv4 address. A WAN
    /// with a gateway also gets the default route.
    pub async fn apply_static_address(&self, iface: &NetInterfaceConfig) -> Result<()> {
        let name = iface.name.as_str();
        let Some(ip4) = iface.ip4().filter(|ip4| !ip4.dhcp) else {
            return Ok(());
        };
        let Some(address) = ip4.address else {
            debug!(interface = %name, "no static IPv4 address to apply");
            return Ok(());
        };

        let cidr = format!("{}/{}", address, ip4.prefix);
        self.executor
            .execute_checked(&Command::new("ip").args(["addr", "flush", "dev", name]))
            .await?;
        self.executor
            .execute_checked(&Command::new("ip").args(["addr", "add", &*cidr, "dev", name]))
            .await?;
        if ip4.status == NetStatus::EnabledWan
            && let Some(gateway) = ip4.gateway
        {
            let via = gateway.to_string();
            self.executor
                .execute_checked(&Command::new("ip").args([
                    "route", "replace", "default", "via", &*via, "dev", name,
                ]))
                .await?;
        }
        info!(interface = %name, address = %cidr, "static address applied");
        Ok(())
    }

    // ========================================================================
    // DHCP
    // ========================================================================

    /// Stop the DHCP server of `name`, then start it again if `enable`.
    pub async fn manage_dhcp_server(&self, name: &str, enable: bool) -> Result<()> {
        let pid = self.options.pid_file("dhcpd", name);
        self.stop(Command::new("pkill").arg("-F").arg(path_arg(&pid))).await;
        if !enable {
            return Ok(());
        }

        let conf = self.options.conf_file("dhcpd", name);
        self.executor
            .execute_checked(
                &Command::new("dhcpd")
                    .args(["-cf", &*path_arg(&conf), "-pf", &*path_arg(&pid)])
                    .arg(name),
            )
            .await?;
        info!(interface = %name, "DHCP server started");
        Ok(())
    }

    /// Stop the DHCP client of `name`, then start it again if `enable`.
    pub async fn manage_dhcp_client(&self, name: &str, enable: bool) -> Result<()> {
        let pid = path_arg(&self.options.pid_file("dhclient", name));
        self.stop(Command::new("dhclient").args(["-x", "-pf", &*pid, name])).await;
        if enable {
            self.start_dhcp_client(name).await?;
        }
        Ok(())
    }

    /// Release the current lease, then request a new one.
    pub async fn renew_dhcp_lease(&self, name: &str) -> Result<()> {
        let pid = path_arg(&self.options.pid_file("dhclient", name));
        self.stop(Command::new("dhclient").args(["-r", "-pf", &*pid, name])).await;
        self.start_dhcp_client(name).await
    }

    async fn start_dhcp_client(&self, name: &str) -> Result<()> {
        let pid = path_arg(&self.options.pid_file("dhclient", name));
        self.executor
            .execute_checked(&Command::new("dhclient").args(["-nw", "-pf", &*pid, name]))
            .await?;
        Ok(())
    }

    // ========================================================================
    // WiFi
    // ========================================================================

    /// Restart the WiFi daemons of `iface` for its configured role.
    ///
    /// LAN with mode MASTER starts the access point. LAN or WAN with mode
    /// INFRA or ADHOC starts the station daemon and waits for association.
    /// Monitor (`mon.`) and `rpine` interfaces are left alone.
    pub async fn enable_wifi(&self, iface: &NetInterfaceConfig) -> Result<WifiState> {
        let name = iface.name.as_str();
        if is_ignored_wifi(name) {
            debug!(interface = %name, "ignoring WiFi interface");
            return Ok(self.wifi_state(name));
        }

        self.set_wifi_state(name, WifiState::Starting);
        self.stop_wifi_daemons(name).await;

        let status = iface.ip4_status();
        let address = iface.primary();
        let mode = address.and_then(|a| a.wifi_mode);

        let state = match self.start_wifi(name, status, mode, address).await {
            Ok(state) => state,
            Err(e) => {
                self.set_wifi_state(name, WifiState::Disabled);
                return Err(e);
            }
        };

        self.set_wifi_state(name, state);
        Ok(state)
    }

    async fn start_wifi(
        &self,
        name: &str,
        status: NetStatus,
        mode: Option<WifiMode>,
        address: Option<&NetInterfaceAddressConfig>,
    ) -> Result<WifiState> {
        let Some(wifi) = address.and_then(|a| a.active_wifi()) else {
            warn!(interface = %name, ?mode, "no WiFi configuration for the selected mode, not starting");
            return Ok(WifiState::Disabled);
        };

        match (status, mode) {
            (NetStatus::EnabledLan, Some(WifiMode::Master)) => {
                self.start_hostapd(name).await?;
                info!(interface = %name, "access point started");
                Ok(WifiState::Connected)
            }
            (
                NetStatus::EnabledLan | NetStatus::EnabledWan,
                Some(WifiMode::Infra | WifiMode::Adhoc),
            ) => {
                let driver = if wifi.driver.is_empty() {
                    self.options.default_driver.as_str()
                } else {
                    wifi.driver.as_str()
                };
                self.start_wpa_supplicant(name, driver).await?;
                self.set_wifi_state(name, WifiState::Connecting);
                Ok(self.wait_for_association(name).await)
            }
            _ => {
                warn!(
                    interface = %name,
                    status = %status.as_ip4_str(),
                    ?mode,
                    "invalid WiFi configuration, not starting"
                );
                Ok(WifiState::Disabled)
            }
        }
    }

    /// Stop both WiFi daemons of `name`. Always safe to call.
    pub async fn disable_wifi(&self, name: &str) {
        self.stop_wifi_daemons(name).await;
        self.set_wifi_state(name, WifiState::Disabled);
    }

    async fn stop_wifi_daemons(&self, name: &str) {
        for daemon in ["hostapd", "wpa_supplicant"] {
            let pid = self.options.pid_file(daemon, name);
            self.stop(Command::new("pkill").arg("-F").arg(path_arg(&pid))).await;
        }
    }

    async fn start_hostapd(&self, name: &str) -> Result<()> {
        let pid = self.options.pid_file("hostapd", name);
        let conf = self.options.conf_file("hostapd", name);
        self.executor
            .execute_checked(
                &Command::new("hostapd").args(["-B", "-P", &*path_arg(&pid), &*path_arg(&conf)]),
            )
            .await?;
        Ok(())
    }

    async fn start_wpa_supplicant(&self, name: &str, driver: &str) -> Result<()> {
        let pid = self.options.pid_file("wpa_supplicant", name);
        let conf = self.options.conf_file("wpa_supplicant", name);
        self.executor
            .execute_checked(&Command::new("wpa_supplicant").args([
                "-B",
                "-D",
                driver,
                "-i",
                name,
                "-c",
                &*path_arg(&conf),
                "-P",
                &*path_arg(&pid),
            ]))
            .await?;
        Ok(())
    }

    async fn wait_for_association(&self, name: &str) -> WifiState {
        let poll = async {
            let mut ticker = tokio::time::interval(self.options.wifi_poll_interval());
            loop {
                ticker.tick().await;
                if self.association_completed(name).await {
                    return;
                }
            }
        };

        match tokio::time::timeout(self.options.wifi_timeout(), poll).await {
            Ok(()) => {
                info!(interface = %name, "WiFi association completed");
                WifiState::Connected
            }
            Err(_) => {
                warn!(
                    interface = %name,
                    timeout = ?self.options.wifi_timeout(),
                    "WiFi association did not complete"
                );
                WifiState::TimedOut
            }
        }
    }

    async fn association_completed(&self, name: &str) -> bool {
        match self
            .executor
            .execute(&Command::new("wpa_cli").args(["-i", name, "status"]))
            .await
        {
            Ok(output) if output.success() => output
                .stdout
                .lines()
                .any(|line| line.trim() == "wpa_state=COMPLETED"),
            Ok(output) => {
                debug!(interface = %name, exit_code = output.exit_code, "wpa_cli status failed");
                false
            }
            Err(e) => {
                debug!(interface = %name, error = %e, "wpa_cli status failed");
                false
            }
        }
    }

    /// Run a stop command. Stopping something that is not running is fine.
    async fn stop(&self, command: Command) {
        match self.executor.execute(&command).await {
            Ok(output) if !output.success() => {
                debug!(%command, exit_code = output.exit_code, "nothing to stop");
            }
            Ok(_) => {}
            Err(e) => warn!(%command, error = %e, "stop command failed"),
        }
    }
}

/// Flags between `<` and `>` in `ip -o link show` output.
fn parse_link_flags(line: &str) -> impl Iterator<Item = &str> {
    let flags = line
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(flags, _)| flags)
        .unwrap_or("");
    flags.split(',').filter(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ip4Config, NetConfig, WifiConfig};
    use crate::services::CommandOutput;
    use crate::testing::ScriptedExecutor;
    use std::net::Ipv4Addr;
    use tokio::time::Instant;

    const UP: &str = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP\n";
    const DOWN: &str = "3: wlan0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN\n";

    fn wifi_iface(status: NetStatus, mode: WifiMode) -> NetInterfaceConfig {
        let mut iface = NetInterfaceConfig::new("wlan0", InterfaceType::Wifi)
            .with_config(NetConfig::Ip4(Ip4Config {
                status,
                dhcp: true,
                ..Default::default()
            }))
            .with_config(NetConfig::Wifi(WifiConfig::new(mode, "net")));
        iface.addresses[0].wifi_mode = Some(mode);
        iface
    }

    fn controller(executor: &Arc<ScriptedExecutor>) -> InterfaceLifecycleController {
        InterfaceLifecycleController::new(executor.clone(), LifecycleOptions::default())
    }

    #[test]
    fn test_parse_link_flags() {
        assert!(parse_link_flags(UP).any(|f| f == "UP"));
        assert!(!parse_link_flags(DOWN).any(|f| f == "UP"));
        assert_eq!(parse_link_flags("garbage").count(), 0);
    }

    #[tokio::test]
    async fn test_is_up_missing_interface() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|_| {
            CommandOutput::failed(1, "Device \"eth9\" does not exist.")
        }));
        let err = controller(&executor).is_up("eth9").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_returns_once_associated() {
        let start = Instant::now();
        let executor = Arc::new(ScriptedExecutor::with_responder(move |cmd| {
            if cmd.program == "wpa_cli" && start.elapsed() >= Duration::from_secs(3) {
                CommandOutput::ok("bssid=00:11:22:33:44:55\nwpa_state=COMPLETED\n")
            } else if cmd.program == "wpa_cli" {
                CommandOutput::ok("wpa_state=SCANNING\n")
            } else {
                CommandOutput::ok("")
            }
        }));
        let controller = controller(&executor);

        let state = controller
            .enable_wifi(&wifi_iface(NetStatus::EnabledWan, WifiMode::Infra))
            .await
            .unwrap();

        assert_eq!(state, WifiState::Connected);
        assert_eq!(controller.wifi_state("wlan0"), WifiState::Connected);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));

        let lines = executor.command_lines();
        assert_eq!(lines[0], "pkill -F /var/run/hostapd-wlan0.pid");
        assert_eq!(lines[1], "pkill -F /var/run/wpa_supplicant-wlan0.pid");
        assert_eq!(
            lines[2],
            "wpa_supplicant -B -D nl80211 -i wlan0 -c /etc/wpa_supplicant-wlan0.conf -P /var/run/wpa_supplicant-wlan0.pid"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_timeout_is_not_an_error() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|cmd| {
            if cmd.program == "wpa_cli" {
                CommandOutput::ok("wpa_state=SCANNING\n")
            } else {
                CommandOutput::ok("")
            }
        }));
        let controller = controller(&executor);
        let start = Instant::now();

        let state = controller
            .enable_wifi(&wifi_iface(NetStatus::EnabledLan, WifiMode::Adhoc))
            .await
            .unwrap();

        assert_eq!(state, WifiState::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_access_point_starts_without_waiting() {
        let executor = Arc::new(ScriptedExecutor::new());
        let controller = controller(&executor);

        let state = controller
            .enable_wifi(&wifi_iface(NetStatus::EnabledLan, WifiMode::Master))
            .await
            .unwrap();

        assert_eq!(state, WifiState::Connected);
        assert_eq!(
            executor.command_lines().last().map(String::as_str),
            Some("hostapd -B -P /var/run/hostapd-wlan0.pid /etc/hostapd-wlan0.conf")
        );
        assert!(!executor.command_lines().iter().any(|l| l.starts_with("wpa_cli")));
    }

    #[tokio::test]
    async fn test_invalid_role_starts_nothing() {
        let executor = Arc::new(ScriptedExecutor::new());
        let controller = controller(&executor);

        let state = controller
            .enable_wifi(&wifi_iface(NetStatus::EnabledWan, WifiMode::Master))
            .await
            .unwrap();

        assert_eq!(state, WifiState::Disabled);
        assert!(
            executor
                .command_lines()
                .iter()
                .all(|l| l.starts_with("pkill"))
        );
    }

    #[tokio::test]
    async fn test_monitor_interface_is_ignored() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut iface = wifi_iface(NetStatus::EnabledLan, WifiMode::Master);
        iface.name = "mon.wlan0".into();

        controller(&executor).enable_wifi(&iface).await.unwrap();
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn test_disable_wifi_tolerates_missing_daemons() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|_| {
            CommandOutput::failed(1, "pkill: no such file")
        }));
        let controller = controller(&executor);
        controller.disable_wifi("wlan0").await;
        controller.disable_wifi("wlan0").await;
        assert_eq!(controller.wifi_state("wlan0"), WifiState::Disabled);
        assert_eq!(executor.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_enable_down_interface_with_dhcp() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|cmd| {
            if cmd.args.first().map(String::as_str) == Some("-o") {
                CommandOutput::ok(DOWN)
            } else {
                CommandOutput::ok("")
            }
        }));
        let iface = NetInterfaceConfig::new("eth0", InterfaceType::Ethernet);

        controller(&executor).enable_interface(&iface, true).await.unwrap();
        assert_eq!(
            executor.command_lines(),
            vec![
                "ip -o link show dev eth0",
                "dhclient -r -pf /var/run/dhclient-eth0.pid eth0",
                "dhclient -nw -pf /var/run/dhclient-eth0.pid eth0",
            ]
        );
    }

    #[tokio::test]
    async fn test_enable_up_interface_without_dhcp_is_noop() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|_| CommandOutput::ok(UP)));
        let iface = NetInterfaceConfig::new("eth0", InterfaceType::Ethernet);

        controller(&executor).enable_interface(&iface, false).await.unwrap();
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_disable_interface_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        let controller = controller(&executor);

        controller.disable_interface("lo").await.unwrap();
        assert!(executor.commands().is_empty());

        controller.disable_interface("eth0").await.unwrap();
        assert_eq!(
            executor.command_lines(),
            vec![
                "dhclient -x -pf /var/run/dhclient-eth0.pid eth0",
                "pkill -F /var/run/dhcpd-eth0.pid",
                "pkill -F /var/run/hostapd-eth0.pid",
                "pkill -F /var/run/wpa_supplicant-eth0.pid",
                "ip addr flush dev eth0",
                "ip link set dev eth0 down",
            ]
        );
    }

    #[tokio::test]
    async fn test_disable_stops_wifi_daemons_by_name() {
        let executor = Arc::new(ScriptedExecutor::new());
        let controller = controller(&executor);
        controller.set_wifi_state("wlan0", WifiState::Connected);

        controller.disable_interface("wlan0").await.unwrap();

        let lines = executor.command_lines();
        assert!(lines.contains(&"pkill -F /var/run/hostapd-wlan0.pid".to_string()));
        assert!(lines.contains(&"pkill -F /var/run/wpa_supplicant-wlan0.pid".to_string()));
        assert_eq!(controller.wifi_state("wlan0"), WifiState::Disabled);
    }

    fn link_down() -> Arc<ScriptedExecutor> {
        Arc::new(ScriptedExecutor::with_responder(|cmd| {
            if cmd.args.first().map(String::as_str) == Some("-o") {
                CommandOutput::ok(DOWN)
            } else {
                CommandOutput::ok("")
            }
        }))
    }

    fn static_ip4(status: NetStatus, gateway: Option<Ipv4Addr>) -> NetInterfaceConfig {
        NetInterfaceConfig::new("eth0", InterfaceType::Ethernet).with_config(NetConfig::Ip4(
            Ip4Config {
                status,
                dhcp: false,
                address: Some(Ipv4Addr::new(192, 168, 1, 1)),
                prefix: 24,
                gateway,
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_enable_applies_static_address() {
        let executor = link_down();
        let iface = static_ip4(NetStatus::EnabledLan, None);

        controller(&executor).enable_interface(&iface, false).await.unwrap();
        assert_eq!(
            executor.command_lines(),
            vec![
                "ip -o link show dev eth0",
                "ip link set dev eth0 up",
                "ip addr flush dev eth0",
                "ip addr add 192.168.1.1/24 dev eth0",
            ]
        );
    }

    #[tokio::test]
    async fn test_static_wan_sets_default_route() {
        let executor = link_down();
        let iface = static_ip4(NetStatus::EnabledWan, Some(Ipv4Addr::new(192, 168, 1, 254)));

        controller(&executor).enable_interface(&iface, false).await.unwrap();
        assert_eq!(
            executor.command_lines().last().map(String::as_str),
            Some("ip route replace default via 192.168.1.254 dev eth0")
        );

        // a LAN gateway is not a default route
        let executor = link_down();
        let iface = static_ip4(NetStatus::EnabledLan, Some(Ipv4Addr::new(192, 168, 1, 254)));
        controller(&executor).enable_interface(&iface, false).await.unwrap();
        assert!(!executor.command_lines().iter().any(|l| l.starts_with("ip route")));
    }

    #[tokio::test]
    async fn test_missing_wifi_settings_start_nothing() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut iface = NetInterfaceConfig::new("wlan0", InterfaceType::Wifi).with_config(
            NetConfig::Ip4(Ip4Config {
                status: NetStatus::EnabledWan,
                dhcp: true,
                ..Default::default()
            }),
        );
        iface.addresses[0].wifi_mode = Some(WifiMode::Infra);
        let controller = controller(&executor);

        let state = controller.enable_wifi(&iface).await.unwrap();
        assert_eq!(state, WifiState::Disabled);
        assert_eq!(controller.wifi_state("wlan0"), WifiState::Disabled);
        assert!(executor.command_lines().iter().all(|l| l.starts_with("pkill")));
    }

    #[tokio::test]
    async fn test_daemon_start_failure_leaves_wifi_disabled() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|cmd| {
            if cmd.program == "hostapd" {
                CommandOutput::failed(1, "could not configure driver mode")
            } else {
                CommandOutput::ok("")
            }
        }));
        let controller = controller(&executor);

        let err = controller
            .enable_wifi(&wifi_iface(NetStatus::EnabledLan, WifiMode::Master))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(controller.wifi_state("wlan0"), WifiState::Disabled);
    }

    #[tokio::test]
    async fn test_dhcp_server_start_failure_propagates() {
        let executor = Arc::new(ScriptedExecutor::with_responder(|cmd| {
            if cmd.program == "dhcpd" {
                CommandOutput::failed(1, "no subnet declaration")
            } else {
                CommandOutput::ok("")
            }
        }));
        let err = controller(&executor)
            .manage_dhcp_server("eth1", true)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }
}
