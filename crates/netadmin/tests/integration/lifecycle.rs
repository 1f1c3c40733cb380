//! Interface bring-up and tear-down driven through the engine.

use netadmin::lifecycle::WifiState;
use netadmin::model::InterfaceType;
use netadmin::services::{Command, CommandOutput};
use netadmin::testing::ScriptedExecutor;

use crate::common::TestGateway;

const DOWN: &str = "3: wlan0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN\n";
const UP: &str = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP\n";

fn link_and_wpa(link: &'static str, wpa_state: &'static str) -> ScriptedExecutor {
    ScriptedExecutor::with_responder(move |cmd: &Command| match cmd.program.as_str() {
        "ip" if cmd.args.first().map(String::as_str) == Some("-o") => CommandOutput::ok(link),
        "wpa_cli" => CommandOutput::ok(format!(
            "bssid=00:11:22:33:44:55\nwpa_state={}\n",
            wpa_state
        )),
        _ => CommandOutput::ok(""),
    })
}

fn station() -> netadmin::PropertyStore {
    props! {
        "net.interfaces" => "wlan0",
        "net.interface.wlan0.config.ip4.status" => "netIPv4StatusEnabledWAN",
        "net.interface.wlan0.config.dhcpClient4.enabled" => true,
        "net.interface.wlan0.config.wifi.mode" => "INFRA",
        "net.interface.wlan0.config.wifi.infra.ssid" => "upstream",
    }
}

fn fast_wifi(options: &mut netadmin::AdminOptions) {
    options.lifecycle.wifi_poll_interval_ms = 10;
    options.lifecycle.wifi_timeout_ms = 200;
}

#[tokio::test]
async fn test_station_connects_and_takes_a_lease() {
    let gw = TestGateway::with_executor(
        &[("wlan0", InterfaceType::Wifi)],
        link_and_wpa(DOWN, "COMPLETED"),
        fast_wifi,
    );
    gw.seed(station()).await;
    let conf = gw.dir.path().join("etc").join("wpa_supplicant-wlan0.conf");
    let contents = std::fs::read_to_string(&conf).unwrap();
    assert!(contents.contains("ssid=\"upstream\""));
    assert!(contents.contains("key_mgmt=NONE"));

    gw.admin.enable_interface("wlan0", true).await.unwrap();

    assert_eq!(gw.admin.lifecycle().wifi_state("wlan0"), WifiState::Connected);
    let lines = gw.executor.command_lines();
    let run = gw.dir.path().join("run");
    let etc = gw.dir.path().join("etc");
    assert!(lines.contains(&format!(
        "wpa_supplicant -B -D nl80211 -i wlan0 -c {} -P {}",
        etc.join("wpa_supplicant-wlan0.conf").display(),
        run.join("wpa_supplicant-wlan0.pid").display()
    )));
    assert!(lines.contains(&format!(
        "dhclient -nw -pf {} wlan0",
        run.join("dhclient-wlan0.pid").display()
    )));
    assert!(!lines.iter().any(|l| l.starts_with("hostapd")));
}

#[tokio::test]
async fn test_station_association_timeout_is_not_an_error() {
    let gw = TestGateway::with_executor(
        &[("wlan0", InterfaceType::Wifi)],
        link_and_wpa(DOWN, "SCANNING"),
        fast_wifi,
    );
    gw.seed(station()).await;

    gw.admin.enable_interface("wlan0", false).await.unwrap();
    assert_eq!(gw.admin.lifecycle().wifi_state("wlan0"), WifiState::TimedOut);
    assert!(
        gw.executor
            .command_lines()
            .contains(&"ip link set dev wlan0 up".to_string())
    );
}

#[tokio::test]
async fn test_access_point_with_dhcp_server() {
    let gw = TestGateway::with_executor(
        &[("wlan0", InterfaceType::Wifi)],
        link_and_wpa(DOWN, "COMPLETED"),
        |_| {},
    );
    gw.seed(props! {
        "net.interfaces" => "wlan0",
        "net.interface.wlan0.config.ip4.status" => "netIPv4StatusEnabledLAN",
        "net.interface.wlan0.config.ip4.address" => "172.16.1.1",
        "net.interface.wlan0.config.ip4.prefix" => 24,
        "net.interface.wlan0.config.wifi.mode" => "MASTER",
        "net.interface.wlan0.config.wifi.master.ssid" => "gateway-ap",
        "net.interface.wlan0.config.dhcpServer4.enabled" => true,
        "net.interface.wlan0.config.dhcpServer4.prefix" => 24,
        "net.interface.wlan0.config.dhcpServer4.rangeStart" => "172.16.1.100",
        "net.interface.wlan0.config.dhcpServer4.rangeEnd" => "172.16.1.150",
    })
    .await;

    let dhcpd = gw.dir.path().join("etc").join("dhcpd-wlan0.conf");
    let contents = std::fs::read_to_string(&dhcpd).unwrap();
    assert!(contents.contains("subnet 172.16.1.0 netmask 255.255.255.0 {"));
    assert!(contents.contains("range 172.16.1.100 172.16.1.150;"));
    let hostapd = gw.dir.path().join("etc").join("hostapd-wlan0.conf");
    let contents = std::fs::read_to_string(&hostapd).unwrap();
    assert!(contents.contains("interface=wlan0\n"));
    assert!(contents.contains("ssid=gateway-ap\n"));
    assert!(!contents.contains("wpa="));

    gw.admin.enable_interface("wlan0", false).await.unwrap();
    assert_eq!(gw.admin.lifecycle().wifi_state("wlan0"), WifiState::Connected);
    assert!(gw.executor.command_lines().iter().any(|l| l.starts_with("hostapd -B")));
    assert!(!gw.executor.command_lines().iter().any(|l| l.starts_with("wpa_supplicant")));
}

#[tokio::test]
async fn test_up_interface_only_renews_its_lease() {
    let gw = TestGateway::with_executor(
        &[("eth0", InterfaceType::Ethernet)],
        link_and_wpa(UP, "COMPLETED"),
        |_| {},
    );
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusEnabledLAN",
        "net.interface.eth0.config.dhcpClient4.enabled" => true,
    })
    .await;
    gw.executor.clear();

    gw.admin.enable_interface("eth0", true).await.unwrap();
    let programs: Vec<String> = gw
        .executor
        .commands()
        .into_iter()
        .map(|c| format!("{} {}", c.program, c.args[0]))
        .collect();
    assert_eq!(programs, vec!["ip -o", "dhclient -r", "dhclient -nw"]);

    gw.executor.clear();
    gw.admin.enable_interface("eth0", false).await.unwrap();
    assert_eq!(gw.executor.commands().len(), 1);
}

#[tokio::test]
async fn test_disable_unconfigured_interface() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! { "net.interfaces" => "eth0" }).await;

    gw.admin.disable_interface("eth9").await.unwrap();
    let lines = gw.executor.command_lines();
    assert_eq!(lines.last().map(String::as_str), Some("ip link set dev eth9 down"));
    assert!(lines.iter().any(|l| l.starts_with("dhclient -x")));
    assert!(lines.iter().any(|l| l.ends_with("/hostapd-eth9.pid")));
    assert!(lines.iter().any(|l| l.ends_with("/wpa_supplicant-eth9.pid")));
    assert!(lines.contains(&"ip addr flush dev eth9".to_string()));

    gw.executor.clear();
    gw.admin.disable_interface("lo").await.unwrap();
    assert!(gw.executor.commands().is_empty());
}

#[tokio::test]
async fn test_enable_requires_configuration() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! { "net.interfaces" => "eth0" }).await;

    let err = gw.admin.enable_interface("eth9", true).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(gw.executor.commands().is_empty());
}
