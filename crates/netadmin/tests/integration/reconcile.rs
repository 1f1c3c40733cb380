//! End-to-end reconciliation: single-interface updates submitted through the
//! store and confirmed by the update pass.

use std::net::Ipv4Addr;

use netadmin::config::InterfaceUpdate;
use netadmin::model::{
    InterfaceType, Ip4Config, NetConfig, NetConfigKind, NetStatus, WifiConfig, WifiMode,
};
use netadmin::services::ConfigurationService;
use netadmin::testing::ScriptedExecutor;
use pretty_assertions::assert_eq;

use crate::common::{TestGateway, fast_confirmation};

fn lan_dhcp() -> NetConfig {
    NetConfig::Ip4(Ip4Config {
        status: NetStatus::EnabledLan,
        dhcp: true,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_replacement_drops_unlisted_fragments() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.type" => "ETHERNET",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
        "net.interface.eth0.config.dhcpServer4.enabled" => true,
        "net.interface.eth0.config.dhcpServer4.rangeStart" => "192.168.0.100",
        "net.interface.eth0.config.dhcpServer4.rangeEnd" => "192.168.0.200",
    })
    .await;

    let changed = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap();
    assert!(changed);

    let config = gw.admin.network_configuration();
    let eth0 = config.get("eth0").unwrap();
    assert_eq!(eth0.addresses[0].configs, vec![lan_dhcp()]);
    assert!(config.modified_interface_names().is_empty());

    let stored = gw.admin.properties().await;
    assert!(!stored.contains_key("net.interface.eth0.config.dhcpServer4.enabled"));
    assert!(!stored.contains_key("modified.interface.names"));

    let persisted = gw.store.configuration("net.admin.network").unwrap();
    assert_eq!(persisted.get_str("modified.interface.names"), Some("eth0"));
    assert_eq!(gw.store.snapshots().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_replacement_keeps_unmodeled_keys() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.type" => "ETHERNET",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
        "net.interface.eth0.config.vendor.ledMode" => "blink",
        "net.interface.eth0.config.dhcpServer4.enabled" => true,
        "net.interface.eth0.config.dhcpServer4.rangeStart" => "192.168.0.100",
        "net.interface.eth0.config.dhcpServer4.rangeEnd" => "192.168.0.200",
    })
    .await;

    let changed = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap();
    assert!(changed);

    let stored = gw.admin.properties().await;
    assert_eq!(stored.get_str("net.interface.eth0.config.vendor.ledMode"), Some("blink"));
    assert!(!stored.contains_key("net.interface.eth0.config.dhcpServer4.enabled"));

    let persisted = gw.store.configuration("net.admin.network").unwrap();
    assert_eq!(persisted.get_str("net.interface.eth0.config.vendor.ledMode"), Some("blink"));
    assert_eq!(
        persisted.get_str("net.interface.eth0.config.ip4.status"),
        Some("netIPv4StatusEnabledLAN")
    );
}

#[tokio::test]
async fn test_repeated_update_is_a_no_op() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
    })
    .await;

    let update = InterfaceUpdate::new(vec![lan_dhcp()]).mtu(1400);
    assert!(gw
        .admin
        .update_ethernet_interface_config("eth0", update.clone())
        .await
        .unwrap());
    assert!(!gw
        .admin
        .update_ethernet_interface_config("eth0", update)
        .await
        .unwrap());
    assert_eq!(gw.store.snapshots().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_untouched_interfaces_survive() {
    let gw = TestGateway::new(&[
        ("eth0", InterfaceType::Ethernet),
        ("eth1", InterfaceType::Ethernet),
    ]);
    gw.seed(props! {
        "net.interfaces" => "eth0,eth1",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusEnabledWAN",
        "net.interface.eth0.config.dhcpClient4.enabled" => true,
        "net.interface.eth1.config.ip4.status" => "netIPv4StatusEnabledLAN",
        "net.interface.eth1.config.ip4.address" => "172.16.0.1",
        "net.interface.eth1.config.ip4.prefix" => 24,
    })
    .await;

    gw.admin
        .update_ethernet_interface_config(
            "eth0",
            InterfaceUpdate::new(vec![NetConfig::Ip4(Ip4Config {
                status: NetStatus::EnabledWan,
                dhcp: false,
                address: Some(Ipv4Addr::new(10, 0, 0, 2)),
                prefix: 8,
                gateway: Some(Ipv4Addr::new(10, 0, 0, 1)),
                ..Default::default()
            })]),
        )
        .await
        .unwrap();

    let config = gw.admin.network_configuration();
    let eth1 = config.get("eth1").unwrap().ip4().unwrap();
    assert_eq!(eth1.address, Some(Ipv4Addr::new(172, 16, 0, 1)));
    assert_eq!(eth1.prefix, 24);
    assert_eq!(
        config.get("eth0").unwrap().ip4().unwrap().gateway,
        Some(Ipv4Addr::new(10, 0, 0, 1))
    );
}

#[tokio::test]
async fn test_invalid_update_is_rejected_without_side_effects() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusEnabledLAN",
    })
    .await;

    let invalid = NetConfig::Ip4(Ip4Config {
        status: NetStatus::EnabledLan,
        address: Some(Ipv4Addr::new(192, 168, 1, 1)),
        prefix: 40,
        ..Default::default()
    });
    let err = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![invalid]))
        .await
        .unwrap_err();
    assert!(err.is_configuration_error());

    let missing = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(missing, netadmin::Error::RequiredAttributeMissing(_)));

    assert!(gw.store.configuration("net.admin.network").is_none());
}

#[tokio::test]
async fn test_wrong_interface_type_is_rejected() {
    let gw = TestGateway::new(&[("wlan0", InterfaceType::Wifi)]);
    gw.seed(props! {
        "net.interfaces" => "wlan0",
        "net.interface.wlan0.config.ip4.status" => "netIPv4StatusEnabledLAN",
    })
    .await;

    let err = gw
        .admin
        .update_ethernet_interface_config("wlan0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap_err();
    assert!(matches!(err, netadmin::Error::UnsupportedInterfaceType { .. }));

    let err = gw
        .admin
        .update_ethernet_interface_config("eth7", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_wifi_update_keeps_other_modes() {
    let gw = TestGateway::new(&[("wlan0", InterfaceType::Wifi)]);
    gw.seed(props! {
        "net.interfaces" => "wlan0",
        "net.interface.wlan0.config.ip4.status" => "netIPv4StatusEnabledLAN",
        "net.interface.wlan0.config.wifi.mode" => "MASTER",
        "net.interface.wlan0.config.wifi.master.ssid" => "gateway-ap",
        "net.interface.wlan0.config.wifi.master.mode" => "MASTER",
        "net.interface.wlan0.config.wifi.master.passphrase" => "ap-secret",
    })
    .await;

    let station = WifiConfig::new(WifiMode::Infra, "upstream");
    let changed = gw
        .admin
        .update_wifi_interface_config(
            "wlan0",
            InterfaceUpdate::new(vec![
                NetConfig::Ip4(Ip4Config {
                    status: NetStatus::EnabledWan,
                    dhcp: true,
                    ..Default::default()
                }),
                NetConfig::Wifi(station),
            ]),
        )
        .await
        .unwrap();
    assert!(changed);

    let config = gw.admin.network_configuration();
    let wlan0 = config.get("wlan0").unwrap();
    let address = &wlan0.addresses[0];
    assert_eq!(address.wifi_mode, Some(WifiMode::Infra));
    assert_eq!(address.wifi(WifiMode::Infra).unwrap().ssid, "upstream");
    assert_eq!(address.wifi(WifiMode::Master).unwrap().ssid, "gateway-ap");

    let stored = gw.admin.properties().await;
    assert_eq!(
        stored.get_str("net.interface.wlan0.config.wifi.master.passphrase"),
        Some("enc:terces-pa")
    );
}

#[tokio::test]
async fn test_unconfirmed_submission_still_succeeds() {
    let gw = TestGateway::with_executor(
        &[("eth0", InterfaceType::Ethernet)],
        ScriptedExecutor::new(),
        fast_confirmation,
    );
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
    })
    .await;
    // the store accepts the write but never hands it back
    gw.stop_delivery();

    let changed = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap();
    assert!(changed);

    let persisted = gw.store.configuration("net.admin.network").unwrap();
    assert_eq!(
        persisted.get_str("net.interface.eth0.config.ip4.status"),
        Some("netIPv4StatusEnabledLAN")
    );
    assert_eq!(
        gw.admin.network_configuration().get("eth0").unwrap().ip4_status(),
        NetStatus::Disabled
    );
}

#[tokio::test]
async fn test_closed_admin_rejects_updates() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
    })
    .await;
    gw.admin.close();

    let err = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap_err();
    assert!(!err.is_configuration_error());
    assert!(gw.store.configuration("net.admin.network").is_none());
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let gw = TestGateway::new(&[("eth0", InterfaceType::Ethernet)]);
    gw.seed(props! {
        "net.interfaces" => "eth0",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
    })
    .await;
    gw.store.set_failure(Some("storage is read-only"));

    let err = gw
        .admin
        .update_ethernet_interface_config("eth0", InterfaceUpdate::new(vec![lan_dhcp()]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("read-only"));

    let config = gw.admin.network_configuration();
    let eth0 = config.get("eth0").unwrap().primary().unwrap();
    assert!(eth0.find(NetConfigKind::Ip4).is_some());
    assert_eq!(eth0.ip4().unwrap().status, NetStatus::Disabled);
    assert!(gw.store.snapshots().await.unwrap().is_empty());
}
