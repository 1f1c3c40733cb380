//! Firewall rule sets through the engine: setters, store delivery, automatic
//! NAT and rule application.

use std::net::Ipv4Addr;
use std::sync::Arc;

use netadmin::firewall::{
    ApplyOptions, FirewallApplier, FirewallConfiguration, NatRule, NatRuleKind, NetworkPair,
    OPEN_PORTS, OpenPortRule, PORT_FORWARDING, PortForwardRule, PortRange, Protocol,
};
use netadmin::model::InterfaceType;
use netadmin::services::CommandOutput;
use netadmin::testing::ScriptedExecutor;
use pretty_assertions::assert_eq;

use crate::common::{TestGateway, settle};

const MASQUERADE_ETH1_TO_ETH0: &str = "iptables -t nat -A gw-postrouting -o eth0 -j MASQUERADE";

fn lan_with_nat() -> netadmin::PropertyStore {
    props! {
        "net.interfaces" => "eth0,eth1",
        "net.interface.eth0.config.ip4.status" => "netIPv4StatusEnabledWAN",
        "net.interface.eth0.config.dhcpClient4.enabled" => true,
        "net.interface.eth1.config.ip4.status" => "netIPv4StatusEnabledLAN",
        "net.interface.eth1.config.ip4.address" => "192.168.1.1",
        "net.interface.eth1.config.ip4.prefix" => 24,
        "net.interface.eth1.config.nat.enabled" => true,
    }
}

fn two_ports() -> TestGateway {
    TestGateway::new(&[
        ("eth0", InterfaceType::Ethernet),
        ("eth1", InterfaceType::Ethernet),
    ])
}

#[tokio::test]
async fn test_auto_nat_follows_the_network_configuration() {
    let gw = two_ports();
    gw.seed(lan_with_nat()).await;

    let firewall = gw.admin.firewall_configuration().await;
    assert_eq!(firewall.nat.len(), 1);
    assert_eq!(firewall.nat[0].source_interface, "eth1");
    assert_eq!(firewall.nat[0].destination_interface, "eth0");
    assert_eq!(firewall.nat[0].kind, NatRuleKind::AutoAddedFromWan);
    assert!(
        gw.executor
            .command_lines()
            .contains(&MASQUERADE_ETH1_TO_ETH0.to_string())
    );
    // derived rules are never stored
    assert!(gw.store.configuration("net.admin.firewall").is_none());

    gw.executor.clear();
    gw.admin
        .updated(props! {
            "net.interfaces" => "eth0,eth1",
            "net.interface.eth0.config.ip4.status" => "netIPv4StatusDisabled",
        })
        .await
        .unwrap();

    assert!(gw.admin.firewall_configuration().await.nat.is_empty());
    let lines = gw.executor.command_lines();
    assert!(lines.contains(&"iptables -t nat -F gw-postrouting".to_string()));
    assert!(!lines.iter().any(|l| l.contains("MASQUERADE")));
}

#[tokio::test]
async fn test_unchanged_auto_nat_does_not_reapply() {
    let gw = two_ports();
    gw.seed(lan_with_nat()).await;
    gw.executor.clear();

    gw.admin
        .updated(props! {
            "net.interfaces" => "eth0,eth1",
            "net.interface.eth1.config.mtu" => 1400,
        })
        .await
        .unwrap();
    assert!(gw.executor.command_lines().is_empty());
}

#[tokio::test]
async fn test_manage_firewall_restricts_to_gateway() {
    let gw = TestGateway::new(&[
        ("eth0", InterfaceType::Ethernet),
        ("eth1", InterfaceType::Ethernet),
        ("eth2", InterfaceType::Ethernet),
    ]);
    let mut props = lan_with_nat();
    props.insert("net.interfaces", "eth0,eth1,eth2");
    props.insert("net.interface.eth2.config.ip4.status", "netIPv4StatusEnabledWAN");
    props.insert("net.interface.eth2.config.dhcpClient4.enabled", true);
    gw.seed(props).await;
    assert_eq!(gw.admin.firewall_configuration().await.nat.len(), 2);

    gw.admin.manage_firewall(Some("eth2")).await.unwrap();
    let nat = gw.admin.firewall_configuration().await.nat;
    assert_eq!(nat.len(), 1);
    assert_eq!(nat[0].destination_interface, "eth2");

    gw.admin.manage_firewall(None).await.unwrap();
    assert_eq!(gw.admin.firewall_configuration().await.nat.len(), 2);
}

#[tokio::test]
async fn test_port_forward_is_persisted_and_delivered() {
    let gw = two_ports();
    gw.seed(lan_with_nat()).await;

    let forward = PortForwardRule {
        inbound_interface: "eth0".to_string(),
        outbound_interface: "eth1".to_string(),
        address: Ipv4Addr::new(192, 168, 1, 50),
        protocol: Protocol::Tcp,
        in_port: 8080,
        out_port: 80,
        masquerade: false,
        permitted_network: None,
        permitted_mac: None,
        source_port_range: None,
    };
    let result = gw
        .admin
        .set_firewall_port_forwarding(vec![forward])
        .await
        .unwrap();
    assert!(result.is_success());

    let stored = gw.store.configuration("net.admin.firewall").unwrap();
    assert!(!stored.get_str(PORT_FORWARDING).unwrap_or_default().is_empty());
    assert_eq!(stored.get_str(OPEN_PORTS), Some(""));

    settle().await;
    let firewall = gw.admin.firewall_configuration().await;
    assert_eq!(firewall.port_forwards.len(), 1);
    assert_eq!(
        firewall.port_forwards[0].permitted_network,
        Some(NetworkPair::any_v4())
    );
    // the automatic rule survives a delivered rule set
    assert_eq!(firewall.nat.len(), 1);
    assert!(gw.executor.command_lines().contains(
        &"iptables -t nat -A gw-prerouting -p tcp -i eth0 --dport 8080 -j DNAT --to-destination 192.168.1.50:80"
            .to_string()
    ));
}

#[tokio::test]
async fn test_configured_nat_is_generic() {
    let gw = two_ports();
    gw.seed(props! { "net.interfaces" => "eth0,eth1" }).await;

    let mut rule = NatRule::masquerade("eth1", "eth0");
    rule.kind = NatRuleKind::AutoAddedFromWan;
    gw.admin.set_firewall_nat(vec![rule]).await.unwrap();

    let nat = gw.admin.firewall_configuration().await.nat;
    assert_eq!(nat.len(), 1);
    assert_eq!(nat[0].kind, NatRuleKind::Generic);
    let stored = gw.store.configuration("net.admin.firewall").unwrap();
    assert!(!stored.get_str("firewall.nat").unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_failed_rule_is_reported_and_others_applied() {
    let executor = ScriptedExecutor::with_responder(|cmd| {
        if cmd.args.iter().any(|a| a == "8443") {
            CommandOutput::failed(1, "iptables: Invalid argument")
        } else {
            CommandOutput::ok("")
        }
    });
    let gw = TestGateway::with_executor(&[("eth0", InterfaceType::Ethernet)], executor, |_| {});
    gw.seed(props! { "net.interfaces" => "eth0" }).await;

    let result = gw
        .admin
        .set_firewall_open_ports(vec![
            OpenPortRule::new(PortRange::single(22), Protocol::Tcp),
            OpenPortRule::new(PortRange::single(8443), Protocol::Tcp),
        ])
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.changes_made, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].rule.contains("--dport 8443"));
    // the rule set is still stored as configured
    assert_eq!(
        gw.store
            .configuration("net.admin.firewall")
            .unwrap()
            .get_str(OPEN_PORTS),
        Some("22,tcp,0.0.0.0/0,,,,,#;8443,tcp,0.0.0.0/0,,,,,#;")
    );
}

#[tokio::test]
async fn test_stored_rules_dry_run() {
    let mut props = netadmin::PropertyStore::new();
    props.insert(OPEN_PORTS, "22,tcp,0.0.0.0/0,,,,,#;1194,udp,10.0.0.0/8,,,,,#;");
    let config = FirewallConfiguration::from_properties(&props);
    assert_eq!(config.open_ports.len(), 2);

    let executor = Arc::new(ScriptedExecutor::new());
    let result = FirewallApplier::new(executor.clone())
        .apply(&config, ApplyOptions { dry_run: true })
        .await
        .unwrap();

    assert!(executor.commands().is_empty());
    assert_eq!(result.changes_made, 2);
    assert!(result.summary.contains(
        &"iptables -t filter -A gw-input -p tcp --dport 22 -j ACCEPT".to_string()
    ));
    assert!(result.summary.contains(
        &"iptables -t filter -A gw-input -p udp -s 10.0.0.0/8 --dport 1194 -j ACCEPT".to_string()
    ));
}
