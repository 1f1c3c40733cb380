//! Firewall rule model, property encoding and `iptables` application.
//!
//! Three independent rule sets are kept: open ports, port forwards and NAT.
//! Each is stored as one flat property (see [Encoding](#encoding)) and
//! applied with replace-all semantics by [`FirewallApplier`].
//!
//! NAT rules derived from the network configuration (a NAT-enabled LAN
//! interface towards each WAN interface) are computed by [`auto_nat_rules`]
//! and never persisted.
//!
//! # Encoding
//!
//! See [`encode_open_ports`], [`encode_port_forwards`] and [`encode_nat`].

mod apply;
mod codec;
mod rules;

pub use apply::{
    ApplyError, ApplyOptions, ApplyResult, CHAINS, Chain, FirewallApplier, IptablesRule,
    nat_rules, open_port_rules, port_forward_rules, render,
};
pub use codec::{
    NAT, OPEN_PORTS, PORT_FORWARDING, decode_nat, decode_open_ports, decode_port_forwards,
    encode_nat, encode_open_ports, encode_port_forwards,
};
pub use rules::{
    FirewallConfiguration, NatRule, NatRuleKind, NetworkPair, OpenPortRule, PortForwardRule,
    PortRange, Protocol,
};

use crate::model::NetworkConfiguration;

/// Masquerade rules from every NAT source interface to every WAN interface.
pub fn auto_nat_rules(config: &NetworkConfiguration) -> Vec<NatRule> {
    let mut rules = Vec::new();
    for source in config.interfaces().iter().filter(|i| i.is_nat_source()) {
        for wan in config.wan_interfaces().filter(|w| w.name != source.name) {
            let mut rule = NatRule::masquerade(source.name.as_str(), wan.name.as_str());
            rule.kind = NatRuleKind::AutoAddedFromWan;
            rules.push(rule);
        }
    }
    rules
}
