//! Firewall rule types.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::validation::{
    Validatable, ValidationResult, validate_ifname, validate_ipv4_prefix_len,
    validate_ipv6_prefix_len, validate_mac, validate_port_range,
};

/// An address with a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NetworkPair {
    pub address: IpAddr,
    pub prefix: u8,
}

impl NetworkPair {
    pub fn new(address: IpAddr, prefix: u8) -> Self {
        Self { address, prefix }
    }

    /// `0.0.0.0/0`
    pub fn any_v4() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }

    /// `::/0`
    pub fn any_v6() -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    }

    pub fn is_any(&self) -> bool {
        self.prefix == 0 && self.address.is_unspecified()
    }
}

impl fmt::Display for NetworkPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl Validatable for NetworkPair {
    fn validate(&self) -> ValidationResult {
        match self.address {
            IpAddr::V4(_) => validate_ipv4_prefix_len(self.prefix, "network.prefix"),
            IpAddr::V6(_) => validate_ipv6_prefix_len(self.prefix, "network.prefix"),
        }
    }
}

/// Transport protocol of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Any protocol; only meaningful for NAT rules.
    All,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "all" => Ok(Self::All),
            other => Err(Error::Parse(format!("invalid protocol '{}'", other))),
        }
    }
}

/// A single port or an inclusive range, written `p` or `a:b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn single(port: u16) -> Self {
        Self::new(port, port)
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl Validatable for PortRange {
    fn validate(&self) -> ValidationResult {
        validate_port_range(self.start, self.end, "port")
    }
}

/// Accept inbound traffic to a local port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenPortRule {
    pub port: PortRange,
    pub protocol: Protocol,
    pub permitted_network: Option<NetworkPair>,
    pub permitted_interface: Option<String>,
    pub unpermitted_interface: Option<String>,
    pub permitted_mac: Option<String>,
    pub source_port_range: Option<PortRange>,
}

impl OpenPortRule {
    pub fn new(port: PortRange, protocol: Protocol) -> Self {
        Self {
            port,
            protocol,
            permitted_network: None,
            permitted_interface: None,
            unpermitted_interface: None,
            permitted_mac: None,
            source_port_range: None,
        }
    }
}

/// Forward an inbound port to an address behind the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortForwardRule {
    pub inbound_interface: String,
    pub outbound_interface: String,
    pub address: Ipv4Addr,
    pub protocol: Protocol,
    pub in_port: u16,
    pub out_port: u16,
    pub masquerade: bool,
    pub permitted_network: Option<NetworkPair>,
    pub permitted_mac: Option<String>,
    pub source_port_range: Option<PortRange>,
}

/// Origin of a NAT rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NatRuleKind {
    /// Configured explicitly.
    #[default]
    Generic,
    /// Derived from a NAT-enabled LAN and a WAN interface.
    AutoAddedFromWan,
}

/// Route traffic from one interface out of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NatRule {
    /// Empty matches any interface.
    pub source_interface: String,
    /// Empty matches any interface.
    pub destination_interface: String,
    pub protocol: Option<Protocol>,
    pub source: Option<NetworkPair>,
    pub destination: Option<NetworkPair>,
    pub masquerade: bool,
    pub kind: NatRuleKind,
}

impl NatRule {
    /// Masquerade everything from `source` out of `destination`.
    pub fn masquerade(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_interface: source.into(),
            destination_interface: destination.into(),
            protocol: None,
            source: None,
            destination: None,
            masquerade: true,
            kind: NatRuleKind::Generic,
        }
    }
}

/// The three independent rule sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FirewallConfiguration {
    pub open_ports: Vec<OpenPortRule>,
    pub port_forwards: Vec<PortForwardRule>,
    pub nat: Vec<NatRule>,
}

impl FirewallConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.open_ports.is_empty() && self.port_forwards.is_empty() && self.nat.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.open_ports.len() + self.port_forwards.len() + self.nat.len()
    }
}

fn validate_optional_ifname(name: &Option<String>, field: &str, result: &mut ValidationResult) {
    if let Some(name) = name {
        result.merge(validate_ifname(name, field));
    }
}

impl Validatable for OpenPortRule {
    fn validate(&self) -> ValidationResult {
        let mut result = self.port.validate();
        if self.protocol == Protocol::All {
            result.add_error("protocol", "open ports need tcp or udp");
        }
        if let Some(network) = &self.permitted_network {
            result.merge(network.validate());
        }
        validate_optional_ifname(&self.permitted_interface, "permittedInterfaceName", &mut result);
        validate_optional_ifname(
            &self.unpermitted_interface,
            "unpermittedInterfaceName",
            &mut result,
        );
        if self.permitted_interface.is_some() && self.unpermitted_interface.is_some() {
            result.add_error(
                "permittedInterfaceName",
                "permitted and unpermitted interfaces are mutually exclusive",
            );
        }
        if let Some(mac) = &self.permitted_mac {
            result.merge(validate_mac(mac, "permittedMac"));
        }
        if let Some(range) = &self.source_port_range {
            result.merge(range.validate());
        }
        result
    }
}

impl Validatable for PortForwardRule {
    fn validate(&self) -> ValidationResult {
        let mut result = validate_ifname(&self.inbound_interface, "inboundInterface");
        result.merge(validate_ifname(&self.outbound_interface, "outboundInterface"));
        if self.protocol == Protocol::All {
            result.add_error("protocol", "port forwards need tcp or udp");
        }
        if self.in_port == 0 || self.out_port == 0 {
            result.add_error("port", "ports must be non-zero");
        }
        if let Some(network) = &self.permitted_network {
            result.merge(network.validate());
        }
        if let Some(mac) = &self.permitted_mac {
            result.merge(validate_mac(mac, "permittedMac"));
        }
        if let Some(range) = &self.source_port_range {
            result.merge(range.validate());
        }
        result
    }
}

impl Validatable for NatRule {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        for (iface, field) in [
            (&self.source_interface, "sourceInterface"),
            (&self.destination_interface, "destinationInterface"),
        ] {
            if !iface.is_empty() {
                result.merge(validate_ifname(iface, field));
            }
        }
        if !self.source_interface.is_empty()
            && self.source_interface == self.destination_interface
        {
            result.add_warning("destinationInterface", "source and destination are the same");
        }
        for network in [&self.source, &self.destination].into_iter().flatten() {
            result.merge(network.validate());
        }
        result
    }
}

impl Validatable for FirewallConfiguration {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        for rule in &self.open_ports {
            result.merge(rule.validate());
        }
        for rule in &self.port_forwards {
            result.merge(rule.validate());
        }
        for rule in &self.nat {
            result.merge(rule.validate());
        }
        result
    }
}
