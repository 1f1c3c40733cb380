//! Flat string encoding of firewall rules.
//!
//! Each rule set is one property holding `;`-terminated records of
//! comma-separated fields in a fixed order, closed by a `#` field:
//!
//! ```text
//! firewall.open.ports      = port,protocol,network,permittedIface,unpermittedIface,mac,srcPorts,#;
//! firewall.port.forwarding = inIface,outIface,address,protocol,inPort,outPort,masquerade,network,mac,srcPorts,#;
//! firewall.nat             = srcIface,dstIface,protocol,source,destination,masquerade,#;
//! ```
//!
//! An absent optional field is an empty string, so the field count never
//! changes. Decoding is lenient: a malformed record is logged and skipped.

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::warn;
use winnow::ascii::dec_uint;
use winnow::combinator::{opt, preceded, separated_pair};
use winnow::prelude::*;
use winnow::token::take_while;

use super::rules::{
    FirewallConfiguration, NatRule, NatRuleKind, NetworkPair, OpenPortRule, PortForwardRule,
    PortRange, Protocol,
};
use crate::error::{Error, Result};
use crate::properties::PropertyStore;

pub const OPEN_PORTS: &str = "firewall.open.ports";
pub const PORT_FORWARDING: &str = "firewall.port.forwarding";
pub const NAT: &str = "firewall.nat";

const OPEN_PORT_FIELDS: usize = 8;
const PORT_FORWARD_FIELDS: usize = 11;
const NAT_FIELDS: usize = 7;

// ============================================================================
// Field parsers
// ============================================================================

fn port_range(input: &mut &str) -> ModalResult<PortRange> {
    (dec_uint, opt(preceded(':', dec_uint)))
        .map(|(start, end): (u16, Option<u16>)| PortRange::new(start, end.unwrap_or(start)))
        .parse_next(input)
}

fn network<'s>(input: &mut &'s str) -> ModalResult<(&'s str, u8)> {
    separated_pair(take_while(1.., |c: char| c != '/'), '/', dec_uint).parse_next(input)
}

impl FromStr for PortRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        port_range
            .parse(s.trim())
            .map_err(|e| Error::Parse(format!("invalid port range '{}': {}", s, e)))
    }
}

impl FromStr for NetworkPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = network
            .parse(s.trim())
            .map_err(|e| Error::Parse(format!("invalid network '{}': {}", s, e)))?;
        let address = address
            .parse()
            .map_err(|_| Error::Parse(format!("invalid network address '{}'", address)))?;
        Ok(NetworkPair::new(address, prefix))
    }
}

// ============================================================================
// Records
// ============================================================================

fn records(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(';').map(str::trim).filter(|r| !r.is_empty())
}

fn fields(record: &str, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() != expected {
        return Err(Error::Parse(format!(
            "expected {} fields, found {}",
            expected,
            fields.len()
        )));
    }
    if fields[expected - 1] != "#" {
        return Err(Error::Parse("record is not terminated by '#'".to_string()));
    }
    Ok(fields)
}

fn optional<T: FromStr<Err = Error>>(field: &str) -> Result<Option<T>> {
    if field.is_empty() {
        Ok(None)
    } else {
        field.parse().map(Some)
    }
}

fn optional_string(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn required_string(field: &str, name: &str) -> Result<String> {
    optional_string(field).ok_or_else(|| Error::Parse(format!("{} is required", name)))
}

fn boolean(field: &str) -> Result<bool> {
    match field {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::Parse(format!("invalid boolean '{}'", other))),
    }
}

fn port(field: &str, name: &str) -> Result<u16> {
    field
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {} '{}'", name, field)))
}

fn or_empty<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn decode_all<T>(raw: &str, set: &str, parse: fn(&str) -> Result<T>) -> Vec<T> {
    records(raw)
        .filter_map(|record| match parse(record) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(set, record, error = %e, "skipping malformed firewall record");
                None
            }
        })
        .collect()
}

// ============================================================================
// Open ports
// ============================================================================

fn parse_open_port(record: &str) -> Result<OpenPortRule> {
    let f = fields(record, OPEN_PORT_FIELDS)?;
    Ok(OpenPortRule {
        port: f[0].parse()?,
        protocol: f[1].parse()?,
        permitted_network: optional(f[2])?,
        permitted_interface: optional_string(f[3]),
        unpermitted_interface: optional_string(f[4]),
        permitted_mac: optional_string(f[5]),
        source_port_range: optional(f[6])?,
    })
}

pub fn encode_open_ports(rules: &[OpenPortRule]) -> String {
    rules
        .iter()
        .map(|r| {
            format!(
                "{},{},{},{},{},{},{},#;",
                r.port,
                r.protocol,
                or_empty(&r.permitted_network),
                or_empty(&r.permitted_interface),
                or_empty(&r.unpermitted_interface),
                or_empty(&r.permitted_mac),
                or_empty(&r.source_port_range),
            )
        })
        .collect()
}

pub fn decode_open_ports(raw: &str) -> Vec<OpenPortRule> {
    decode_all(raw, OPEN_PORTS, parse_open_port)
}

// ============================================================================
// Port forwarding
// ============================================================================

fn parse_port_forward(record: &str) -> Result<PortForwardRule> {
    let f = fields(record, PORT_FORWARD_FIELDS)?;
    let address: Ipv4Addr = f[2]
        .parse()
        .map_err(|_| Error::Parse(format!("invalid address '{}'", f[2])))?;
    Ok(PortForwardRule {
        inbound_interface: required_string(f[0], "inbound interface")?,
        outbound_interface: required_string(f[1], "outbound interface")?,
        address,
        protocol: f[3].parse()?,
        in_port: port(f[4], "inbound port")?,
        out_port: port(f[5], "outbound port")?,
        masquerade: boolean(f[6])?,
        permitted_network: optional(f[7])?,
        permitted_mac: optional_string(f[8]),
        source_port_range: optional(f[9])?,
    })
}

pub fn encode_port_forwards(rules: &[PortForwardRule]) -> String {
    rules
        .iter()
        .map(|r| {
            format!(
                "{},{},{},{},{},{},{},{},{},{},#;",
                r.inbound_interface,
                r.outbound_interface,
                r.address,
                r.protocol,
                r.in_port,
                r.out_port,
                r.masquerade,
                or_empty(&r.permitted_network),
                or_empty(&r.permitted_mac),
                or_empty(&r.source_port_range),
            )
        })
        .collect()
}

pub fn decode_port_forwards(raw: &str) -> Vec<PortForwardRule> {
    decode_all(raw, PORT_FORWARDING, parse_port_forward)
}

// ============================================================================
// NAT
// ============================================================================

fn parse_nat(record: &str) -> Result<NatRule> {
    let f = fields(record, NAT_FIELDS)?;
    Ok(NatRule {
        source_interface: f[0].to_string(),
        destination_interface: f[1].to_string(),
        protocol: optional(f[2])?,
        source: optional(f[3])?,
        destination: optional(f[4])?,
        masquerade: boolean(f[5])?,
        kind: NatRuleKind::Generic,
    })
}

pub fn encode_nat(rules: &[NatRule]) -> String {
    rules
        .iter()
        .map(|r| {
            format!(
                "{},{},{},{},{},{},#;",
                r.source_interface,
                r.destination_interface,
                or_empty(&r.protocol),
                or_empty(&r.source),
                or_empty(&r.destination),
                r.masquerade,
            )
        })
        .collect()
}

pub fn decode_nat(raw: &str) -> Vec<NatRule> {
    decode_all(raw, NAT, parse_nat)
}

// ============================================================================
// Property bag
// ============================================================================

impl FirewallConfiguration {
    /// Decode the three rule properties. Missing properties are empty sets.
    pub fn from_properties(props: &PropertyStore) -> Self {
        let raw = |key: &str| props.get_str(key).unwrap_or_default().to_string();
        Self {
            open_ports: decode_open_ports(&raw(OPEN_PORTS)),
            port_forwards: decode_port_forwards(&raw(PORT_FORWARDING)),
            nat: decode_nat(&raw(NAT)),
        }
    }

    /// Encode the three rule properties. Automatic NAT rules are derived, not
    /// stored, and are left out.
    pub fn to_properties(&self) -> PropertyStore {
        let generic: Vec<NatRule> = self
            .nat
            .iter()
            .filter(|r| r.kind == NatRuleKind::Generic)
            .cloned()
            .collect();

        let mut props = PropertyStore::new();
        props.insert(OPEN_PORTS, encode_open_ports(&self.open_ports));
        props.insert(PORT_FORWARDING, encode_port_forwards(&self.port_forwards));
        props.insert(NAT, encode_nat(&generic));
        props
    }
}
