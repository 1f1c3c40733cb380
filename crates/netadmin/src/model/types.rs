//! Typed configuration fragments.
//!
//! An interface's layer-3 and link settings are carried as a list of
//! [`NetConfig`] fragments, one per [`NetConfigKind`] (WiFi excepted, which
//! keeps one fragment per [`WifiMode`]).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::validation::{
    Validatable, ValidationResult, validate_ipv4_prefix_len, validate_ipv6_prefix_len,
};

/// Macro for the string-backed enums of the property grammar.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Property-bag representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(Error::Parse(format!(
                        concat!("invalid ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Interface type.
    pub enum InterfaceType {
        Loopback => "LOOPBACK",
        Ethernet => "ETHERNET",
        Wifi => "WIFI",
        Modem => "MODEM",
        Unknown => "UNKNOWN",
    }
}

string_enum! {
    /// WiFi operating mode.
    pub enum WifiMode {
        /// Station associated to an access point.
        Infra => "INFRA",
        /// Access point.
        Master => "MASTER",
        Adhoc => "ADHOC",
        Unknown => "UNKNOWN",
    }
}

string_enum! {
    /// WiFi security scheme.
    pub enum WifiSecurity {
        None => "NONE",
        Wep => "SECURITY_WEP",
        Wpa => "SECURITY_WPA",
        Wpa2 => "SECURITY_WPA2",
        WpaWpa2 => "SECURITY_WPA_WPA2",
    }
}

string_enum! {
    /// PPP authentication type.
    pub enum ModemAuthType {
        None => "NONE",
        Auto => "AUTO",
        Pap => "PAP",
        Chap => "CHAP",
    }
}

string_enum! {
    /// PDP context type.
    pub enum PdpType {
        Ip => "IP",
        Ppp => "PPP",
        Ipv6 => "IPv6",
    }
}

impl WifiMode {
    pub const ALL: [WifiMode; 3] = [WifiMode::Master, WifiMode::Infra, WifiMode::Adhoc];

    /// Lowercase segment used in `config.wifi.<mode>.*` keys.
    pub fn key_segment(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

/// Layer-3 role of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum NetStatus {
    Disabled,
    Unmanaged,
    /// Link up, no addressing.
    L2Only,
    EnabledLan,
    EnabledWan,
    #[default]
    Unknown,
}

impl NetStatus {
    const NAMES: [(NetStatus, &'static str); 6] = [
        (NetStatus::Disabled, "Disabled"),
        (NetStatus::Unmanaged, "Unmanaged"),
        (NetStatus::L2Only, "L2Only"),
        (NetStatus::EnabledLan, "EnabledLAN"),
        (NetStatus::EnabledWan, "EnabledWAN"),
        (NetStatus::Unknown, "Unknown"),
    ];

    fn suffix(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(s, _)| s == self)
            .map(|(_, n)| *n)
            .unwrap_or("Unknown")
    }

    /// `netIPv4Status<...>`
    pub fn as_ip4_str(&self) -> String {
        format!("netIPv4Status{}", self.suffix())
    }

    /// `netIPv6Status<...>`
    pub fn as_ip6_str(&self) -> String {
        format!("netIPv6Status{}", self.suffix())
    }

    /// Parse either the IPv4 or IPv6 spelling.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let suffix = s
            .strip_prefix("netIPv4Status")
            .or_else(|| s.strip_prefix("netIPv6Status"))?;
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == suffix)
            .map(|(status, _)| *status)
    }

    /// LAN or WAN.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::EnabledLan | Self::EnabledWan)
    }
}

/// IPv4 settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Ip4Config {
    pub status: NetStatus,
    /// Address obtained by DHCP client.
    pub dhcp: bool,
    pub address: Option<Ipv4Addr>,
    pub prefix: u8,
    pub gateway: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub domains: Vec<String>,
}

/// IPv6 settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Ip6Config {
    pub status: NetStatus,
    pub dhcp: bool,
    pub address: Option<Ipv6Addr>,
    pub prefix: u8,
    pub dns_servers: Vec<Ipv6Addr>,
}

/// WiFi settings for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiConfig {
    pub mode: WifiMode,
    pub ssid: String,
    pub driver: String,
    pub security: WifiSecurity,
    /// Stored encrypted once persisted.
    pub passphrase: String,
    pub channels: Vec<u32>,
    pub hardware_mode: String,
    pub broadcast: bool,
    pub pairwise_ciphers: String,
    pub group_ciphers: String,
    pub ping_access_point: bool,
}

impl WifiConfig {
    /// Create an open network configuration for `mode`.
    pub fn new(mode: WifiMode, ssid: impl Into<String>) -> Self {
        Self {
            mode,
            ssid: ssid.into(),
            driver: String::new(),
            security: WifiSecurity::None,
            passphrase: String::new(),
            channels: Vec::new(),
            hardware_mode: String::new(),
            broadcast: true,
            pairwise_ciphers: String::new(),
            group_ciphers: String::new(),
            ping_access_point: false,
        }
    }
}

/// Cellular modem PPP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModemConfig {
    pub apn: String,
    pub auth_type: ModemAuthType,
    pub dial_string: String,
    pub username: String,
    pub password: String,
    pub pdp_type: PdpType,
    pub profile_id: i32,
    /// `ppp<N>` unit the link comes up as.
    pub ppp_number: u32,
    pub persist: bool,
    pub max_fail: u32,
    pub idle: u32,
    pub holdoff: u32,
    pub lcp_echo_interval: u32,
    pub lcp_echo_failure: u32,
    pub enabled: bool,
    pub gps_enabled: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            apn: String::new(),
            auth_type: ModemAuthType::None,
            dial_string: String::new(),
            username: String::new(),
            password: String::new(),
            pdp_type: PdpType::Ip,
            profile_id: 0,
            ppp_number: 0,
            persist: true,
            max_fail: 5,
            idle: 95,
            holdoff: 1,
            lcp_echo_interval: 0,
            lcp_echo_failure: 0,
            enabled: false,
            gps_enabled: false,
        }
    }
}

/// DHCPv4 server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DhcpServer4Config {
    pub enabled: bool,
    /// Seconds.
    pub default_lease_time: u32,
    /// Seconds.
    pub max_lease_time: u32,
    pub prefix: u8,
    pub range_start: Option<Ipv4Addr>,
    pub range_end: Option<Ipv4Addr>,
    pub pass_dns: bool,
}

impl Default for DhcpServer4Config {
    fn default() -> Self {
        Self {
            enabled: false,
            default_lease_time: 7200,
            max_lease_time: 7200,
            prefix: 24,
            range_start: None,
            range_end: None,
            pass_dns: false,
        }
    }
}

/// Automatic NAT towards the WAN interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NatAutoConfig {
    pub masquerade: bool,
}

/// Discriminant of a [`NetConfig`] fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NetConfigKind {
    Ip4,
    Ip6,
    Wifi,
    Modem,
    DhcpServer4,
    NatAuto,
}

impl fmt::Display for NetConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Wifi => "wifi",
            Self::Modem => "modem",
            Self::DhcpServer4 => "dhcpServer4",
            Self::NatAuto => "nat",
        })
    }
}

/// One typed piece of an interface's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NetConfig {
    Ip4(Ip4Config),
    Ip6(Ip6Config),
    Wifi(WifiConfig),
    Modem(ModemConfig),
    DhcpServer4(DhcpServer4Config),
    NatAuto(NatAutoConfig),
}

impl NetConfig {
    pub fn kind(&self) -> NetConfigKind {
        match self {
            Self::Ip4(_) => NetConfigKind::Ip4,
            Self::Ip6(_) => NetConfigKind::Ip6,
            Self::Wifi(_) => NetConfigKind::Wifi,
            Self::Modem(_) => NetConfigKind::Modem,
            Self::DhcpServer4(_) => NetConfigKind::DhcpServer4,
            Self::NatAuto(_) => NetConfigKind::NatAuto,
        }
    }
}

impl Validatable for Ip4Config {
    fn validate(&self) -> ValidationResult {
        let mut result = validate_ipv4_prefix_len(self.prefix, "ip4.prefix");

        if self.status.is_enabled() && !self.dhcp {
            if self.address.is_none() {
                result.add_error("ip4.address", "required for static addressing");
            }
            if self.status == NetStatus::EnabledWan && self.gateway.is_none() {
                result.add_warning("ip4.gateway", "static WAN without a gateway");
            }
        }
        if self.status == NetStatus::Unknown {
            result.add_warning("ip4.status", "status is unknown");
        }

        result
    }
}

impl Validatable for Ip6Config {
    fn validate(&self) -> ValidationResult {
        let mut result = validate_ipv6_prefix_len(self.prefix, "ip6.prefix");

        if self.status.is_enabled() && !self.dhcp && self.address.is_none() {
            result.add_error("ip6.address", "required for static addressing");
        }

        result
    }
}

impl Validatable for WifiConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.mode == WifiMode::Unknown {
            result.add_error("wifi.mode", "mode must be INFRA, MASTER or ADHOC");
        }
        if self.ssid.is_empty() {
            result.add_error("wifi.ssid", "SSID cannot be empty");
        } else if self.ssid.len() > 32 {
            result.add_error(
                "wifi.ssid",
                format!("SSID too long ({} > 32 bytes)", self.ssid.len()),
            );
        }
        for channel in &self.channels {
            if !(1..=196).contains(channel) {
                result.add_error("wifi.channel", format!("invalid channel {}", channel));
            }
        }
        match self.security {
            WifiSecurity::None => {}
            WifiSecurity::Wep => {
                if self.passphrase.is_empty() {
                    result.add_error("wifi.passphrase", "WEP requires a key");
                }
            }
            WifiSecurity::Wpa | WifiSecurity::Wpa2 | WifiSecurity::WpaWpa2 => {
                if self.passphrase.len() < 8 {
                    result.add_error("wifi.passphrase", "WPA passphrase must be at least 8 chars");
                }
            }
        }

        result
    }
}

impl Validatable for ModemConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if matches!(self.auth_type, ModemAuthType::Pap | ModemAuthType::Chap)
            && self.username.is_empty()
        {
            result.add_error("modem.username", "authentication requires a username");
        }
        if self.lcp_echo_interval > 0 && self.lcp_echo_failure == 0 {
            result.add_warning(
                "modem.lcpEchoFailure",
                "LCP echo requests are sent but failures never drop the link",
            );
        }
        if self.enabled && self.apn.is_empty() && self.pdp_type != PdpType::Ppp {
            result.add_warning("modem.apn", "no APN configured");
        }

        result
    }
}

impl Validatable for DhcpServer4Config {
    fn validate(&self) -> ValidationResult {
        let mut result = validate_ipv4_prefix_len(self.prefix, "dhcpServer4.prefix");

        if !self.enabled {
            return result;
        }
        match (self.range_start, self.range_end) {
            (Some(start), Some(end)) => {
                if u32::from(start) > u32::from(end) {
                    result.add_error(
                        "dhcpServer4.rangeStart",
                        format!("range start {} is after range end {}", start, end),
                    );
                }
            }
            _ => result.add_error("dhcpServer4.rangeStart", "an address range is required"),
        }
        if self.default_lease_time == 0 {
            result.add_error("dhcpServer4.defaultLeaseTime", "lease time must be positive");
        }
        if self.default_lease_time > self.max_lease_time {
            result.add_error(
                "dhcpServer4.maxLeaseTime",
                "max lease time is shorter than the default lease time",
            );
        }

        result
    }
}

impl Validatable for NetConfig {
    fn validate(&self) -> ValidationResult {
        match self {
            Self::Ip4(c) => c.validate(),
            Self::Ip6(c) => c.validate(),
            Self::Wifi(c) => c.validate(),
            Self::Modem(c) => c.validate(),
            Self::DhcpServer4(c) => c.validate(),
            Self::NatAuto(_) => ValidationResult::new(),
        }
    }
}
