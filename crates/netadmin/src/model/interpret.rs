//! Conversion between the property bag and the typed model.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::types::*;
use super::{NetInterfaceAddressConfig, NetInterfaceConfig, UsbDevice};
use crate::error::{Error, Result};
use crate::properties::keys::{self, field, wifi};
use crate::properties::{PropertyStore, split_list};
use crate::services::LiveInterface;

/// Typed reads of one interface's keys.
struct Reader<'a> {
    props: &'a PropertyStore,
    name: &'a str,
}

impl Reader<'_> {
    fn config_key(&self, f: &str) -> String {
        keys::config_key(self.name, f)
    }

    fn has_config(&self, f: &str) -> bool {
        self.props.contains_key(&self.config_key(f))
    }

    fn has_config_prefix(&self, prefix: &str) -> bool {
        let prefix = self.config_key(prefix);
        self.props.with_prefix(&prefix).next().is_some()
    }

    fn string(&self, key: &str) -> String {
        self.props.get_string(key).unwrap_or_default()
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.props.get_bool(key).unwrap_or(default)
    }

    fn int<T: TryFrom<i64>>(&self, key: &str, default: T) -> Result<T> {
        match self.props.get_int(key) {
            Some(v) => T::try_from(v).map_err(|_| {
                Error::Internal(format!("{} out of range for {}: {}", key, self.name, v))
            }),
            None if self.props.get_string(key).is_some_and(|s| !s.trim().is_empty()) => Err(
                Error::Internal(format!("{} is not a number for {}", key, self.name)),
            ),
            None => Ok(default),
        }
    }

    /// Parse an optional value; blank means absent.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.props.get_string(key) {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| Error::Internal(format!("invalid {} for {}: {}", key, self.name, e))),
            _ => Ok(None),
        }
    }

    fn list<T>(&self, key: &str) -> Result<Vec<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        split_list(&self.string(key))
            .iter()
            .map(|s| {
                s.parse().map_err(|e| {
                    Error::Internal(format!("invalid {} for {}: {}", key, self.name, e))
                })
            })
            .collect()
    }

    fn status(&self, key: &str) -> Result<NetStatus> {
        match self.props.get_string(key) {
            None => Ok(NetStatus::Unknown),
            Some(raw) => NetStatus::parse(&raw).ok_or_else(|| {
                Error::Internal(format!("invalid {} for {}: {}", key, self.name, raw))
            }),
        }
    }

    fn ip4(&self) -> Result<Ip4Config> {
        Ok(Ip4Config {
            status: self.status(&self.config_key(field::IP4_STATUS))?,
            dhcp: self.bool(&self.config_key(field::DHCP_CLIENT4), false),
            address: self.parsed::<Ipv4Addr>(&self.config_key(field::IP4_ADDRESS))?,
            prefix: self.int(&self.config_key(field::IP4_PREFIX), 0)?,
            gateway: self.parsed::<Ipv4Addr>(&self.config_key(field::IP4_GATEWAY))?,
            dns_servers: self.list(&self.config_key(field::IP4_DNS))?,
            domains: self.list(&self.config_key(field::IP4_DOMAINS))?,
        })
    }

    fn ip6(&self) -> Result<Ip6Config> {
        Ok(Ip6Config {
            status: self.status(&self.config_key(field::IP6_STATUS))?,
            dhcp: self.bool(&self.config_key(field::DHCP_CLIENT6), false),
            address: self.parsed::<Ipv6Addr>(&self.config_key(field::IP6_ADDRESS))?,
            prefix: self.int(&self.config_key(field::IP6_PREFIX), 0)?,
            dns_servers: self.list(&self.config_key(field::IP6_DNS))?,
        })
    }

    fn dhcp_server4(&self) -> Result<DhcpServer4Config> {
        let defaults = DhcpServer4Config::default();
        Ok(DhcpServer4Config {
            enabled: self.bool(&self.config_key(field::DHCP_SERVER4_ENABLED), false),
            default_lease_time: self.int(
                &self.config_key(field::DHCP_SERVER4_DEFAULT_LEASE),
                defaults.default_lease_time,
            )?,
            max_lease_time: self.int(
                &self.config_key(field::DHCP_SERVER4_MAX_LEASE),
                defaults.max_lease_time,
            )?,
            prefix: self.int(&self.config_key(field::DHCP_SERVER4_PREFIX), defaults.prefix)?,
            range_start: self.parsed(&self.config_key(field::DHCP_SERVER4_RANGE_START))?,
            range_end: self.parsed(&self.config_key(field::DHCP_SERVER4_RANGE_END))?,
            pass_dns: self.bool(&self.config_key(field::DHCP_SERVER4_PASS_DNS), false),
        })
    }

    fn wifi(&self, mode: WifiMode) -> Result<Option<WifiConfig>> {
        let segment = mode.key_segment();
        let key = |f: &str| keys::wifi_key(self.name, &segment, f);
        if !self.has_config_prefix(&format!("wifi.{}.", segment)) {
            return Ok(None);
        }

        let channels = self
            .string(&key(wifi::CHANNEL))
            .split_whitespace()
            .map(|c| {
                c.parse::<u32>().map_err(|e| {
                    Error::Internal(format!("invalid wifi channel for {}: {}", self.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(WifiConfig {
            mode,
            ssid: self.string(&key(wifi::SSID)),
            driver: self.string(&key(wifi::DRIVER)),
            security: self
                .parsed(&key(wifi::SECURITY_TYPE))?
                .unwrap_or(WifiSecurity::None),
            passphrase: self.string(&key(wifi::PASSPHRASE)),
            channels,
            hardware_mode: self.string(&key(wifi::HARDWARE_MODE)),
            broadcast: self.bool(&key(wifi::BROADCAST), true),
            pairwise_ciphers: self.string(&key(wifi::PAIRWISE_CIPHERS)),
            group_ciphers: self.string(&key(wifi::GROUP_CIPHERS)),
            ping_access_point: self.bool(&key(wifi::PING_ACCESS_POINT), false),
        }))
    }

    fn modem(&self) -> Result<ModemConfig> {
        let d = ModemConfig::default();
        let k = |f: &str| self.config_key(f);
        Ok(ModemConfig {
            apn: self.string(&k(field::MODEM_APN)),
            auth_type: self
                .parsed(&k(field::MODEM_AUTH_TYPE))?
                .unwrap_or(d.auth_type),
            dial_string: self.string(&k(field::MODEM_DIAL_STRING)),
            username: self.string(&k(field::MODEM_USERNAME)),
            password: self.string(&k(field::MODEM_PASSWORD)),
            pdp_type: self.parsed(&k(field::MODEM_PDP_TYPE))?.unwrap_or(d.pdp_type),
            profile_id: self.int(&k(field::MODEM_PROFILE_ID), d.profile_id)?,
            ppp_number: self.int(&k(field::PPP_NUM), d.ppp_number)?,
            persist: self.bool(&k(field::MODEM_PERSIST), d.persist),
            max_fail: self.int(&k(field::MODEM_MAX_FAIL), d.max_fail)?,
            idle: self.int(&k(field::MODEM_IDLE), d.idle)?,
            holdoff: self.int(&k(field::MODEM_HOLDOFF), d.holdoff)?,
            lcp_echo_interval: self.int(&k(field::MODEM_LCP_ECHO_INTERVAL), d.lcp_echo_interval)?,
            lcp_echo_failure: self.int(&k(field::MODEM_LCP_ECHO_FAILURE), d.lcp_echo_failure)?,
            enabled: self.bool(&k(field::MODEM_ENABLED), d.enabled),
            gps_enabled: self.bool(&k(field::MODEM_GPS_ENABLED), d.gps_enabled),
        })
    }

    fn usb(&self) -> Option<UsbDevice> {
        let key = |f: &str| keys::interface_key(self.name, f);
        if !self.props.contains_key(&key(field::USB_BUS_NUMBER))
            && !self.props.contains_key(&key(field::USB_VENDOR_ID))
        {
            return None;
        }
        Some(UsbDevice {
            vendor_id: self.string(&key(field::USB_VENDOR_ID)),
            vendor_name: self.string(&key(field::USB_VENDOR_NAME)),
            product_id: self.string(&key(field::USB_PRODUCT_ID)),
            product_name: self.string(&key(field::USB_PRODUCT_NAME)),
            bus_number: self.string(&key(field::USB_BUS_NUMBER)),
            device_path: self.string(&key(field::USB_DEVICE_PATH)),
        })
    }
}

/// Build one interface from the property bag.
///
/// Returns `Ok(None)` for UNKNOWN-typed interfaces.
pub fn interface_from_properties(
    props: &PropertyStore,
    name: &str,
    live: Option<&LiveInterface>,
) -> Result<Option<NetInterfaceConfig>> {
    let r = Reader { props, name };

    let kind: InterfaceType = match props.get_string(&keys::type_key(name)) {
        Some(raw) => raw.parse()?,
        None => live.map(|l| l.kind).ok_or_else(|| {
            Error::Internal(format!("no type recorded for interface {}", name))
        })?,
    };
    if kind == InterfaceType::Unknown {
        return Ok(None);
    }

    let mut address = NetInterfaceAddressConfig::default();
    if r.has_config_prefix("ip4.") || r.has_config(field::DHCP_CLIENT4) {
        address.configs.push(NetConfig::Ip4(r.ip4()?));
    }
    if r.has_config_prefix("ip6.") || r.has_config(field::DHCP_CLIENT6) {
        address.configs.push(NetConfig::Ip6(r.ip6()?));
    }

    match kind {
        InterfaceType::Ethernet | InterfaceType::Wifi => {
            if r.has_config(field::DHCP_SERVER4_ENABLED) {
                address
                    .configs
                    .push(NetConfig::DhcpServer4(r.dhcp_server4()?));
            }
        }
        InterfaceType::Modem => {
            if r.has_config(field::MODEM_APN) || r.has_config(field::PPP_NUM) {
                address.configs.push(NetConfig::Modem(r.modem()?));
            }
        }
        _ => {}
    }

    if kind == InterfaceType::Wifi {
        address.wifi_mode = r.parsed(&r.config_key(field::WIFI_MODE))?;
        for mode in WifiMode::ALL {
            if let Some(w) = r.wifi(mode)? {
                address.configs.push(NetConfig::Wifi(w));
            }
        }
    }

    if matches!(
        kind,
        InterfaceType::Ethernet | InterfaceType::Wifi | InterfaceType::Modem
    ) && r.has_config(field::NAT_ENABLED)
    {
        address.configs.push(NetConfig::NatAuto(NatAutoConfig {
            masquerade: r.bool(&r.config_key(field::NAT_ENABLED), false),
        }));
    }

    let modem_id = props
        .get_string(&keys::interface_key(name, field::MODEM_ID))
        .filter(|s| !s.is_empty());

    Ok(Some(NetInterfaceConfig {
        name: name.to_string(),
        kind,
        mtu: r.int(&r.config_key(field::MTU), 1500)?,
        auto_connect: r.bool(&r.config_key(field::AUTOCONNECT), false),
        is_virtual: live.is_some_and(|l| l.is_virtual),
        usb: r.usb().or_else(|| live.and_then(|l| l.usb.clone())),
        modem_id,
        addresses: vec![address],
    }))
}

fn join<T: ToString>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Write one interface's keys into `props`.
///
/// Absent optional values are not written, so reading the result back yields
/// an equal [`NetInterfaceConfig`].
pub fn interface_to_properties(iface: &NetInterfaceConfig, props: &mut PropertyStore) {
    let name = iface.name.as_str();
    let ck = |f: &str| keys::config_key(name, f);

    props.insert(keys::type_key(name), iface.kind.as_str());
    props.insert(ck(field::MTU), iface.mtu);
    props.insert(ck(field::AUTOCONNECT), iface.auto_connect);

    if let Some(usb) = &iface.usb {
        let ik = |f: &str| keys::interface_key(name, f);
        props.insert(ik(field::USB_VENDOR_ID), usb.vendor_id.as_str());
        props.insert(ik(field::USB_VENDOR_NAME), usb.vendor_name.as_str());
        props.insert(ik(field::USB_PRODUCT_ID), usb.product_id.as_str());
        props.insert(ik(field::USB_PRODUCT_NAME), usb.product_name.as_str());
        props.insert(ik(field::USB_BUS_NUMBER), usb.bus_number.as_str());
        props.insert(ik(field::USB_DEVICE_PATH), usb.device_path.as_str());
    }
    if let Some(id) = &iface.modem_id {
        props.insert(keys::interface_key(name, field::MODEM_ID), id.as_str());
    }

    for address in &iface.addresses {
        if let Some(mode) = address.wifi_mode {
            props.insert(ck(field::WIFI_MODE), mode.as_str());
        }
        for config in &address.configs {
            write_fragment(name, config, props);
        }
    }
}

fn write_fragment(name: &str, config: &NetConfig, props: &mut PropertyStore) {
    let ck = |f: &str| keys::config_key(name, f);

    match config {
        NetConfig::Ip4(ip4) => {
            props.insert(ck(field::IP4_STATUS), ip4.status.as_ip4_str());
            props.insert(ck(field::DHCP_CLIENT4), ip4.dhcp);
            props.insert(ck(field::IP4_PREFIX), ip4.prefix);
            if let Some(addr) = ip4.address {
                props.insert(ck(field::IP4_ADDRESS), addr.to_string());
            }
            if let Some(gw) = ip4.gateway {
                props.insert(ck(field::IP4_GATEWAY), gw.to_string());
            }
            if !ip4.dns_servers.is_empty() {
                props.insert(ck(field::IP4_DNS), join(&ip4.dns_servers, ","));
            }
            if !ip4.domains.is_empty() {
                props.insert(ck(field::IP4_DOMAINS), join(&ip4.domains, ","));
            }
        }
        NetConfig::Ip6(ip6) => {
            props.insert(ck(field::IP6_STATUS), ip6.status.as_ip6_str());
            props.insert(ck(field::DHCP_CLIENT6), ip6.dhcp);
            props.insert(ck(field::IP6_PREFIX), ip6.prefix);
            if let Some(addr) = ip6.address {
                props.insert(ck(field::IP6_ADDRESS), addr.to_string());
            }
            if !ip6.dns_servers.is_empty() {
                props.insert(ck(field::IP6_DNS), join(&ip6.dns_servers, ","));
            }
        }
        NetConfig::Wifi(w) => {
            let segment = w.mode.key_segment();
            let wk = |f: &str| keys::wifi_key(name, &segment, f);
            props.insert(wk(wifi::MODE), w.mode.as_str());
            props.insert(wk(wifi::SSID), w.ssid.as_str());
            props.insert(wk(wifi::DRIVER), w.driver.as_str());
            props.insert(wk(wifi::SECURITY_TYPE), w.security.as_str());
            props.insert(wk(wifi::PASSPHRASE), w.passphrase.as_str());
            props.insert(wk(wifi::CHANNEL), join(&w.channels, " "));
            props.insert(wk(wifi::HARDWARE_MODE), w.hardware_mode.as_str());
            props.insert(wk(wifi::BROADCAST), w.broadcast);
            props.insert(wk(wifi::PAIRWISE_CIPHERS), w.pairwise_ciphers.as_str());
            props.insert(wk(wifi::GROUP_CIPHERS), w.group_ciphers.as_str());
            props.insert(wk(wifi::PING_ACCESS_POINT), w.ping_access_point);
        }
        NetConfig::Modem(m) => {
            props.insert(ck(field::MODEM_APN), m.apn.as_str());
            props.insert(ck(field::MODEM_AUTH_TYPE), m.auth_type.as_str());
            props.insert(ck(field::MODEM_DIAL_STRING), m.dial_string.as_str());
            props.insert(ck(field::MODEM_USERNAME), m.username.as_str());
            props.insert(ck(field::MODEM_PASSWORD), m.password.as_str());
            props.insert(ck(field::MODEM_PDP_TYPE), m.pdp_type.as_str());
            props.insert(ck(field::MODEM_PROFILE_ID), m.profile_id);
            props.insert(ck(field::PPP_NUM), m.ppp_number);
            props.insert(ck(field::MODEM_PERSIST), m.persist);
            props.insert(ck(field::MODEM_MAX_FAIL), m.max_fail);
            props.insert(ck(field::MODEM_IDLE), m.idle);
            props.insert(ck(field::MODEM_HOLDOFF), m.holdoff);
            props.insert(ck(field::MODEM_LCP_ECHO_INTERVAL), m.lcp_echo_interval);
            props.insert(ck(field::MODEM_LCP_ECHO_FAILURE), m.lcp_echo_failure);
            props.insert(ck(field::MODEM_ENABLED), m.enabled);
            props.insert(ck(field::MODEM_GPS_ENABLED), m.gps_enabled);
        }
        NetConfig::DhcpServer4(d) => {
            props.insert(ck(field::DHCP_SERVER4_ENABLED), d.enabled);
            props.insert(ck(field::DHCP_SERVER4_DEFAULT_LEASE), d.default_lease_time);
            props.insert(ck(field::DHCP_SERVER4_MAX_LEASE), d.max_lease_time);
            props.insert(ck(field::DHCP_SERVER4_PREFIX), d.prefix);
            if let Some(start) = d.range_start {
                props.insert(ck(field::DHCP_SERVER4_RANGE_START), start.to_string());
            }
            if let Some(end) = d.range_end {
                props.insert(ck(field::DHCP_SERVER4_RANGE_END), end.to_string());
            }
            props.insert(ck(field::DHCP_SERVER4_PASS_DNS), d.pass_dns);
        }
        NetConfig::NatAuto(n) => {
            props.insert(ck(field::NAT_ENABLED), n.masquerade);
        }
    }
}
