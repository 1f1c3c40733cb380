//! Key grammar of the network property bag.
//!
//! Keys are byte-for-byte compatible with existing configuration snapshots:
//!
//! ```text
//! net.interfaces = <comma-separated interface names>
//! net.interface.<name>.type = LOOPBACK|ETHERNET|WIFI|MODEM|UNKNOWN
//! net.interface.<name>.config.<field>
//! net.interface.<name>.usb.<field>
//! modified.interface.names = <comma-separated>
//! ```

/// Comma-joined list of configured interface names.
pub const INTERFACES: &str = "net.interfaces";

/// Transient list of interfaces touched by the last submission.
pub const MODIFIED_INTERFACE_NAMES: &str = "modified.interface.names";

/// Prefix shared by all per-interface keys.
pub const INTERFACE_PREFIX: &str = "net.interface.";

/// `net.interface.<name>.`
pub fn interface_prefix(name: &str) -> String {
    format!("{INTERFACE_PREFIX}{name}.")
}

/// `net.interface.<name>.<field>`
pub fn interface_key(name: &str, field: &str) -> String {
    format!("{INTERFACE_PREFIX}{name}.{field}")
}

/// `net.interface.<name>.config.<field>`
pub fn config_key(name: &str, field: &str) -> String {
    format!("{INTERFACE_PREFIX}{name}.config.{field}")
}

/// `net.interface.<name>.type`
pub fn type_key(name: &str) -> String {
    interface_key(name, "type")
}

/// `net.interface.<name>.config.ip4.status`
pub fn ip4_status_key(name: &str) -> String {
    config_key(name, "ip4.status")
}

/// Interface-level fields.
pub mod field {
    pub const TYPE: &str = "type";
    pub const MTU: &str = "mtu";
    pub const AUTOCONNECT: &str = "autoconnect";
    pub const PPP_NUM: &str = "pppNum";
    pub const MODEM_ID: &str = "modem.identifier";

    pub const USB_VENDOR_ID: &str = "usb.vendor.id";
    pub const USB_VENDOR_NAME: &str = "usb.vendor.name";
    pub const USB_PRODUCT_ID: &str = "usb.product.id";
    pub const USB_PRODUCT_NAME: &str = "usb.product.name";
    pub const USB_BUS_NUMBER: &str = "usb.busNumber";
    pub const USB_DEVICE_PATH: &str = "usb.devicePath";

    pub const IP4_STATUS: &str = "ip4.status";
    pub const IP4_ADDRESS: &str = "ip4.address";
    pub const IP4_PREFIX: &str = "ip4.prefix";
    pub const IP4_GATEWAY: &str = "ip4.gateway";
    pub const IP4_DNS: &str = "ip4.dnsServers";
    pub const IP4_DOMAINS: &str = "ip4.domains";
    pub const DHCP_CLIENT4: &str = "dhcpClient4.enabled";

    pub const IP6_STATUS: &str = "ip6.status";
    pub const IP6_ADDRESS: &str = "ip6.address";
    pub const IP6_PREFIX: &str = "ip6.prefix";
    pub const IP6_DNS: &str = "ip6.dnsServers";
    pub const DHCP_CLIENT6: &str = "dhcpClient6.enabled";

    pub const DHCP_SERVER4_ENABLED: &str = "dhcpServer4.enabled";
    pub const DHCP_SERVER4_DEFAULT_LEASE: &str = "dhcpServer4.defaultLeaseTime";
    pub const DHCP_SERVER4_MAX_LEASE: &str = "dhcpServer4.maxLeaseTime";
    pub const DHCP_SERVER4_PREFIX: &str = "dhcpServer4.prefix";
    pub const DHCP_SERVER4_RANGE_START: &str = "dhcpServer4.rangeStart";
    pub const DHCP_SERVER4_RANGE_END: &str = "dhcpServer4.rangeEnd";
    pub const DHCP_SERVER4_PASS_DNS: &str = "dhcpServer4.passDns";

    pub const NAT_ENABLED: &str = "nat.enabled";

    pub const WIFI_MODE: &str = "wifi.mode";

    pub const MODEM_APN: &str = "apn";
    pub const MODEM_AUTH_TYPE: &str = "authType";
    pub const MODEM_DIAL_STRING: &str = "dialString";
    pub const MODEM_USERNAME: &str = "username";
    pub const MODEM_PASSWORD: &str = "password";
    pub const MODEM_PDP_TYPE: &str = "pdpType";
    pub const MODEM_PROFILE_ID: &str = "profileId";
    pub const MODEM_PERSIST: &str = "persist";
    pub const MODEM_MAX_FAIL: &str = "maxFail";
    pub const MODEM_IDLE: &str = "idle";
    pub const MODEM_HOLDOFF: &str = "holdoff";
    pub const MODEM_LCP_ECHO_INTERVAL: &str = "lcpEchoInterval";
    pub const MODEM_LCP_ECHO_FAILURE: &str = "lcpEchoFailure";
    pub const MODEM_ENABLED: &str = "enabled";
    pub const MODEM_GPS_ENABLED: &str = "gpsEnabled";
}

/// `net.interface.<name>.config.wifi.<mode>.<field>`, mode in lowercase.
pub fn wifi_key(name: &str, mode: &str, field: &str) -> String {
    config_key(name, &format!("wifi.{}.{}", mode.to_ascii_lowercase(), field))
}

/// Per-mode WiFi fields.
pub mod wifi {
    pub const SSID: &str = "ssid";
    pub const DRIVER: &str = "driver";
    pub const MODE: &str = "mode";
    pub const SECURITY_TYPE: &str = "securityType";
    pub const CHANNEL: &str = "channel";
    pub const PASSPHRASE: &str = "passphrase";
    pub const HARDWARE_MODE: &str = "hardwareMode";
    pub const BROADCAST: &str = "broadcast";
    pub const PAIRWISE_CIPHERS: &str = "pairwiseCiphers";
    pub const GROUP_CIPHERS: &str = "groupCiphers";
    pub const PING_ACCESS_POINT: &str = "pingAccessPoint";
}

/// Extract the interface name from a per-interface key.
///
/// Interface names may themselves contain dots (`1-1.2`), so the name is
/// matched against the known list rather than split on the first dot.
pub fn interface_of<'a>(key: &str, names: &'a [String]) -> Option<&'a str> {
    let rest = key.strip_prefix(INTERFACE_PREFIX)?;
    names
        .iter()
        .filter(|n| {
            rest.strip_prefix(n.as_str())
                .is_some_and(|tail| tail.starts_with('.'))
        })
        .max_by_key(|n| n.len())
        .map(String::as_str)
}
