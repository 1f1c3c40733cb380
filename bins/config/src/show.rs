//! Show command - print the typed model of a properties file.

use std::path::PathBuf;

use clap::Args;
use netadmin::model::{NetConfig, NetInterfaceConfig};
use netadmin::{NetworkConfiguration, Result};

use crate::{OutputFormat, load};

#[derive(Args)]
pub struct ShowArgs {
    /// Properties file (JSON or YAML)
    pub file: PathBuf,

    /// Print the model as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ShowArgs) -> Result<()> {
    let props = load::properties(&args.file)?;
    let config = NetworkConfiguration::from_properties(&props, &[]);

    if args.json {
        return load::print(&config, OutputFormat::Json);
    }
    for iface in config.interfaces() {
        print_interface(iface);
    }
    if !config.modified_interface_names().is_empty() {
        println!("modified: {}", config.modified_interface_names().join(","));
    }
    Ok(())
}

fn print_interface(iface: &NetInterfaceConfig) {
    println!(
        "{}: {} mtu {}{}",
        iface.name,
        iface.kind,
        iface.mtu,
        if iface.auto_connect { " autoconnect" } else { "" }
    );
    if let Some(usb) = &iface.usb {
        println!("    usb {} ({}:{})", usb.port_name(), usb.vendor_id, usb.product_id);
    }
    for address in &iface.addresses {
        if let Some(mode) = address.wifi_mode {
            println!("    wifi mode {}", mode);
        }
        for config in &address.configs {
            println!("    {}", describe(config));
        }
    }
}

fn describe(config: &NetConfig) -> String {
    match config {
        NetConfig::Ip4(ip4) => {
            let addressing = match (ip4.dhcp, ip4.address) {
                (true, _) => "dhcp".to_string(),
                (false, Some(addr)) => format!("{}/{}", addr, ip4.prefix),
                (false, None) => "no address".to_string(),
            };
            format!("ip4 {} {}", ip4.status.as_ip4_str(), addressing)
        }
        NetConfig::Ip6(ip6) => format!("ip6 {}", ip6.status.as_ip6_str()),
        NetConfig::Wifi(w) => format!("wifi {} ssid '{}' {}", w.mode, w.ssid, w.security),
        NetConfig::Modem(m) => format!("modem apn '{}' ppp{}", m.apn, m.ppp_number),
        NetConfig::DhcpServer4(d) => match (d.range_start, d.range_end) {
            (Some(start), Some(end)) => {
                format!("dhcpServer4 enabled={} range {}-{}", d.enabled, start, end)
            }
            _ => format!("dhcpServer4 enabled={}", d.enabled),
        },
        NetConfig::NatAuto(n) => format!("nat masquerade={}", n.masquerade),
    }
}
