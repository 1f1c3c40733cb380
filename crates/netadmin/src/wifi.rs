//! `hostapd` and `wpa_supplicant` configuration rendering.
//!
//! A WiFi interface whose selected mode is MASTER gets a `hostapd` file, one
//! in INFRA or ADHOC mode gets a `wpa_supplicant` file. Both land at
//! [`LifecycleOptions::conf_file`], where the lifecycle controller starts the
//! daemons from. Passphrases are stored encrypted and decrypted only into the
//! rendered file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lifecycle::LifecycleOptions;
use crate::model::{
    InterfaceType, NetInterfaceConfig, NetworkConfiguration, WifiConfig, WifiMode, WifiSecurity,
};
use crate::services::CryptoService;
use crate::util::ifname::is_ignored_wifi;

/// Radio settings derived from the configured hardware mode.
struct Radio {
    hw_mode: &'static str,
    ieee80211n: bool,
    ht_capab: Option<&'static str>,
}

fn radio(hardware_mode: &str) -> Radio {
    let legacy = |hw_mode: &'static str| Radio {
        hw_mode,
        ieee80211n: false,
        ht_capab: None,
    };
    let n = |ht_capab: &'static str| Radio {
        hw_mode: "g",
        ieee80211n: true,
        ht_capab: Some(ht_capab),
    };
    match hardware_mode.trim_start_matches("RADIO_MODE_") {
        "80211a" | "a" => legacy("a"),
        "80211b" | "b" => legacy("b"),
        "80211nHT20" => n("[SHORT-GI-20]"),
        "80211nHT40above" => n("[HT40+][SHORT-GI-20][SHORT-GI-40]"),
        "80211nHT40below" => n("[HT40-][SHORT-GI-20][SHORT-GI-40]"),
        _ => legacy("g"),
    }
}

/// `CCMP_TKIP` style cipher lists become `CCMP TKIP`.
fn ciphers(configured: &str) -> String {
    if configured.is_empty() {
        "CCMP TKIP".to_string()
    } else {
        configured.replace(['_', ','], " ")
    }
}

fn channel(wifi: &WifiConfig, radio: &Radio) -> Result<u32> {
    let channel = wifi.channels.first().copied().unwrap_or(1);
    if radio.hw_mode != "a" && !(1..=13).contains(&channel) {
        return Err(Error::Configuration(format!("channel {} is outside 1-13", channel)));
    }
    Ok(channel)
}

/// Center frequency in MHz of a 2.4 GHz channel.
fn frequency(channel: u32) -> u32 {
    match channel {
        14 => 2484,
        c if c < 14 => 2407 + 5 * c,
        c => 5000 + 5 * c,
    }
}

fn decrypt(wifi: &WifiConfig, crypto: &dyn CryptoService) -> Result<String> {
    if wifi.passphrase.is_empty() {
        return Ok(String::new());
    }
    crypto
        .decrypt(&wifi.passphrase)
        .map_err(|e| e.with_context(format!("decrypting {} passphrase", wifi.mode.as_str())))
}

fn driver<'a>(wifi: &'a WifiConfig, options: &'a LifecycleOptions) -> &'a str {
    if wifi.driver.is_empty() {
        &options.default_driver
    } else {
        &wifi.driver
    }
}

/// Render the `hostapd` configuration of an access point.
pub fn render_hostapd(
    name: &str,
    wifi: &WifiConfig,
    passphrase: &str,
    options: &LifecycleOptions,
) -> Result<String> {
    if wifi.ssid.is_empty() {
        return Err(Error::RequiredAttributeMissing(format!("SSID of {}", name)));
    }
    let radio = radio(&wifi.hardware_mode);
    let channel = channel(wifi, &radio)?;

    let mut out = String::new();
    // writing to a String cannot fail
    let _ = writeln!(out, "interface={}", name);
    let _ = writeln!(out, "driver={}", driver(wifi, options));
    let _ = writeln!(out, "ssid={}", wifi.ssid);
    let _ = writeln!(out, "hw_mode={}", radio.hw_mode);
    let _ = writeln!(out, "wme_enabled={}", u8::from(radio.ieee80211n));
    let _ = writeln!(out, "ieee80211n={}", u8::from(radio.ieee80211n));
    if let Some(ht_capab) = radio.ht_capab {
        let _ = writeln!(out, "ht_capab={}", ht_capab);
    }
    let _ = writeln!(out, "channel={}", channel);
    let _ = writeln!(out, "ignore_broadcast_ssid={}", if wifi.broadcast { 0 } else { 2 });

    match wifi.security {
        WifiSecurity::None => {}
        WifiSecurity::Wep => {
            let _ = writeln!(out, "wep_default_key=0");
            let _ = writeln!(out, "wep_key0={}", passphrase);
        }
        WifiSecurity::Wpa | WifiSecurity::Wpa2 | WifiSecurity::WpaWpa2 => {
            if passphrase.is_empty() {
                return Err(Error::RequiredAttributeMissing(format!(
                    "passphrase of {}",
                    name
                )));
            }
            let wpa = match wifi.security {
                WifiSecurity::Wpa => 1,
                WifiSecurity::Wpa2 => 2,
                _ => 3,
            };
            let _ = writeln!(out, "wpa={}", wpa);
            let _ = writeln!(out, "wpa_passphrase={}", passphrase);
            let _ = writeln!(out, "wpa_key_mgmt=WPA-PSK");
            let _ = writeln!(out, "wpa_pairwise={}", ciphers(&wifi.pairwise_ciphers));
            let _ = writeln!(out, "rsn_pairwise=CCMP");
        }
    }
    Ok(out)
}

/// Render the `wpa_supplicant` configuration of a station or ad-hoc node.
pub fn render_wpa_supplicant(
    name: &str,
    wifi: &WifiConfig,
    passphrase: &str,
    options: &LifecycleOptions,
) -> Result<String> {
    if wifi.ssid.is_empty() {
        return Err(Error::RequiredAttributeMissing(format!("SSID of {}", name)));
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "ctrl_interface={}",
        options.run_dir.join("wpa_supplicant").display()
    );
    let _ = writeln!(out, "network={{");
    let _ = writeln!(out, "    mode={}", u8::from(wifi.mode == WifiMode::Adhoc));
    let _ = writeln!(out, "    ssid=\"{}\"", wifi.ssid);
    let _ = writeln!(out, "    scan_ssid=1");
    if wifi.mode == WifiMode::Adhoc {
        let radio = radio(&wifi.hardware_mode);
        let _ = writeln!(out, "    frequency={}", frequency(channel(wifi, &radio)?));
    }

    match wifi.security {
        WifiSecurity::None => {
            let _ = writeln!(out, "    key_mgmt=NONE");
        }
        WifiSecurity::Wep => {
            let _ = writeln!(out, "    key_mgmt=NONE");
            let _ = writeln!(out, "    wep_key0={}", passphrase);
            let _ = writeln!(out, "    wep_tx_keyidx=0");
        }
        WifiSecurity::Wpa | WifiSecurity::Wpa2 | WifiSecurity::WpaWpa2 => {
            if passphrase.is_empty() {
                return Err(Error::RequiredAttributeMissing(format!(
                    "passphrase of {}",
                    name
                )));
            }
            let proto = match wifi.security {
                WifiSecurity::Wpa => "WPA",
                WifiSecurity::Wpa2 => "RSN",
                _ => "WPA RSN",
            };
            let _ = writeln!(out, "    key_mgmt=WPA-PSK");
            let _ = writeln!(out, "    psk=\"{}\"", passphrase);
            let _ = writeln!(out, "    proto={}", proto);
            let _ = writeln!(out, "    pairwise={}", ciphers(&wifi.pairwise_ciphers));
            let _ = writeln!(out, "    group={}", ciphers(&wifi.group_ciphers));
        }
    }
    let _ = writeln!(out, "}}");
    Ok(out)
}

/// Render the daemon configuration of `iface` for its selected mode.
///
/// Returns the daemon name and file contents, or `Ok(None)` when the
/// interface runs no WiFi daemon.
pub fn render(
    iface: &NetInterfaceConfig,
    options: &LifecycleOptions,
    crypto: &dyn CryptoService,
) -> Result<Option<(&'static str, String)>> {
    if iface.kind != InterfaceType::Wifi || is_ignored_wifi(&iface.name) {
        return Ok(None);
    }
    let Some(wifi) = iface.primary().and_then(|a| a.active_wifi()) else {
        return Ok(None);
    };

    let passphrase = decrypt(wifi, crypto)?;
    let rendered = match wifi.mode {
        WifiMode::Master => (
            "hostapd",
            render_hostapd(&iface.name, wifi, &passphrase, options)?,
        ),
        WifiMode::Infra | WifiMode::Adhoc => (
            "wpa_supplicant",
            render_wpa_supplicant(&iface.name, wifi, &passphrase, options)?,
        ),
        WifiMode::Unknown => return Ok(None),
    };
    Ok(Some(rendered))
}

/// Write the daemon configuration of every WiFi interface in `config`.
///
/// Best effort: an interface whose configuration cannot be rendered or
/// written is logged and skipped. Returns the files written.
pub async fn write_configs(
    config: &NetworkConfiguration,
    options: &LifecycleOptions,
    crypto: &dyn CryptoService,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for iface in config.interfaces() {
        let (daemon, contents) = match render(iface, options, crypto) {
            Ok(Some(rendered)) => rendered,
            Ok(None) => continue,
            Err(e) => {
                warn!(interface = %iface.name, error = %e, "cannot render WiFi configuration");
                continue;
            }
        };

        let path = options.conf_file(daemon, &iface.name);
        match write_file(&path, &contents).await {
            Ok(()) => {
                debug!(
                    interface = %iface.name,
                    daemon,
                    path = %path.display(),
                    "WiFi configuration written"
                );
                written.push(path);
            }
            Err(e) => {
                warn!(interface = %iface.name, error = %e, "cannot write WiFi configuration")
            }
        }
    }
    written
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::from(e).with_context(format!("writing {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ip4Config, NetConfig, NetStatus};
    use crate::testing::ReversibleCrypto;
    use pretty_assertions::assert_eq;

    fn access_point() -> WifiConfig {
        let mut wifi = WifiConfig::new(WifiMode::Master, "gateway-ap");
        wifi.security = WifiSecurity::Wpa2;
        wifi.passphrase = "enc:terces-pa".to_string();
        wifi.channels = vec![6];
        wifi.hardware_mode = "RADIO_MODE_80211nHT20".to_string();
        wifi
    }

    fn wlan0(wifi: WifiConfig) -> NetInterfaceConfig {
        let mode = wifi.mode;
        let mut iface = NetInterfaceConfig::new("wlan0", InterfaceType::Wifi)
            .with_config(NetConfig::Ip4(Ip4Config {
                status: NetStatus::EnabledLan,
                ..Default::default()
            }))
            .with_config(NetConfig::Wifi(wifi));
        iface.addresses[0].wifi_mode = Some(mode);
        iface
    }

    #[test]
    fn test_render_hostapd_wpa2() {
        let options = LifecycleOptions::default();
        let (daemon, rendered) = render(&wlan0(access_point()), &options, &ReversibleCrypto)
            .unwrap()
            .unwrap();
        assert_eq!(daemon, "hostapd");
        assert_eq!(
            rendered,
            "interface=wlan0\n\
             driver=nl80211\n\
             ssid=gateway-ap\n\
             hw_mode=g\n\
             wme_enabled=1\n\
             ieee80211n=1\n\
             ht_capab=[SHORT-GI-20]\n\
             channel=6\n\
             ignore_broadcast_ssid=0\n\
             wpa=2\n\
             wpa_passphrase=ap-secret\n\
             wpa_key_mgmt=WPA-PSK\n\
             wpa_pairwise=CCMP TKIP\n\
             rsn_pairwise=CCMP\n"
        );
    }

    #[test]
    fn test_render_open_station() {
        let mut wifi = WifiConfig::new(WifiMode::Infra, "upstream");
        wifi.driver = "wext".to_string();
        let options = LifecycleOptions::default();
        let (daemon, rendered) = render(&wlan0(wifi), &options, &ReversibleCrypto)
            .unwrap()
            .unwrap();
        assert_eq!(daemon, "wpa_supplicant");
        assert_eq!(
            rendered,
            "ctrl_interface=/var/run/wpa_supplicant\n\
             network={\n    \
                 mode=0\n    \
                 ssid=\"upstream\"\n    \
                 scan_ssid=1\n    \
                 key_mgmt=NONE\n\
             }\n"
        );
    }

    #[test]
    fn test_render_adhoc_wpa_sets_frequency() {
        let mut wifi = WifiConfig::new(WifiMode::Adhoc, "mesh");
        wifi.security = WifiSecurity::Wpa;
        wifi.passphrase = "enc:terces".to_string();
        wifi.channels = vec![11];
        wifi.pairwise_ciphers = "CCMP".to_string();

        let options = LifecycleOptions::default();
        let rendered = render_wpa_supplicant("wlan0", &wifi, "secret", &options).unwrap();
        assert!(rendered.contains("    mode=1\n"));
        assert!(rendered.contains("    frequency=2462\n"));
        assert!(rendered.contains("    psk=\"secret\"\n"));
        assert!(rendered.contains("    proto=WPA\n"));
        assert!(rendered.contains("    pairwise=CCMP\n"));
    }

    #[test]
    fn test_render_rejects_incomplete_settings() {
        let options = LifecycleOptions::default();

        let mut no_key = access_point();
        no_key.passphrase.clear();
        let err = render(&wlan0(no_key), &options, &ReversibleCrypto).unwrap_err();
        assert!(err.is_configuration_error());

        let mut bad_channel = access_point();
        bad_channel.channels = vec![40];
        assert!(render(&wlan0(bad_channel), &options, &ReversibleCrypto).is_err());

        let mut plain = access_point();
        plain.passphrase = "not-encrypted".to_string();
        assert!(render(&wlan0(plain), &options, &ReversibleCrypto).is_err());
    }

    #[test]
    fn test_render_skips_non_wifi() {
        let options = LifecycleOptions::default();
        let eth0 = NetInterfaceConfig::new("eth0", InterfaceType::Ethernet);
        assert!(render(&eth0, &options, &ReversibleCrypto).unwrap().is_none());

        let mut monitor = wlan0(access_point());
        monitor.name = "mon.wlan0".to_string();
        assert!(render(&monitor, &options, &ReversibleCrypto).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_configs() {
        let dir = tempfile::tempdir().unwrap();
        let options = LifecycleOptions {
            conf_dir: dir.path().join("etc"),
            ..Default::default()
        };
        let mut config = NetworkConfiguration::new();
        config.upsert(wlan0(access_point()));

        let written = write_configs(&config, &options, &ReversibleCrypto).await;
        assert_eq!(written, vec![dir.path().join("etc/hostapd-wlan0.conf")]);
        let contents = std::fs::read_to_string(&written[0]).unwrap();
        assert!(contents.contains("ssid=gateway-ap\n"));
    }
}
