//! Collaborator interfaces consumed by the engine.
//!
//! Shell execution, configuration persistence, live interface enumeration
//! and credential encryption live behind these traits. [`EventBus`] is the
//! concrete channel that carries confirmation events.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{InterfaceType, UsbDevice};
use crate::properties::PropertyStore;
use crate::util::ifname::{self, SYSFS_NET};

// ============================================================================
// Command execution
// ============================================================================

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given standard output.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion. A non-zero exit is not an error here.
    async fn execute(&self, command: &Command) -> Result<CommandOutput>;

    /// Run `command`, turning a non-zero exit into [`Error::Command`].
    async fn execute_checked(&self, command: &Command) -> Result<CommandOutput> {
        let output = self.execute(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Command {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandExecutor;

#[async_trait]
impl CommandExecutor for TokioCommandExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput> {
        debug!(%command, "executing");
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| Error::from(e).with_context(format!("spawning {}", command.program)))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ============================================================================
// Configuration persistence
// ============================================================================

/// Persists component configurations and snapshots.
#[async_trait]
pub trait ConfigurationService: Send + Sync {
    /// Store `properties` for the component `pid`, optionally taking a
    /// snapshot afterwards.
    async fn update_configuration(
        &self,
        pid: &str,
        properties: &PropertyStore,
        take_snapshot: bool,
    ) -> Result<()>;

    /// Take a snapshot of every component configuration, returning its id.
    async fn snapshot(&self) -> Result<u64>;

    /// Ids of the stored snapshots, oldest first.
    async fn snapshots(&self) -> Result<Vec<u64>>;

    /// Restore the snapshot `id`.
    async fn rollback(&self, id: u64) -> Result<()>;
}

// ============================================================================
// Live interfaces
// ============================================================================

/// An interface currently present on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInterface {
    pub name: String,
    pub kind: InterfaceType,
    pub is_virtual: bool,
    pub up: bool,
    pub usb: Option<UsbDevice>,
}

impl LiveInterface {
    pub fn new(name: impl Into<String>, kind: InterfaceType) -> Self {
        Self {
            name: name.into(),
            kind,
            is_virtual: false,
            up: false,
            usb: None,
        }
    }
}

/// Enumerates live system interfaces.
#[async_trait]
pub trait NetworkService: Send + Sync {
    async fn interfaces(&self) -> Result<Vec<LiveInterface>>;
}

/// Reads interfaces from sysfs.
#[derive(Debug, Clone)]
pub struct SysfsNetworkService {
    root: PathBuf,
}

impl Default for SysfsNetworkService {
    fn default() -> Self {
        Self::new(SYSFS_NET)
    }
}

impl SysfsNetworkService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_trimmed(path: PathBuf) -> Option<String> {
        tokio::fs::read_to_string(path)
            .await
            .ok()
            .map(|s| s.trim().to_string())
    }

    async fn usb_device(&self, name: &str) -> Option<UsbDevice> {
        let device = tokio::fs::canonicalize(self.root.join(name).join("device"))
            .await
            .ok()?;
        if !device.components().any(|c| c.as_os_str().to_string_lossy().starts_with("usb")) {
            return None;
        }

        // .../usb1/1-1/1-1.2/1-1.2:1.0 -> the port directory is the parent
        let port_dir = device
            .ancestors()
            .find(|p| {
                p.file_name()
                    .map(|f| f.to_string_lossy())
                    .is_some_and(|f| !f.contains(':') && ifname::is_usb_port_name(&f))
            })?
            .to_path_buf();
        let (bus_number, device_path) =
            ifname::split_usb_port(&port_dir.file_name()?.to_string_lossy())?;

        Some(UsbDevice {
            vendor_id: Self::read_trimmed(port_dir.join("idVendor")).await.unwrap_or_default(),
            vendor_name: Self::read_trimmed(port_dir.join("manufacturer"))
                .await
                .unwrap_or_default(),
            product_id: Self::read_trimmed(port_dir.join("idProduct")).await.unwrap_or_default(),
            product_name: Self::read_trimmed(port_dir.join("product")).await.unwrap_or_default(),
            bus_number,
            device_path,
        })
    }

    async fn classify(&self, name: &str) -> LiveInterface {
        let dir = self.root.join(name);
        let has = |sub: &str| dir.join(sub).exists();

        let arphrd = Self::read_trimmed(dir.join("type")).await;
        let kind = if name == "lo" || arphrd.as_deref() == Some("772") {
            InterfaceType::Loopback
        } else if has("wireless") || has("phy80211") {
            InterfaceType::Wifi
        } else if ifname::is_ppp_name(name) || arphrd.as_deref() == Some("512") {
            InterfaceType::Modem
        } else {
            InterfaceType::Ethernet
        };

        LiveInterface {
            name: name.to_string(),
            kind,
            is_virtual: !has("device"),
            up: Self::read_trimmed(dir.join("operstate")).await.as_deref() == Some("up"),
            usb: self.usb_device(name).await,
        }
    }
}

#[async_trait]
impl NetworkService for SysfsNetworkService {
    async fn interfaces(&self) -> Result<Vec<LiveInterface>> {
        let names = ifname::list_interfaces(&self.root)
            .await
            .map_err(|e| Error::from(e).with_context("listing interfaces"))?;

        let mut interfaces = Vec::with_capacity(names.len());
        for name in names {
            interfaces.push(self.classify(&name).await);
        }
        Ok(interfaces)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Encrypts and decrypts stored credentials.
pub trait CryptoService: Send + Sync {
    fn encrypt(&self, plain: &str) -> Result<String>;

    /// Fails if `cipher` is not a value produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, cipher: &str) -> Result<String>;
}

// ============================================================================
// Events
// ============================================================================

/// Posted once a network configuration has been applied.
pub const NETWORK_CONFIG_CHANGE_TOPIC: &str = "net/admin/event/NETWORK_EVENT_CONFIG_CHANGE_TOPIC";

/// A topic-addressed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: String,
    pub properties: BTreeMap<String, String>,
}

impl Event {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Broadcast bus for [`Event`]s. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver `event` to current subscribers. Returns how many received it.
    pub fn post(&self, event: Event) -> usize {
        debug!(topic = %event.topic, "posting event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}
