//! In-memory collaborators for tests.
//!
//! Enabled by the `testing` feature. Every double records what it was asked
//! to do so tests can assert on the exact interaction.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use netadmin::services::{Command, CommandExecutor, CommandOutput};
//! use netadmin::testing::ScriptedExecutor;
//!
//! # tokio_test_block_on(async {
//! let executor = Arc::new(ScriptedExecutor::with_responder(|cmd| {
//!     if cmd.program == "wpa_cli" {
//!         CommandOutput::ok("wpa_state=COMPLETED\n")
//!     } else {
//!         CommandOutput::ok("")
//!     }
//! }));
//! let out = executor.execute(&Command::new("wpa_cli").args(["-i", "wlan0", "status"])).await?;
//! assert!(out.stdout.contains("COMPLETED"));
//! assert_eq!(executor.command_lines(), vec!["wpa_cli -i wlan0 status"]);
//! # Ok::<(), netadmin::Error>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::properties::PropertyStore;
use crate::services::{
    Command, CommandExecutor, CommandOutput, ConfigurationService, CryptoService, LiveInterface,
    NetworkService,
};

type Responder = Box<dyn Fn(&Command) -> CommandOutput + Send + Sync>;

/// Records commands and answers them with a closure.
pub struct ScriptedExecutor {
    commands: Mutex<Vec<Command>>,
    responder: Responder,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Every command succeeds with empty output.
    pub fn new() -> Self {
        Self::with_responder(|_| CommandOutput::ok(""))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Command) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            commands: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Commands executed so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Executed commands rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.clear();
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }
        Ok((self.responder)(command))
    }
}

#[derive(Debug, Default)]
struct ConfigState {
    configurations: BTreeMap<String, PropertyStore>,
    snapshots: Vec<(u64, BTreeMap<String, PropertyStore>)>,
    next_snapshot: u64,
    failure: Option<String>,
}

/// Keeps configurations and snapshots in memory.
///
/// Every stored configuration is also published on [`updates`](Self::updates),
/// standing in for the store delivering it back to its component.
#[derive(Debug)]
pub struct MemoryConfigurationService {
    state: Mutex<ConfigState>,
    updates: broadcast::Sender<(String, PropertyStore)>,
}

impl Default for MemoryConfigurationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigurationService {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(ConfigState {
                next_snapshot: 1,
                ..Default::default()
            }),
            updates,
        }
    }

    /// Current configuration stored for `pid`.
    pub fn configuration(&self, pid: &str) -> Option<PropertyStore> {
        self.lock().ok()?.configurations.get(pid).cloned()
    }

    /// Stored `(pid, properties)` pairs as they are written.
    pub fn updates(&self) -> broadcast::Receiver<(String, PropertyStore)> {
        self.updates.subscribe()
    }

    /// Make subsequent updates fail with `message`; `None` restores success.
    pub fn set_failure(&self, message: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            state.failure = message.map(str::to_string);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ConfigState>> {
        self.state
            .lock()
            .map_err(|_| Error::collaborator("configuration", "state lock poisoned"))
    }
}

#[async_trait]
impl ConfigurationService for MemoryConfigurationService {
    async fn update_configuration(
        &self,
        pid: &str,
        properties: &PropertyStore,
        take_snapshot: bool,
    ) -> Result<()> {
        {
            let mut state = self.lock()?;
            if let Some(message) = &state.failure {
                return Err(Error::collaborator("configuration", message.clone()));
            }
            state.configurations.insert(pid.to_string(), properties.clone());
        }
        if take_snapshot {
            self.snapshot().await?;
        }
        let _ = self.updates.send((pid.to_string(), properties.clone()));
        Ok(())
    }

    async fn snapshot(&self) -> Result<u64> {
        let mut state = self.lock()?;
        let id = state.next_snapshot;
        state.next_snapshot += 1;
        let copy = state.configurations.clone();
        state.snapshots.push((id, copy));
        Ok(id)
    }

    async fn snapshots(&self) -> Result<Vec<u64>> {
        Ok(self.lock()?.snapshots.iter().map(|(id, _)| *id).collect())
    }

    async fn rollback(&self, id: u64) -> Result<()> {
        let mut state = self.lock()?;
        let restored = state
            .snapshots
            .iter()
            .find(|(snapshot, _)| *snapshot == id)
            .map(|(_, configurations)| configurations.clone())
            .ok_or_else(|| Error::collaborator("configuration", format!("no snapshot {}", id)))?;
        state.configurations = restored;
        Ok(())
    }
}

/// Reports a fixed, replaceable interface list.
#[derive(Debug, Default)]
pub struct StaticNetworkService {
    interfaces: Mutex<Vec<LiveInterface>>,
    failing: Mutex<bool>,
}

impl StaticNetworkService {
    pub fn new(interfaces: Vec<LiveInterface>) -> Self {
        Self {
            interfaces: Mutex::new(interfaces),
            failing: Mutex::new(false),
        }
    }

    pub fn set_interfaces(&self, interfaces: Vec<LiveInterface>) {
        if let Ok(mut current) = self.interfaces.lock() {
            *current = interfaces;
        }
    }

    /// Make enumeration fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut current) = self.failing.lock() {
            *current = failing;
        }
    }
}

#[async_trait]
impl NetworkService for StaticNetworkService {
    async fn interfaces(&self) -> Result<Vec<LiveInterface>> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(Error::collaborator("network", "enumeration failed"));
        }
        Ok(self.interfaces.lock().map(|i| i.clone()).unwrap_or_default())
    }
}

/// Marks values as encrypted with a prefix and reverses them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReversibleCrypto;

impl ReversibleCrypto {
    const PREFIX: &'static str = "enc:";
}

impl CryptoService for ReversibleCrypto {
    fn encrypt(&self, plain: &str) -> Result<String> {
        Ok(format!("{}{}", Self::PREFIX, plain.chars().rev().collect::<String>()))
    }

    fn decrypt(&self, cipher: &str) -> Result<String> {
        cipher
            .strip_prefix(Self::PREFIX)
            .map(|s| s.chars().rev().collect())
            .ok_or_else(|| Error::collaborator("crypto", "value is not encrypted"))
    }
}
