//! Common test utilities for integration tests.
//!
//! Provides `TestGateway`, a `NetworkAdmin` wired to in-memory collaborators
//! with the configuration store delivering writes back to the engine, and a
//! `props!` macro for building property bags.

use std::sync::Arc;
use std::time::Duration;

use netadmin::lifecycle::LifecycleOptions;
use netadmin::model::InterfaceType;
use netadmin::services::LiveInterface;
use netadmin::testing::{
    MemoryConfigurationService, ReversibleCrypto, ScriptedExecutor, StaticNetworkService,
};
use netadmin::{AdminOptions, NetworkAdmin, PropertyStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Build a `PropertyStore` from `key => value` pairs.
#[macro_export]
macro_rules! props {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut props = netadmin::PropertyStore::new();
        $( props.insert($key, $value); )*
        props
    }};
}

/// A gateway under test.
///
/// Every configuration written to the store is delivered back to
/// `NetworkAdmin::updated` (or `firewall_updated`) by a background task, the
/// way the store notifies its component in production.
pub struct TestGateway {
    pub admin: Arc<NetworkAdmin>,
    pub store: Arc<MemoryConfigurationService>,
    pub network: Arc<StaticNetworkService>,
    pub executor: Arc<ScriptedExecutor>,
    pub dir: tempfile::TempDir,
    delivery: JoinHandle<()>,
}

impl TestGateway {
    /// A gateway whose live interfaces are `live` and whose commands all
    /// succeed.
    pub fn new(live: &[(&str, InterfaceType)]) -> Self {
        Self::with_executor(live, ScriptedExecutor::new(), |_| {})
    }

    /// Full control over the executor and options.
    pub fn with_executor(
        live: &[(&str, InterfaceType)],
        executor: ScriptedExecutor,
        configure: impl FnOnce(&mut AdminOptions),
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = AdminOptions {
            lifecycle: LifecycleOptions {
                run_dir: dir.path().join("run"),
                conf_dir: dir.path().join("etc"),
                ..Default::default()
            },
            ..Default::default()
        };
        configure(&mut options);

        let store = Arc::new(MemoryConfigurationService::new());
        let network = Arc::new(StaticNetworkService::new(
            live.iter()
                .map(|(name, kind)| LiveInterface::new(*name, *kind))
                .collect(),
        ));
        let executor = Arc::new(executor);
        let admin = Arc::new(
            NetworkAdmin::builder()
                .executor(executor.clone())
                .configuration_service(store.clone())
                .network_service(network.clone())
                .crypto_service(Arc::new(ReversibleCrypto))
                .options(options)
                .build()
                .expect("build admin"),
        );

        // subscribe before anything can be written
        let updates = store.updates();
        let delivery = tokio::spawn(deliver(admin.clone(), updates));
        Self {
            admin,
            store,
            network,
            executor,
            dir,
            delivery,
        }
    }

    /// Stop delivering stored configurations back to the engine.
    pub fn stop_delivery(&self) {
        self.delivery.abort();
    }

    /// Apply `props` as the initial configuration.
    pub async fn seed(&self, props: PropertyStore) {
        self.admin.updated(props).await.expect("seed configuration");
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.delivery.abort();
    }
}

async fn deliver(
    admin: Arc<NetworkAdmin>,
    mut updates: broadcast::Receiver<(String, PropertyStore)>,
) {
    while let Ok((pid, props)) = updates.recv().await {
        let result = if pid == admin.options().network_pid {
            admin.updated(props).await
        } else if pid == admin.options().firewall_pid {
            admin.firewall_updated(&props).await.map(|_| ())
        } else {
            Ok(())
        };
        if let Err(e) = result {
            eprintln!("delivering {} failed: {}", pid, e);
        }
    }
}

/// Short confirmation timings for tests that expect a timeout.
pub fn fast_confirmation(options: &mut AdminOptions) {
    options.confirm_poll_interval_ms = 10;
    options.confirm_timeout_ms = 200;
}

/// Wait briefly for background delivery to settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
