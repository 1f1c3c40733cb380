//! Network configuration reconciliation for Linux gateways.
//!
//! This crate reconciles a declarative, flat, string-keyed network
//! configuration against the live network stack: it works out what changed,
//! drives the daemons and firewall that realize it, waits for the change to
//! be confirmed, and never loses configuration of interfaces an update did
//! not touch.
//!
//! # Features
//!
//! - `testing` - In-memory collaborators for tests ([`testing`])
//! - `full` - All features enabled
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netadmin::config::InterfaceUpdate;
//! use netadmin::model::{Ip4Config, NetConfig, NetStatus};
//! use netadmin::NetworkAdmin;
//!
//! #[tokio::main]
//! async fn main() -> netadmin::Result<()> {
//!     let admin = NetworkAdmin::builder()
//!         .configuration_service(Arc::new(MyStore::open()?))
//!         .crypto_service(Arc::new(MyCrypto::default()))
//!         .build()?;
//!
//!     let changed = admin
//!         .update_ethernet_interface_config(
//!             "eth0",
//!             InterfaceUpdate::new(vec![NetConfig::Ip4(Ip4Config {
//!                 status: NetStatus::EnabledLan,
//!                 dhcp: true,
//!                 ..Default::default()
//!             })]),
//!         )
//!         .await?;
//!     println!("eth0 changed: {}", changed);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`properties`] - The property bag and its key grammar
//! - [`model`] - Typed interface configuration
//! - [`migrate`] - Legacy PPP name migration
//! - [`config`] - Per-interface merge and diff reporting
//! - [`wan`] - WAN exclusivity
//! - [`confirm`] - Waiting for a submitted change to be applied
//! - [`lifecycle`] - Interface and daemon bring-up/tear-down
//! - [`dhcp`] - DHCP server configuration files
//! - [`wifi`] - Access point and station daemon configuration files
//! - [`firewall`] - Firewall rules, encoding and application
//! - [`admin`] - The engine tying everything together

pub mod admin;
pub mod config;
pub mod confirm;
pub mod dhcp;
pub mod error;
pub mod firewall;
pub mod lifecycle;
pub mod migrate;
pub mod model;
pub mod properties;
pub mod services;
pub mod util;
pub mod validation;
pub mod wan;
pub mod wifi;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export common types at crate root for convenience
pub use admin::{AdminOptions, NetworkAdmin, NetworkAdminBuilder};
pub use error::{Error, Result};
pub use model::NetworkConfiguration;
pub use properties::PropertyStore;
