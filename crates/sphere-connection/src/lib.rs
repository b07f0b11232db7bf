//! # Sphere Connection - Service Mesh Client
//!
//! Everything a driver, app or hub process needs to take part in the mesh:
//!
//! - **Topic templates** ([`TopicTemplate`]): `$device/:id/channel/:ch`
//!   style patterns with named placeholders
//! - **Subscriptions** ([`SubscriptionManager`]): typed callbacks on
//!   templates, delivered one at a time, cancelled by returning `false`
//! - **Export** ([`ServiceExporter`]): bind a service to a topic, announce
//!   it and wire up its events
//! - **Discovery** ([`DiscoveryRegistry`]): what this connection exported,
//!   answered on `$discover`
//! - **Facade** ([`Connection`]): the above behind one handle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sphere_connection::{Connection, ConnectionConfig, TopicValues};
//!
//! let conn = Connection::connect(&connector, ConnectionConfig::from_env()).await?;
//!
//! conn.subscribe("$device/:id/channel/:ch/event/state", |on: bool, values: TopicValues| {
//!     tracing::info!(device = %values["id"], on, "State changed");
//!     true
//! })
//! .await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapter;
pub mod channels;
pub mod config;
pub mod connection;
pub mod device;
pub mod discovery;
pub mod error;
pub mod exporter;
pub mod schema;
pub mod subscription;
pub mod template;

// Re-export main types
pub use adapter::{Callback, CallbackAdapter, CallbackSignature, Payload};
pub use channels::MotionChannel;
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use device::{Channel, Device, Module};
pub use discovery::{DiscoveryRegistry, DiscoveryService, DISCOVER_TOPIC};
pub use error::{ConfigurationError, ConnectionError, DecodeError, ExportError};
pub use exporter::{ExportedService, ServiceExporter};
pub use schema::{SchemaResolver, UrlSchemaResolver};
pub use subscription::{Flavour, Subscription, SubscriptionManager, SubscriptionState};
pub use template::{TopicTemplate, TopicValues};

/// Marks a template segment as a placeholder (`:name`).
pub const PLACEHOLDER_PREFIX: &str = ":";

/// Event every exported service publishes its announcement with.
pub const ANNOUNCE_EVENT: &str = "announce";

pub const DEVICE_SCHEMA: &str = "/service/device";
pub const DRIVER_SCHEMA: &str = "/service/driver";
pub const APP_SCHEMA: &str = "/service/app";

/// Method called on drivers and apps when autostart is on.
pub const START_METHOD: &str = "start";

/// Timeout of the autostart `start` call.
pub const DEFAULT_AUTOSTART_TIMEOUT_MS: u64 = 20_000;

/// Wait before a driver is exported.
pub const DEFAULT_DRIVER_STARTUP_DELAY_MS: u64 = 3_000;
