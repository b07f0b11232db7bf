//! # Sphere Bus - Publish/Subscribe Transport Interface
//!
//! Defines the bus collaborator every participant in the service mesh talks
//! through, plus an in-process broker used by tests and single-process hubs.
//!
//! ## Topics
//!
//! Topics are `/`-delimited paths such as `$device/42/channel/motion`.
//! Subscription filters may contain wildcards:
//!
//! - `+` stands for exactly one segment
//! - `#` stands for any number of trailing segments (last position only)
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   publish(topic)    ┌──────────────┐
//! │  Session A   │ ──────────────────▶ │    Broker    │
//! └──────────────┘                     │              │
//!                                      │  filter      │
//! ┌──────────────┐  on_message(topic)  │  matching    │
//! │  Session B   │ ◀────────────────── │              │
//! └──────────────┘                     └──────────────┘
//! ```
//!
//! Each bus-level subscription is delivered in publish order by a dedicated
//! task, so a handler never sees two messages of the same subscription at once.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod memory;
pub mod topic;
pub mod transport;

// Re-export main types
pub use error::TransportError;
pub use memory::{InMemoryBroker, InMemorySession};
pub use topic::{filter_matches, validate_filter, validate_publish_topic};
pub use transport::{Bus, BusConnector, BusSubscription, MessageHandler};

/// Topic level separator.
pub const TOPIC_SEPARATOR: char = '/';

/// Wildcard token matching exactly one topic level.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Wildcard token matching all remaining topic levels.
pub const MULTI_LEVEL_WILDCARD: &str = "#";
