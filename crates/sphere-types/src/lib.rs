//! # Sphere Types Crate
//!
//! Wire models exchanged over the bus.
//!
//! ## Design Principles
//!
//! - **One announcement shape**: every exported service publishes a
//!   [`ServiceAnnouncement`]; richer announcements embed it with
//!   `#[serde(flatten)]` so any consumer can read the common part.
//! - **camelCase on the wire**: field names match what other hub processes
//!   already publish (`supportedMethods`, `naturalIdType`, ...).

pub mod announcement;
pub mod device;

pub use announcement::{Announcement, ServiceAnnouncement};
pub use device::{device_guid, ChannelAnnouncement, DeviceAnnouncement, ModuleAnnouncement};
