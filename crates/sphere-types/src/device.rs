//! # Device, Channel and Module Announcements
//!
//! Extended announcements published by drivers, apps, devices and channels.
//! Each one embeds the common [`ServiceAnnouncement`] fields.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::announcement::{Announcement, ServiceAnnouncement};

/// Announcement of a physical or virtual device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAnnouncement {
    /// Mesh-wide device id, derived from the natural id (see [`device_guid`]).
    #[serde(default)]
    pub id: String,
    /// Id assigned by the device's own technology (MAC, serial, ...).
    pub natural_id: String,
    /// Kind of natural id (e.g. `zigbee`, `hue`).
    pub natural_id_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    pub service: ServiceAnnouncement,
}

impl DeviceAnnouncement {
    /// Create a device announcement from its natural identity.
    #[must_use]
    pub fn new(natural_id_type: &str, natural_id: &str) -> Self {
        Self {
            natural_id: natural_id.to_string(),
            natural_id_type: natural_id_type.to_string(),
            ..Self::default()
        }
    }

    /// Set the human-readable name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Announcement of one channel of a device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAnnouncement {
    /// Channel id, unique within its device.
    pub id: String,
    /// Protocol name (e.g. `motion`, `on-off`).
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub service: ServiceAnnouncement,
}

impl ChannelAnnouncement {
    /// Create a channel announcement.
    #[must_use]
    pub fn new(id: &str, protocol: &str) -> Self {
        Self {
            id: id.to_string(),
            protocol: protocol.to_string(),
            ..Self::default()
        }
    }
}

/// Announcement of a driver or app module.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAnnouncement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(flatten)]
    pub service: ServiceAnnouncement,
}

impl ModuleAnnouncement {
    /// Create a module announcement with the given id.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

macro_rules! impl_announcement {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Announcement for $ty {
                fn service(&self) -> &ServiceAnnouncement {
                    &self.service
                }

                fn service_mut(&mut self) -> &mut ServiceAnnouncement {
                    &mut self.service
                }
            }
        )*
    };
}

impl_announcement!(DeviceAnnouncement, ChannelAnnouncement, ModuleAnnouncement);

/// Derive the mesh-wide device id from a natural identity.
///
/// Stable across restarts: the same `(type, id)` pair always yields the same
/// 16 hex character id.
#[must_use]
pub fn device_guid(natural_id_type: &str, natural_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(natural_id_type.as_bytes());
    hasher.update(b":");
    hasher.update(natural_id.as_bytes());
    let digest = hasher.finalize();

    hex::encode(&digest[..8])
}
