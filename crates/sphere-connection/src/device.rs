//! # Devices, Channels and Modules
//!
//! The kinds of service the connection knows how to export with an extended
//! announcement.
//!
//! | Kind | Topic | Schema |
//! |------|-------|--------|
//! | [`Device`] | `$device/{id}` | `/service/device` |
//! | [`Channel`] | `$device/{deviceId}/channel/{id}` | protocol schema |
//! | [`Module`] (driver) | `$node/{serial}/driver/{id}` | `/service/driver` |
//! | [`Module`] (app) | `$node/{serial}/app/{id}` | `/service/app` |

use sphere_rpc::RpcService;
use sphere_types::{device_guid, ChannelAnnouncement, DeviceAnnouncement, ModuleAnnouncement};

/// A physical or virtual device.
pub trait Device: RpcService {
    fn device_info(&self) -> DeviceAnnouncement;
}

/// One capability of a device, speaking a single protocol.
pub trait Channel: RpcService {
    /// Protocol name, e.g. `motion`.
    fn protocol(&self) -> &str;

    /// Announcement for this channel under `id`.
    fn channel_info(&self, id: &str) -> ChannelAnnouncement {
        ChannelAnnouncement::new(id, self.protocol())
    }
}

/// A driver or an app.
pub trait Module: RpcService {
    fn module_info(&self) -> ModuleAnnouncement;
}

/// The device's mesh-wide id, derived from its natural id unless already set.
pub(crate) fn resolve_device_id(info: &mut DeviceAnnouncement) -> &str {
    if info.id.is_empty() {
        info.id = device_guid(&info.natural_id_type, &info.natural_id);
    }
    &info.id
}

/// `$device/{id}`
pub(crate) fn device_topic(device_id: &str) -> String {
    format!("$device/{device_id}")
}

/// `{device_topic}/channel/{id}`
pub(crate) fn channel_topic(device_topic: &str, channel_id: &str) -> String {
    format!("{device_topic}/channel/{channel_id}")
}

/// `$node/{serial}/{kind}/{id}`
pub(crate) fn module_topic(serial: &str, kind: &str, module_id: &str) -> String {
    format!("$node/{serial}/{kind}/{module_id}")
}
