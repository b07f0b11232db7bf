//! # Discovery
//!
//! Every connection answers `services` calls on `$discover` with the ordered
//! list of announcements it has exported, its own discovery responder first.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sphere_rpc::{RpcError, RpcService};
use sphere_types::ServiceAnnouncement;

/// Topic the discovery responder is exported on.
pub const DISCOVER_TOPIC: &str = "$discover";

/// Schema of the discovery responder.
pub const DISCOVER_SCHEMA: &str = "/service/discover";

/// Method returning the exported announcements.
pub const SERVICES_METHOD: &str = "services";

/// Append-only record of the announcements exported by one connection.
#[derive(Debug, Default)]
pub struct DiscoveryRegistry {
    services: Mutex<Vec<ServiceAnnouncement>>,
}

impl DiscoveryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an announcement.
    pub fn record(&self, announcement: ServiceAnnouncement) {
        self.services.lock().push(announcement);
    }

    /// Snapshot of every recorded announcement, in export order.
    #[must_use]
    pub fn query(&self) -> Vec<ServiceAnnouncement> {
        self.services.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }
}

/// RPC service answering discovery queries from a registry.
pub struct DiscoveryService {
    registry: Arc<DiscoveryRegistry>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(registry: Arc<DiscoveryRegistry>) -> Self {
        Self { registry }
    }

    /// The announcement the responder exports itself with.
    #[must_use]
    pub fn announcement() -> ServiceAnnouncement {
        ServiceAnnouncement::new(DISCOVER_SCHEMA)
    }
}

#[async_trait]
impl RpcService for DiscoveryService {
    fn methods(&self) -> Vec<String> {
        vec![SERVICES_METHOD.to_string()]
    }

    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        if method != SERVICES_METHOD {
            return Err(RpcError::MethodNotFound {
                method: method.to_string(),
            });
        }
        Ok(serde_json::to_value(self.registry.query())?)
    }
}
