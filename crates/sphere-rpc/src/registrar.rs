//! RPC registrar interface consumed by the service exporter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcError;
use crate::service::RpcService;

/// Registers services on topics and answers calls addressed to them.
#[async_trait]
pub trait RpcRegistrar: Send + Sync {
    /// Bind `service` to `topic`.
    ///
    /// # Arguments
    ///
    /// * `service` - The object answering calls
    /// * `topic` - Concrete topic requests are published on
    /// * `schema` - Absolute schema URI describing the service
    ///
    /// # Returns
    ///
    /// The endpoint, carrying the method names discovered on the service and
    /// the means to send events through the topic.
    async fn register_service(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        schema: &str,
    ) -> Result<Arc<dyn ServiceEndpoint>, RpcError>;

    /// Release `topic`: stop answering calls on it and free it for another
    /// registration. Returns false when nothing was bound to it.
    fn unregister(&self, topic: &str) -> bool;
}

/// A registered service as seen by its exporter.
#[async_trait]
pub trait ServiceEndpoint: Send + Sync {
    /// Topic the service is bound to.
    fn topic(&self) -> &str;

    /// Method names the registrar exposes for the service.
    fn methods(&self) -> &[String];

    /// Send event `event` with positional payload values.
    async fn send_event(&self, event: &str, payload: Vec<Value>) -> Result<(), RpcError>;
}
