//! # Bus Transport Interface
//!
//! The consumed interface of the publish/subscribe bus. The service-mesh core
//! only ever talks to the bus through these traits, so any broker client
//! (MQTT, in-memory, ...) can sit underneath.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Callback invoked for every message routed to a subscription.
///
/// Arguments are the concrete topic the message was published on and the raw
/// payload bytes.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// A connected bus session.
///
/// # Thread Safety
///
/// `publish` must be safe to call from many tasks at once without external
/// locking: registry writers, event emitters and direct callers all share one
/// session.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Subscribe to every topic routed by `filter`.
    ///
    /// Messages for one subscription are handed to `handler` one at a time,
    /// in the order the broker delivered them.
    async fn subscribe(
        &self,
        filter: &str,
        handler: MessageHandler,
    ) -> Result<Box<dyn BusSubscription>, TransportError>;

    /// Publish a payload on a concrete topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// The client identifier this session connected with.
    fn client_id(&self) -> &str;
}

/// Handle to a live bus-level subscription.
pub trait BusSubscription: Send + Sync {
    /// Tear down the subscription at the broker.
    ///
    /// Idempotent. A message whose delivery already started is allowed to
    /// finish; nothing is delivered afterwards.
    fn cancel(&self);

    /// The filter this subscription was created with.
    fn filter(&self) -> &str;
}

/// Opens bus sessions.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect to the broker at `address` using `client_id`.
    async fn connect(&self, address: &str, client_id: &str)
        -> Result<Arc<dyn Bus>, TransportError>;
}
