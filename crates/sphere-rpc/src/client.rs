//! # Service Client
//!
//! Calls methods of a remote service by publishing requests on its topic and
//! awaiting the correlated response on `{topic}/reply`.
//!
//! The reply subscription is opened lazily on the first call and torn down
//! when the client is dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sphere_bus::{Bus, BusSubscription, MessageHandler};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::correlation::CorrelationId;
use crate::envelope::{reply_topic, Request, Response};
use crate::error::RpcError;
use crate::pending::PendingCallStore;

/// Client for one remote service topic.
pub struct ServiceClient {
    bus: Arc<dyn Bus>,
    topic: String,
    pending: Arc<PendingCallStore>,
    replies: OnceCell<Box<dyn BusSubscription>>,
    default_timeout: Duration,
    /// Methods the service announced, empty when unknown.
    pub supported_methods: Vec<String>,
    /// Events the service announced, empty when unknown.
    pub supported_events: Vec<String>,
}

impl ServiceClient {
    /// Create a client for the service on `topic`.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, topic: &str, default_timeout: Duration) -> Self {
        Self {
            bus,
            topic: topic.to_string(),
            pending: Arc::new(PendingCallStore::new()),
            replies: OnceCell::new(),
            default_timeout,
            supported_methods: Vec::new(),
            supported_events: Vec::new(),
        }
    }

    /// Attach the capabilities the service announced.
    #[must_use]
    pub fn with_capabilities(mut self, methods: Vec<String>, events: Vec<String>) -> Self {
        self.supported_methods = methods;
        self.supported_events = events;
        self
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of calls still waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.pending.pending_count()
    }

    /// Call `method` with the client's default timeout.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.call_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Call `method`, sending `params` as the single positional argument
    /// (or no arguments when it serializes to `null`).
    ///
    /// # Errors
    ///
    /// `Timeout` when no response arrives within `timeout`, `Remote` when
    /// the service answered with an error object.
    pub async fn call_with_timeout<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.ensure_reply_subscription().await?;

        let params = match serde_json::to_value(params)? {
            Value::Null => Vec::new(),
            value => vec![value],
        };

        let (id, rx) = self.pending.register(method);
        let request = Request::new(id, method, params);
        let payload = serde_json::to_vec(&request)?;

        if let Err(e) = self.bus.publish(&self.topic, Bytes::from(payload)).await {
            self.pending.cancel(id);
            return Err(e.into());
        }
        trace!(topic = %self.topic, method = method, correlation_id = %id, "Request sent");

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(RpcError::Internal("response channel closed".to_string()));
            }
            Err(_) => {
                self.pending.cancel(id);
                return Err(RpcError::Timeout {
                    topic: self.topic.clone(),
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let value = outcome.map_err(RpcError::from)?;
        serde_json::from_value(value).map_err(|e| RpcError::InvalidParams(e.to_string()))
    }

    async fn ensure_reply_subscription(&self) -> Result<(), RpcError> {
        self.replies
            .get_or_try_init(|| async {
                let filter = reply_topic(&self.topic);
                let handler = reply_handler(Arc::clone(&self.pending));
                self.bus.subscribe(&filter, handler).await
            })
            .await?;
        Ok(())
    }
}

fn reply_handler(pending: Arc<PendingCallStore>) -> MessageHandler {
    Arc::new(move |topic: &str, payload: &[u8]| {
        let response: Response = match serde_json::from_slice(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!(topic = topic, error = %e, "Ignoring malformed RPC response");
                return;
            }
        };
        let Some(id) = CorrelationId::from_json(&response.id) else {
            return;
        };
        // Other clients share the reply topic; unknown ids are theirs
        pending.complete(id, response.into_result());
    })
}

impl Drop for ServiceClient {
    fn drop(&mut self) {
        if let Some(subscription) = self.replies.get() {
            subscription.cancel();
        }
    }
}
