//! # Pending Call Store
//!
//! Maps correlation IDs to callers awaiting a response on a reply topic.
//!
//! Flow:
//! 1. The client calls `register()` to get a correlation ID and a receiver
//! 2. The request goes out with the correlation ID as its `id`
//! 3. The reply listener calls `complete()` when the response arrives
//! 4. The caller awaits the receiver or gives up and calls `cancel()`

use crate::correlation::CorrelationId;
use crate::envelope::ErrorObject;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Value, ErrorObject>;

struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    method: String,
}

/// Outstanding calls of one client.
#[derive(Default)]
pub struct PendingCallStore {
    pending: DashMap<CorrelationId, PendingCall>,
}

impl PendingCallStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outgoing call.
    ///
    /// # Returns
    ///
    /// The id to put on the request and the receiver its outcome arrives on.
    pub fn register(&self, method: &str) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingCall {
                sender: tx,
                created_at: Instant::now(),
                method: method.to_string(),
            },
        );

        debug!(correlation_id = %correlation_id, method = method, "Registered pending call");
        (correlation_id, rx)
    }

    /// Hand a response to its caller.
    ///
    /// Returns false when the id is unknown (another client's reply, or a
    /// call that already gave up) or the caller stopped waiting.
    pub fn complete(&self, correlation_id: CorrelationId, outcome: CallOutcome) -> bool {
        let Some((_, call)) = self.pending.remove(&correlation_id) else {
            return false;
        };

        let response_time = call.created_at.elapsed();
        if call.sender.send(outcome).is_ok() {
            debug!(
                correlation_id = %correlation_id,
                method = call.method,
                response_time_ms = response_time.as_millis(),
                "Completed pending call"
            );
            true
        } else {
            debug!(
                correlation_id = %correlation_id,
                method = call.method,
                "Pending call receiver dropped"
            );
            false
        }
    }

    /// Forget a call whose caller stopped waiting.
    pub fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.pending.remove(&correlation_id).is_some()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_complete() {
        let store = PendingCallStore::new();
        let (id, rx) = store.register("get");

        assert_eq!(store.pending_count(), 1);
        assert!(store.complete(id, Ok(json!({"on": true}))));
        assert_eq!(store.pending_count(), 0);

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), json!({"on": true}));
    }

    #[tokio::test]
    async fn test_complete_with_error() {
        let store = PendingCallStore::new();
        let (id, rx) = store.register("set");

        store.complete(
            id,
            Err(ErrorObject {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        );

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap_err().code, -32601);
    }

    #[test]
    fn test_complete_unknown_id() {
        let store = PendingCallStore::new();
        assert!(!store.complete(CorrelationId::new(), Ok(Value::Null)));
    }

    #[test]
    fn test_dropped_receiver_is_not_completed() {
        let store = PendingCallStore::new();
        let (id, rx) = store.register("get");
        drop(rx);

        assert!(!store.complete(id, Ok(Value::Null)));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_cancel() {
        let store = PendingCallStore::new();
        let (id, _rx) = store.register("get");

        assert!(store.cancel(id));
        assert!(!store.cancel(id));
        assert_eq!(store.pending_count(), 0);
    }
}
