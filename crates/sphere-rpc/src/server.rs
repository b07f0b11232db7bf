//! # JSON-RPC Server
//!
//! In-process [`RpcRegistrar`] answering requests published on service
//! topics. One bus subscription per registered topic; each request is
//! handled on its own task so a slow method never blocks the topic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use sphere_bus::{Bus, BusSubscription, MessageHandler};
use tracing::{debug, info, warn};

use crate::envelope::{event_topic, reply_topic, Notification, Request, Response};
use crate::error::RpcError;
use crate::registrar::{RpcRegistrar, ServiceEndpoint};
use crate::service::RpcService;

struct Registration {
    schema: String,
    subscription: Option<Box<dyn BusSubscription>>,
}

/// Serves registered services over one bus session.
pub struct JsonRpcServer {
    bus: Arc<dyn Bus>,
    registrations: Mutex<HashMap<String, Registration>>,
}

impl JsonRpcServer {
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            bus,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    fn request_handler(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        methods: Arc<[String]>,
    ) -> MessageHandler {
        let bus = Arc::clone(&self.bus);
        let topic: Arc<str> = Arc::from(topic);

        Arc::new(move |_message_topic: &str, payload: &[u8]| {
            let request: Request = match serde_json::from_slice(payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Dropping malformed RPC request");
                    return;
                }
            };

            let bus = Arc::clone(&bus);
            let service = Arc::clone(&service);
            let topic = Arc::clone(&topic);
            let methods = Arc::clone(&methods);
            tokio::spawn(async move {
                handle_request(bus, service, &topic, &methods, request).await;
            });
        })
    }
}

async fn handle_request(
    bus: Arc<dyn Bus>,
    service: Arc<dyn RpcService>,
    topic: &str,
    methods: &[String],
    request: Request,
) {
    debug!(topic = topic, method = %request.method, "Handling RPC request");

    let outcome = if methods.iter().any(|m| m == &request.method) {
        service
            .call(&request.method, request.params.unwrap_or(Value::Null))
            .await
    } else {
        Err(RpcError::MethodNotFound {
            method: request.method.clone(),
        })
    };

    // Requests without an id expect no response
    let Some(id) = request.id else {
        if let Err(e) = outcome {
            warn!(topic = topic, method = %request.method, error = %e, "Notification call failed");
        }
        return;
    };

    let response = Response::from_result(id, outcome.map_err(|e| e.to_error_object()));
    let payload = match serde_json::to_vec(&response) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(topic = topic, error = %e, "Failed to encode RPC response");
            return;
        }
    };

    if let Err(e) = bus.publish(&reply_topic(topic), Bytes::from(payload)).await {
        warn!(topic = topic, error = %e, "Failed to publish RPC response");
    }
}

#[async_trait]
impl RpcRegistrar for JsonRpcServer {
    async fn register_service(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        schema: &str,
    ) -> Result<Arc<dyn ServiceEndpoint>, RpcError> {
        // Reserve the topic before the subscribe round-trip
        {
            let mut registrations = self.registrations.lock();
            if registrations.contains_key(topic) {
                return Err(RpcError::AlreadyRegistered {
                    topic: topic.to_string(),
                });
            }
            registrations.insert(
                topic.to_string(),
                Registration {
                    schema: schema.to_string(),
                    subscription: None,
                },
            );
        }

        let mut methods = service.methods();
        methods.sort();
        methods.dedup();
        let methods: Arc<[String]> = Arc::from(methods);

        let handler = self.request_handler(service, topic, Arc::clone(&methods));
        let subscription = match self.bus.subscribe(topic, handler).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.registrations.lock().remove(topic);
                return Err(e.into());
            }
        };

        if let Some(registration) = self.registrations.lock().get_mut(topic) {
            registration.subscription = Some(subscription);
        }

        info!(topic = topic, schema = schema, methods = methods.len(), "Service registered");

        Ok(Arc::new(BusEndpoint {
            bus: Arc::clone(&self.bus),
            topic: topic.to_string(),
            methods: methods.to_vec(),
        }))
    }

    fn unregister(&self, topic: &str) -> bool {
        let Some(registration) = self.registrations.lock().remove(topic) else {
            return false;
        };

        if let Some(subscription) = &registration.subscription {
            subscription.cancel();
        }
        info!(topic = topic, schema = %registration.schema, "Service unregistered");
        true
    }
}

impl Drop for JsonRpcServer {
    fn drop(&mut self) {
        for registration in self.registrations.get_mut().values() {
            if let Some(subscription) = &registration.subscription {
                subscription.cancel();
            }
        }
    }
}

/// Endpoint publishing events as JSON-RPC notifications.
struct BusEndpoint {
    bus: Arc<dyn Bus>,
    topic: String,
    methods: Vec<String>,
}

#[async_trait]
impl ServiceEndpoint for BusEndpoint {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn methods(&self) -> &[String] {
        &self.methods
    }

    async fn send_event(&self, event: &str, payload: Vec<Value>) -> Result<(), RpcError> {
        let notification = Notification::new(event, payload);
        let bytes = serde_json::to_vec(&notification)?;
        self.bus
            .publish(&event_topic(&self.topic, event), Bytes::from(bytes))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::METHOD_NOT_FOUND;
    use crate::service::decode_params;
    use serde_json::json;
    use sphere_bus::InMemoryBroker;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Lamp;

    #[async_trait]
    impl RpcService for Lamp {
        fn methods(&self) -> Vec<String> {
            vec!["set".into(), "get".into()]
        }

        async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            match method {
                "get" => Ok(json!({"on": true})),
                "set" => {
                    let on: bool = decode_params(params)?;
                    Ok(json!(on))
                }
                other => Err(RpcError::MethodNotFound {
                    method: other.to_string(),
                }),
            }
        }
    }

    fn collect(tx: mpsc::UnboundedSender<(String, Value)>) -> MessageHandler {
        Arc::new(move |topic: &str, payload: &[u8]| {
            let value = serde_json::from_slice(payload).unwrap();
            let _ = tx.send((topic.to_string(), value));
        })
    }

    #[tokio::test]
    async fn test_register_discovers_methods() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));

        let endpoint = server
            .register_service(Arc::new(Lamp), "$device/lamp", "http://schema/lamp")
            .await
            .unwrap();

        assert_eq!(endpoint.methods(), ["get".to_string(), "set".to_string()]);
        assert_eq!(endpoint.topic(), "$device/lamp");
        assert_eq!(broker.subscriptions_for("$device/lamp"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_topic_rejected() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));

        server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();
        let err = server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .err()
            .unwrap();

        assert!(matches!(err, RpcError::AlreadyRegistered { .. }));
        assert_eq!(broker.subscriptions_for("$device/lamp"), 1);
    }

    #[tokio::test]
    async fn test_request_gets_reply() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));
        server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();

        let caller = broker.session("caller");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = caller.subscribe("$device/lamp/reply", collect(tx)).await.unwrap();

        let request = Request::new("1", "set", vec![json!(false)]);
        caller
            .publish("$device/lamp", Bytes::from(serde_json::to_vec(&request).unwrap()))
            .await
            .unwrap();

        let (_, reply) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("reply");
        assert_eq!(reply["id"], "1");
        assert_eq!(reply["result"], false);
    }

    #[tokio::test]
    async fn test_unknown_method_error_reply() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));
        server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();

        let caller = broker.session("caller");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = caller.subscribe("$device/lamp/reply", collect(tx)).await.unwrap();

        let request = Request::new(7, "rename", vec![]);
        caller
            .publish("$device/lamp", Bytes::from(serde_json::to_vec(&request).unwrap()))
            .await
            .unwrap();

        let (_, reply) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("reply");
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_event_publishes_notification() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));
        let endpoint = server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();

        let watcher = broker.session("watcher");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = watcher.subscribe("$device/lamp/event/+", collect(tx)).await.unwrap();

        endpoint.send_event("state", vec![json!(true)]).await.unwrap();

        let (topic, event) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(topic, "$device/lamp/event/state");
        assert_eq!(event["method"], "state");
        assert_eq!(event["params"], json!([true]));
        assert!(event["time"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_registration_on_closed_session_fails() {
        let broker = InMemoryBroker::default();
        let session = broker.session("server");
        session.disconnect();
        let server = JsonRpcServer::new(session);

        let err = server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .err()
            .unwrap();

        assert!(matches!(err, RpcError::Transport(_)));
        assert!(!server.unregister("$device/lamp"));
    }

    #[tokio::test]
    async fn test_unregister_stops_answering_and_frees_topic() {
        let broker = InMemoryBroker::default();
        let server = JsonRpcServer::new(broker.session("server"));
        server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();

        assert!(server.unregister("$device/lamp"));
        assert!(!server.unregister("$device/lamp"));
        assert_eq!(broker.subscriptions_for("$device/lamp"), 0);

        // No reply once unregistered
        let caller = broker.session("caller");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = caller.subscribe("$device/lamp/reply", collect(tx)).await.unwrap();
        let request = Request::new("1", "get", vec![]);
        caller
            .publish("$device/lamp", Bytes::from(serde_json::to_vec(&request).unwrap()))
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        // The topic can be registered again
        server
            .register_service(Arc::new(Lamp), "$device/lamp", "s")
            .await
            .unwrap();
        assert_eq!(broker.subscriptions_for("$device/lamp"), 1);
    }
}
