//! # In-Memory Broker
//!
//! Single-process implementation of the bus. Sessions created from the same
//! broker see each other's publishes, which is enough to run several
//! "processes" of the mesh inside one test or one hub binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::topic::{filter_matches, validate_filter, validate_publish_topic};
use crate::transport::{Bus, BusConnector, BusSubscription, MessageHandler};

/// Address reported by brokers created with [`InMemoryBroker::default`].
pub const DEFAULT_BROKER_ADDRESS: &str = "memory://localhost:1883";

/// A message on its way to one subscription.
#[derive(Clone)]
struct Delivery {
    topic: Arc<str>,
    payload: Bytes,
}

/// Broker-side state of one subscription.
struct Route {
    filter: String,
    client_id: String,
    sender: mpsc::UnboundedSender<Delivery>,
    active: Arc<AtomicBool>,
}

struct BrokerInner {
    address: String,
    routes: RwLock<HashMap<u64, Route>>,
    next_route_id: AtomicU64,
    messages_published: AtomicU64,
}

impl BrokerInner {
    fn remove_route(&self, route_id: u64) {
        if let Some(route) = self.routes.write().remove(&route_id) {
            route.active.store(false, Ordering::Release);
            debug!(
                filter = %route.filter,
                client_id = %route.client_id,
                "Subscription removed from broker"
            );
        }
    }
}

/// In-memory publish/subscribe broker.
///
/// Cloning is cheap; clones share the same routing table.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create a broker reachable at `address`.
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                address: address.to_string(),
                routes: RwLock::new(HashMap::new()),
                next_route_id: AtomicU64::new(1),
                messages_published: AtomicU64::new(0),
            }),
        }
    }

    /// Open a session without going through [`BusConnector`].
    #[must_use]
    pub fn session(&self, client_id: &str) -> Arc<InMemorySession> {
        Arc::new(InMemorySession {
            client_id: client_id.to_string(),
            broker: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
            route_ids: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// The address sessions must connect to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Number of live subscriptions across all sessions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.routes.read().len()
    }

    /// Number of live subscriptions using exactly `filter`.
    #[must_use]
    pub fn subscriptions_for(&self, filter: &str) -> usize {
        self.inner
            .routes
            .read()
            .values()
            .filter(|route| route.filter == filter)
            .count()
    }

    /// Total publishes accepted by the broker.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.inner.messages_published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_ADDRESS)
    }
}

#[async_trait]
impl BusConnector for InMemoryBroker {
    async fn connect(
        &self,
        address: &str,
        client_id: &str,
    ) -> Result<Arc<dyn Bus>, TransportError> {
        if address != self.inner.address {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                client_id: client_id.to_string(),
                reason: format!("no broker listening (broker is {})", self.inner.address),
            });
        }
        if client_id.is_empty() {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                client_id: String::new(),
                reason: "client id must not be empty".to_string(),
            });
        }

        debug!(address = address, client_id = client_id, "Session connected");
        Ok(self.session(client_id))
    }
}

/// A client session on an [`InMemoryBroker`].
pub struct InMemorySession {
    client_id: String,
    broker: Arc<BrokerInner>,
    closed: AtomicBool,
    /// Live routes opened by this session (for cleanup on disconnect).
    route_ids: Arc<Mutex<Vec<u64>>>,
}

impl InMemorySession {
    /// Close the session and tear down all of its subscriptions.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let route_ids = std::mem::take(&mut *self.route_ids.lock());
        for route_id in route_ids {
            self.broker.remove_route(route_id);
        }
        debug!(client_id = %self.client_id, "Session disconnected");
    }

    /// Check if the session was disconnected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed {
                client_id: self.client_id.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for InMemorySession {
    async fn subscribe(
        &self,
        filter: &str,
        handler: MessageHandler,
    ) -> Result<Box<dyn BusSubscription>, TransportError> {
        self.ensure_open()?;
        validate_filter(filter)?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();
        let active = Arc::new(AtomicBool::new(true));
        let route_id = self.broker.next_route_id.fetch_add(1, Ordering::Relaxed);

        // One delivery task per subscription keeps messages in publish order.
        let task_active = Arc::clone(&active);
        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                if !task_active.load(Ordering::Acquire) {
                    break;
                }
                handler(&delivery.topic, &delivery.payload);
            }
        });

        self.broker.routes.write().insert(
            route_id,
            Route {
                filter: filter.to_string(),
                client_id: self.client_id.clone(),
                sender,
                active: Arc::clone(&active),
            },
        );
        self.route_ids.lock().push(route_id);

        debug!(filter = filter, client_id = %self.client_id, "Subscribed");

        Ok(Box::new(InMemorySubscription {
            route_id,
            filter: filter.to_string(),
            broker: Arc::clone(&self.broker),
            session_routes: Arc::clone(&self.route_ids),
        }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_publish_topic(topic)?;

        self.broker.messages_published.fetch_add(1, Ordering::Relaxed);

        let delivery = Delivery {
            topic: Arc::from(topic),
            payload,
        };

        let mut receivers = 0usize;
        {
            let routes = self.broker.routes.read();
            for route in routes.values() {
                if !route.active.load(Ordering::Acquire) || !filter_matches(&route.filter, topic) {
                    continue;
                }
                // A closed receiver means the route is being torn down
                if route.sender.send(delivery.clone()).is_ok() {
                    receivers += 1;
                }
            }
        }

        trace!(
            topic = topic,
            client_id = %self.client_id,
            receivers = receivers,
            "Published"
        );
        Ok(())
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Handle returned by [`InMemorySession::subscribe`].
struct InMemorySubscription {
    route_id: u64,
    filter: String,
    broker: Arc<BrokerInner>,
    session_routes: Arc<Mutex<Vec<u64>>>,
}

impl BusSubscription for InMemorySubscription {
    fn cancel(&self) {
        self.session_routes.lock().retain(|id| *id != self.route_id);
        self.broker.remove_route(self.route_id);
    }

    fn filter(&self) -> &str {
        &self.filter
    }
}
