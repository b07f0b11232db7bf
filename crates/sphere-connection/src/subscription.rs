//! # Subscriptions
//!
//! Lifecycle and delivery discipline of one topic subscription.
//!
//! ## States
//!
//! ```text
//! CREATED ──bus subscribe ok──▶ ACTIVE ──callback false / cancel()──▶ CANCELLED
//!    │                                                                    ▲
//!    └──────────────────── callback false / cancel() ─────────────────────┘
//! ```
//!
//! CANCELLED is terminal and reached exactly once; reaching it tears down the
//! broker-side subscription.
//!
//! ## Delivery
//!
//! Per inbound message:
//! 1. Match the topic against the template (mismatch: drop)
//! 2. RPC flavour: unwrap the envelope's `params`; raw flavour: body as is
//! 3. Invoke the adapted callback under the subscription's delivery lock
//!
//! The delivery lock allows one invocation at a time and is held until the
//! callback's "cancel?" decision has been applied, so a message queued
//! behind the one whose callback returned `false` is never delivered.
//! Subscriptions never share a lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sphere_bus::{Bus, BusSubscription, MessageHandler};
use sphere_rpc::read_params;
use sphere_telemetry::metrics::{
    ACTIVE_SUBSCRIPTIONS, CALLBACK_DURATION, DROP_CANCELLED, DROP_DECODE, DROP_NO_MATCH,
    MESSAGES_DELIVERED, MESSAGES_DROPPED,
};
use sphere_telemetry::{metric_inc, time_histogram};
use tracing::{debug, trace, warn};

use crate::adapter::{Callback, CallbackAdapter, Payload};
use crate::error::{ConnectionError, DecodeError};
use crate::template::TopicTemplate;

/// How inbound bodies are turned into callback payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    /// Bodies are JSON-RPC envelopes; the callback receives the `params`.
    Rpc,
    /// Bodies are handed to the callback verbatim.
    Raw,
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    Created = 0,
    Active = 1,
    Cancelled = 2,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            _ => Self::Cancelled,
        }
    }
}

struct Shared {
    template: TopicTemplate,
    flavour: Flavour,
    state: AtomicU8,
    /// In-flight marker: held for the whole of one invocation.
    delivery: Mutex<CallbackAdapter>,
    /// Broker-side handle, present once the bus subscribe returned.
    handle: Mutex<Option<Box<dyn BusSubscription>>>,
}

impl Shared {
    fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn deliver(&self, topic: &str, body: &[u8]) {
        if self.state() == SubscriptionState::Cancelled {
            metric_inc!(MESSAGES_DROPPED, &[DROP_CANCELLED]);
            return;
        }

        let Some(values) = self.template.matches(topic) else {
            trace!(template = %self.template, topic = topic, "Topic does not match template");
            metric_inc!(MESSAGES_DROPPED, &[DROP_NO_MATCH]);
            return;
        };

        let payload = match self.flavour {
            Flavour::Raw => Payload::Raw(body),
            Flavour::Rpc => match read_params(body) {
                Ok(params) => Payload::Json(params),
                Err(e) => {
                    let error = DecodeError::Envelope(e.to_string());
                    warn!(topic = topic, error = %error, "Failed to read parameters");
                    metric_inc!(MESSAGES_DROPPED, &[DROP_DECODE]);
                    return;
                }
            },
        };

        let mut adapter = self.delivery.lock();
        // The previous invocation may have cancelled while this one waited
        if self.state() == SubscriptionState::Cancelled {
            metric_inc!(MESSAGES_DROPPED, &[DROP_CANCELLED]);
            return;
        }

        let _timer = time_histogram!(CALLBACK_DURATION);
        match adapter.try_invoke(payload, values) {
            Ok(true) => metric_inc!(MESSAGES_DELIVERED),
            Ok(false) => {
                metric_inc!(MESSAGES_DELIVERED);
                debug!(template = %self.template, "Callback asked to stop receiving");
                self.cancel();
            }
            Err(e) => {
                warn!(topic = topic, error = %e, "Dropping message that does not fit the callback");
                metric_inc!(MESSAGES_DROPPED, &[DROP_DECODE]);
            }
        }
    }

    /// Move to CANCELLED and tear down the broker side. Returns false when
    /// already cancelled.
    fn cancel(&self) -> bool {
        let previous = SubscriptionState::from_u8(
            self.state
                .swap(SubscriptionState::Cancelled as u8, Ordering::AcqRel),
        );
        match previous {
            SubscriptionState::Cancelled => return false,
            SubscriptionState::Active => ACTIVE_SUBSCRIPTIONS.dec(),
            SubscriptionState::Created => {}
        }

        if let Some(handle) = self.handle.lock().take() {
            handle.cancel();
        }
        debug!(template = %self.template, "Subscription cancelled");
        true
    }

    /// Store the broker handle and move CREATED -> ACTIVE, unless a
    /// cancellation got there first.
    fn activate(&self, handle: Box<dyn BusSubscription>) {
        *self.handle.lock() = Some(handle);

        let activated = self
            .state
            .compare_exchange(
                SubscriptionState::Created as u8,
                SubscriptionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if activated {
            ACTIVE_SUBSCRIPTIONS.inc();
        } else if let Some(handle) = self.handle.lock().take() {
            // Cancelled before the handle existed
            handle.cancel();
        }
    }
}

/// Handle to a subscription.
///
/// Cloning shares the subscription. Dropping the handle does not cancel it.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    /// Stop delivery and release the broker-side subscription.
    ///
    /// Idempotent. An invocation already running finishes; nothing is
    /// delivered afterwards. Safe to call from inside the callback.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    #[must_use]
    pub fn template(&self) -> &TopicTemplate {
        &self.shared.template
    }

    #[must_use]
    pub fn flavour(&self) -> Flavour {
        self.shared.flavour
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("template", &self.shared.template.as_str())
            .field("flavour", &self.shared.flavour)
            .field("state", &self.state())
            .finish()
    }
}

/// Creates subscriptions on one bus session.
pub struct SubscriptionManager {
    bus: Arc<dyn Bus>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    /// Subscribe `callback` to every topic matching `template`.
    ///
    /// # Arguments
    ///
    /// * `template` - Topic template, placeholders written `:name`
    /// * `flavour` - Whether bodies are RPC envelopes or raw payloads
    /// * `callback` - Any accepted callback shape (see [`crate::adapter`])
    ///
    /// # Errors
    ///
    /// `Configuration` for a malformed template, `Transport` when the bus
    /// refuses the subscription.
    pub async fn subscribe<Args, C>(
        &self,
        template: &str,
        flavour: Flavour,
        callback: C,
    ) -> Result<Subscription, ConnectionError>
    where
        C: Callback<Args>,
    {
        let template = TopicTemplate::parse(template)?;
        let adapter = CallbackAdapter::new(callback);
        let filter = template.to_broker_filter();

        debug!(
            template = %template,
            filter = %filter,
            params = adapter.signature().param_count,
            "Subscribing"
        );

        let shared = Arc::new(Shared {
            template,
            flavour,
            state: AtomicU8::new(SubscriptionState::Created as u8),
            delivery: Mutex::new(adapter),
            handle: Mutex::new(None),
        });

        let delivering = Arc::clone(&shared);
        let handler: MessageHandler =
            Arc::new(move |topic: &str, body: &[u8]| delivering.deliver(topic, body));

        let handle = self.bus.subscribe(&filter, handler).await?;
        shared.activate(handle);

        Ok(Subscription { shared })
    }
}
