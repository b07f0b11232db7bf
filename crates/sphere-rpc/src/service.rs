//! # RPC Services and Event Emitters
//!
//! The object side of an export: something that answers method calls and,
//! optionally, emits events through its topic once it has been exported.
//!
//! ## Event Capability
//!
//! A service declares how it emits events by returning one of the closed
//! set of [`EventCapability`] variants. The exporter binds a sink into the
//! emitter exactly once; emitting before that is a logged no-op.
//!
//! ```text
//! ┌──────────┐ emit(event, payload) ┌──────────┐ publish ┌─────────────────────────┐
//! │ Emitter  │ ───────────────────▶ │  Sink    │ ──────▶ │ {topic}/event/{event}   │
//! └──────────┘                      └──────────┘         └─────────────────────────┘
//! ```

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::envelope::unwrap_params;
use crate::error::RpcError;

/// An object exported as an RPC service.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Names of the methods this service answers.
    fn methods(&self) -> Vec<String>;

    /// Handle one call. `params` is the request's positional params array
    /// (or `null` when the request carried none).
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// How this service emits events. Defaults to not at all.
    fn event_capability(&self) -> EventCapability {
        EventCapability::None
    }
}

/// Decode call params into `T`, unwrapping a single positional argument.
pub fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(unwrap_params(Some(params)))
        .map_err(|e| RpcError::InvalidParams(e.to_string()))
}

/// Destination of emitted events, bound by whoever exported the service.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit `event` with positional payload values. Failures are handled
    /// (logged) by the sink and never reach the emitting service.
    async fn emit(&self, event: &str, payload: Vec<Value>);
}

type SinkSlot = Arc<OnceLock<Arc<dyn EventSink>>>;

fn bind_slot(slot: &SinkSlot, sink: Arc<dyn EventSink>) -> bool {
    slot.set(sink).is_ok()
}

/// Emitter taking exactly one payload per event.
#[derive(Clone, Default)]
pub struct SingleEmitter {
    slot: SinkSlot,
}

impl SingleEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the service has been exported and events will be published.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Emit `event` carrying `payload`.
    pub async fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) {
        let Some(sink) = self.slot.get() else {
            warn!(event = event, "Event emitted before the service was exported");
            return;
        };
        match serde_json::to_value(payload) {
            Ok(value) => sink.emit(event, vec![value]).await,
            Err(e) => warn!(event = event, error = %e, "Failed to encode event payload"),
        }
    }
}

/// Emitter taking any number of payload values per event.
#[derive(Clone, Default)]
pub struct VariadicEmitter {
    slot: SinkSlot,
}

impl VariadicEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Emit `event` carrying `payload` as positional values.
    pub async fn emit(&self, event: &str, payload: Vec<Value>) {
        let Some(sink) = self.slot.get() else {
            warn!(event = event, "Event emitted before the service was exported");
            return;
        };
        sink.emit(event, payload).await;
    }
}

/// How a service emits events.
#[derive(Clone, Default)]
pub enum EventCapability {
    /// The service never emits.
    #[default]
    None,
    /// One payload per event.
    SinglePayload(SingleEmitter),
    /// Any number of payload values per event.
    VariadicPayload(VariadicEmitter),
}

impl EventCapability {
    /// Bind `sink` into the emitter.
    ///
    /// # Returns
    ///
    /// `false` when there is nothing to bind or the emitter was already bound
    /// by an earlier export.
    pub fn bind(&self, sink: Arc<dyn EventSink>) -> bool {
        match self {
            Self::None => false,
            Self::SinglePayload(emitter) => bind_slot(&emitter.slot, sink),
            Self::VariadicPayload(emitter) => bind_slot(&emitter.slot, sink),
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SinglePayload(_) => "single-payload",
            Self::VariadicPayload(_) => "variadic-payload",
        }
    }
}
