//! # Callback Adapter
//!
//! Turns a subscriber's callback into one uniform entry point,
//! `invoke(payload, values) -> bool`, while letting the callback itself be
//! written against its own payload type.
//!
//! ## Accepted Shapes
//!
//! | Shape | Receives |
//! |-------|----------|
//! | `FnMut() -> bool` | nothing |
//! | `FnMut(T) -> bool` | the payload decoded as `T` |
//! | `FnMut(T, TopicValues) -> bool` | the decoded payload and the placeholder values |
//!
//! `T` is any `DeserializeOwned` type (`serde_json::Value` for untyped
//! payloads). The returned `bool` says whether the callback wants more
//! messages.
//!
//! Any other shape fails to compile, so it can never reach the bus:
//!
//! ```compile_fail
//! use sphere_connection::CallbackAdapter;
//!
//! // Three parameters
//! let _ = CallbackAdapter::new(|_a: u32, _b: u32, _c: u32| true);
//! ```
//!
//! ```compile_fail
//! use sphere_connection::CallbackAdapter;
//!
//! // Second parameter is not the placeholder map
//! let _ = CallbackAdapter::new(|_a: u32, _b: String| true);
//! ```
//!
//! ```compile_fail
//! use sphere_connection::CallbackAdapter;
//!
//! // Does not return bool
//! let _ = CallbackAdapter::new(|_a: u32| ());
//! ```
//!
//! ```compile_fail
//! use sphere_connection::CallbackAdapter;
//!
//! // First parameter is not a decode target
//! struct Opaque;
//! let _ = CallbackAdapter::new(|_a: Opaque| true);
//! ```

use std::any::type_name;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::DecodeError;
use crate::template::TopicValues;

/// The shape of a registered callback, computed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackSignature {
    /// Number of parameters (0, 1 or 2).
    pub param_count: u8,
    /// Type name of the decode target, if the callback takes a payload.
    pub payload_type: Option<&'static str>,
    /// Whether the callback receives placeholder values.
    pub includes_placeholders: bool,
}

/// An inbound message body, ready to be decoded.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    /// Body bytes exactly as published.
    Raw(&'a [u8]),
    /// Payload already unwrapped from an RPC envelope.
    Json(Value),
}

impl Payload<'_> {
    fn decode<T: DeserializeOwned>(self) -> Result<T, DecodeError> {
        let result = match self {
            Payload::Raw(bytes) => serde_json::from_slice(bytes),
            Payload::Json(value) => serde_json::from_value(value),
        };
        result.map_err(|e| DecodeError::Payload {
            target: type_name::<T>(),
            reason: e.to_string(),
        })
    }
}

type BareFn = Box<dyn FnMut() -> bool + Send>;
type PayloadFn = Box<dyn FnMut(Payload<'_>) -> Result<bool, DecodeError> + Send>;
type PayloadWithValuesFn =
    Box<dyn FnMut(Payload<'_>, TopicValues) -> Result<bool, DecodeError> + Send>;

enum Invoker {
    Bare(BareFn),
    Payload(PayloadFn),
    PayloadWithValues(PayloadWithValuesFn),
}

/// A callback resolved to one of the accepted shapes.
pub struct CallbackAdapter {
    signature: CallbackSignature,
    invoker: Invoker,
}

impl CallbackAdapter {
    /// Adapt a callback of any accepted shape.
    pub fn new<Args, C: Callback<Args>>(callback: C) -> Self {
        callback.into_adapter()
    }

    #[must_use]
    pub fn signature(&self) -> CallbackSignature {
        self.signature
    }

    /// Decode and invoke.
    ///
    /// # Returns
    ///
    /// The callback's own return value, or `DecodeError` without invoking
    /// it when the payload does not decode.
    pub fn try_invoke(
        &mut self,
        payload: Payload<'_>,
        values: TopicValues,
    ) -> Result<bool, DecodeError> {
        match &mut self.invoker {
            Invoker::Bare(callback) => Ok(callback()),
            Invoker::Payload(callback) => callback(payload),
            Invoker::PayloadWithValues(callback) => callback(payload, values),
        }
    }

    /// Decode and invoke. A payload that does not decode is logged and
    /// reported as "continue".
    pub fn invoke(&mut self, payload: Payload<'_>, values: TopicValues) -> bool {
        self.try_invoke(payload, values).unwrap_or_else(|e| {
            warn!(error = %e, "Dropping message that does not fit the callback");
            true
        })
    }
}

impl fmt::Debug for CallbackAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAdapter")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Implemented for every closure shape a subscription accepts.
///
/// `Args` only disambiguates the implementations; it is inferred from the
/// closure's parameter types.
pub trait Callback<Args>: Send + 'static {
    fn into_adapter(self) -> CallbackAdapter;
}

impl<F> Callback<()> for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn into_adapter(self) -> CallbackAdapter {
        CallbackAdapter {
            signature: CallbackSignature {
                param_count: 0,
                payload_type: None,
                includes_placeholders: false,
            },
            invoker: Invoker::Bare(Box::new(self)),
        }
    }
}

impl<F, T> Callback<(T,)> for F
where
    F: FnMut(T) -> bool + Send + 'static,
    T: DeserializeOwned + 'static,
{
    fn into_adapter(mut self) -> CallbackAdapter {
        CallbackAdapter {
            signature: CallbackSignature {
                param_count: 1,
                payload_type: Some(type_name::<T>()),
                includes_placeholders: false,
            },
            invoker: Invoker::Payload(Box::new(move |payload: Payload<'_>| {
                Ok(self(payload.decode()?))
            })),
        }
    }
}

impl<F, T> Callback<(T, TopicValues)> for F
where
    F: FnMut(T, TopicValues) -> bool + Send + 'static,
    T: DeserializeOwned + 'static,
{
    fn into_adapter(mut self) -> CallbackAdapter {
        CallbackAdapter {
            signature: CallbackSignature {
                param_count: 2,
                payload_type: Some(type_name::<T>()),
                includes_placeholders: true,
            },
            invoker: Invoker::PayloadWithValues(Box::new(move |payload: Payload<'_>, values| {
                Ok(self(payload.decode()?, values))
            })),
        }
    }
}
