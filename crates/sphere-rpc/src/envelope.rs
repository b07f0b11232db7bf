//! # JSON-RPC 2.0 Envelope
//!
//! Requests, responses and notifications as they travel over bus topics.
//!
//! ## Topic Conventions
//!
//! | Message | Topic |
//! |---------|-------|
//! | Request | `{service topic}` |
//! | Response | `{service topic}/reply` |
//! | Event (notification) | `{service topic}/event/{event name}` |

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Build the topic responses for `topic` are published on.
#[must_use]
pub fn reply_topic(topic: &str) -> String {
    format!("{topic}/reply")
}

/// Build the topic an event named `event` of `topic` is published on.
#[must_use]
pub fn event_topic(topic: &str, event: &str) -> String {
    format!("{topic}/event/{event}")
}

/// A method call. `id` is absent for fire-and-forget calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a request with positional params.
    #[must_use]
    pub fn new(id: impl Into<Value>, method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params: Some(Value::Array(params)),
        }
    }
}

/// Result of a call, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Build a response from a call outcome.
    #[must_use]
    pub fn from_result(id: Value, result: Result<Value, ErrorObject>) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
            error,
        }
    }

    /// Split into the call outcome. A response with neither field is a
    /// successful `null`.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An event or other one-way message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    /// Milliseconds since the Unix epoch when the notification was built.
    pub time: u64,
}

impl Notification {
    /// Create a notification stamped with the current time.
    #[must_use]
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            time,
        }
    }
}

/// Unwrap positional params: a single-element array yields its element,
/// anything else is passed through. Missing params read as `null`.
#[must_use]
pub fn unwrap_params(params: Option<Value>) -> Value {
    match params {
        Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
        Some(value) => value,
        None => Value::Null,
    }
}

/// Read the inner payload of an RPC-flavoured message.
///
/// Fails when the body is not a JSON object envelope.
pub fn read_params(payload: &[u8]) -> Result<Value, serde_json::Error> {
    // Only `params` matters to subscribers
    let mut envelope: Map<String, Value> = serde_json::from_slice(payload)?;
    Ok(unwrap_params(envelope.remove("params")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topics() {
        assert_eq!(reply_topic("$device/1"), "$device/1/reply");
        assert_eq!(event_topic("$device/1", "announce"), "$device/1/event/announce");
    }

    #[test]
    fn test_read_params_unwraps_single_element() {
        let payload = serde_json::to_vec(&Notification::new("state", vec![json!(true)])).unwrap();
        assert_eq!(read_params(&payload).unwrap(), json!(true));
    }

    #[test]
    fn test_read_params_keeps_multiple_elements() {
        let payload = br#"{"jsonrpc":"2.0","method":"m","params":[1,2]}"#;
        assert_eq!(read_params(payload).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_read_params_missing_is_null() {
        let payload = br#"{"jsonrpc":"2.0","method":"m"}"#;
        assert_eq!(read_params(payload).unwrap(), Value::Null);
    }

    #[test]
    fn test_read_params_rejects_non_envelope() {
        assert!(read_params(b"not json").is_err());
        assert!(read_params(b"[1,2,3]").is_err());
        assert!(read_params(b"[5]").is_err());
        assert!(read_params(b"5").is_err());
    }

    #[test]
    fn test_response_into_result() {
        let ok = Response::from_result(json!("a"), Ok(json!(5)));
        assert_eq!(ok.into_result().unwrap(), json!(5));

        let err = Response::from_result(
            json!("b"),
            Err(ErrorObject {
                code: -1,
                message: "nope".into(),
                data: None,
            }),
        );
        assert_eq!(err.into_result().unwrap_err().code, -1);
    }
}
