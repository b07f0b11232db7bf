//! RPC error type and its JSON-RPC error object mapping.

use sphere_bus::TransportError;
use thiserror::Error;

use crate::envelope::ErrorObject;

/// JSON-RPC: invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// JSON-RPC: the method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC: invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// JSON-RPC: internal error.
pub const INTERNAL_ERROR: i32 = -32603;

/// Errors from service registration, calls and event sending.
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    /// The bus refused an operation.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A service is already registered on the topic.
    #[error("A service is already registered on {topic}")]
    AlreadyRegistered { topic: String },

    /// The called method is not exported by the service.
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Parameters could not be read as the expected type.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A value could not be encoded as JSON.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// The remote side answered with an error object.
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// No response arrived in time.
    #[error("Call to {method} on {topic} timed out after {timeout_ms}ms")]
    Timeout {
        topic: String,
        method: String,
        timeout_ms: u64,
    },

    /// Anything else that went wrong inside the service.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Map to the JSON-RPC error object sent back to callers.
    #[must_use]
    pub fn to_error_object(&self) -> ErrorObject {
        let code = match self {
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Remote { code, .. } => *code,
            _ => INTERNAL_ERROR,
        };
        ErrorObject {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<ErrorObject> for RpcError {
    fn from(error: ErrorObject) -> Self {
        Self::Remote {
            code: error.code,
            message: error.message,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let not_found = RpcError::MethodNotFound {
            method: "rename".into(),
        };
        assert_eq!(not_found.to_error_object().code, METHOD_NOT_FOUND);
        assert_eq!(
            RpcError::InvalidParams("bad".into()).to_error_object().code,
            INVALID_PARAMS
        );
        assert_eq!(
            RpcError::Internal("boom".into()).to_error_object().code,
            INTERNAL_ERROR
        );
    }

    #[test]
    fn test_remote_error_roundtrip() {
        let object = ErrorObject {
            code: 42,
            message: "device offline".into(),
            data: None,
        };
        let error = RpcError::from(object);
        assert!(matches!(error, RpcError::Remote { code: 42, .. }));
        assert_eq!(error.to_error_object().code, 42);
    }
}
