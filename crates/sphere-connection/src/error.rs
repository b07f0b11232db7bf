//! # Connection Errors
//!
//! | Error | Raised | Handling |
//! |-------|--------|----------|
//! | [`ConfigurationError`] | subscribe / export time | fatal for that call, never retried |
//! | `TransportError` | bus connect / publish / subscribe | recoverable, caller owns retries |
//! | [`DecodeError`] | per message | logged, message dropped |
//! | [`ExportError`] | export time | aborts only that export |
//!
//! A topic that does not fit a template is not an error; it simply does not
//! match.

use sphere_bus::TransportError;
use sphere_rpc::RpcError;
use thiserror::Error;

/// Programmer errors detected when a subscription or export is set up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Topic template must not be empty")]
    EmptyTemplate,

    #[error("Placeholder at segment {position} of '{template}' has no name")]
    EmptyPlaceholder { template: String, position: usize },

    #[error("Placeholder ':{name}' appears more than once in '{template}'")]
    DuplicatePlaceholder { template: String, name: String },

    /// Wildcards are derived from placeholders, never written literally.
    #[error("Segment {position} of '{template}' contains a wildcard character")]
    WildcardInTemplate { template: String, position: usize },

    /// Declared supported methods outnumber what the registrar found.
    #[error(
        "Service on {topic} declares {declared} methods but only {discovered} are exported; \
         check the method names of the service"
    )]
    TooManyMethods {
        topic: String,
        declared: usize,
        discovered: usize,
    },

    /// Declared supported methods name something the service does not export.
    #[error("Service on {topic} declares methods it does not export: {}", .methods.join(", "))]
    UndiscoveredMethods { topic: String, methods: Vec<String> },

    #[error("Channel '{channel_id}' must have a protocol")]
    MissingProtocol { channel_id: String },

    #[error("Module must have an id")]
    MissingModuleId,

    #[error("Invalid schema URI '{uri}': {reason}")]
    InvalidSchemaUri { uri: String, reason: String },
}

/// A payload or envelope that does not have the expected shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The message is not a JSON-RPC envelope.
    #[error("Malformed RPC envelope: {0}")]
    Envelope(String),

    /// The payload does not decode into the callback's type.
    #[error("Cannot decode payload as {target}: {reason}")]
    Payload { target: &'static str, reason: String },
}

/// Failure of one export call.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to register service on {topic}: {source}")]
    Registration {
        topic: String,
        #[source]
        source: RpcError,
    },

    #[error("Failed sending service announcement on {topic}: {source}")]
    Announce {
        topic: String,
        #[source]
        source: RpcError,
    },

    #[error("Failed to autostart {topic}: {source}")]
    Autostart {
        topic: String,
        #[source]
        source: RpcError,
    },
}

/// Errors surfaced by the connection facade.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Failed to encode message for {topic}: {reason}")]
    Encode { topic: String, reason: String },
}

impl ConnectionError {
    /// Check if this error is a programmer error rather than a runtime one.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Export(ExportError::Configuration(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_methods_message() {
        let err = ConfigurationError::TooManyMethods {
            topic: "$device/1".into(),
            declared: 3,
            discovered: 2,
        };
        let message = err.to_string();
        assert!(message.contains("declares 3"));
        assert!(message.contains("only 2"));
    }

    #[test]
    fn test_is_configuration() {
        let direct = ConnectionError::from(ConfigurationError::EmptyTemplate);
        let nested = ConnectionError::from(ExportError::from(ConfigurationError::MissingModuleId));
        let transport = ConnectionError::from(TransportError::Closed {
            client_id: "c".into(),
        });

        assert!(direct.is_configuration());
        assert!(nested.is_configuration());
        assert!(!transport.is_configuration());
    }
}
