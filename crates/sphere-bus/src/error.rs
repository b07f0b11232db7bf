//! # Transport Errors
//!
//! Failures of the bus collaborator. All of them are recoverable from the
//! caller's point of view; retry policy belongs to the caller.

use thiserror::Error;

/// Errors from bus connect, publish and subscribe operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The session was disconnected.
    #[error("Bus session {client_id} is closed")]
    Closed { client_id: String },

    /// Connecting to the broker failed.
    #[error("Failed to connect to {address} as {client_id}: {reason}")]
    ConnectFailed {
        address: String,
        client_id: String,
        reason: String,
    },

    /// The topic or filter is not well formed.
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// The broker refused or dropped a publish.
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The broker refused a subscription.
    #[error("Subscribe to '{filter}' failed: {reason}")]
    SubscribeFailed { filter: String, reason: String },
}

impl TransportError {
    /// Shorthand for an invalid topic error.
    pub fn invalid_topic(topic: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}
