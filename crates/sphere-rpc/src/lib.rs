//! # Sphere RPC - Request/Response Over Bus Topics
//!
//! JSON-RPC 2.0 layered on plain publish/subscribe topics:
//!
//! - **Registrar** ([`RpcRegistrar`]): binds service objects to topics and
//!   reports the methods it found on them
//! - **Server** ([`JsonRpcServer`]): the in-process registrar answering
//!   requests and publishing events as notifications
//! - **Client** ([`ServiceClient`]): correlated calls with per-call timeouts
//! - **Emitters** ([`EventCapability`]): how a service sends events once
//!   it is exported
//!
//! ## Wire Format
//!
//! | Direction | Topic | Body |
//! |-----------|-------|------|
//! | Call | `{topic}` | `{"jsonrpc":"2.0","id":..,"method":..,"params":[..]}` |
//! | Reply | `{topic}/reply` | `{"jsonrpc":"2.0","id":..,"result":..}` or `"error":{..}` |
//! | Event | `{topic}/event/{name}` | `{"jsonrpc":"2.0","method":name,"params":[..],"time":ms}` |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod registrar;
pub mod server;
pub mod service;

// Re-export main types
pub use client::ServiceClient;
pub use correlation::CorrelationId;
pub use envelope::{
    event_topic, read_params, reply_topic, unwrap_params, ErrorObject, Notification, Request,
    Response,
};
pub use error::RpcError;
pub use pending::PendingCallStore;
pub use registrar::{RpcRegistrar, ServiceEndpoint};
pub use server::JsonRpcServer;
pub use service::{
    decode_params, EventCapability, EventSink, RpcService, SingleEmitter, VariadicEmitter,
};

/// Default timeout for service calls.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
