//! Schema URI resolution and (optional) payload validation.

use serde_json::Value;
use url::Url;

use crate::error::ConfigurationError;

/// Root every relative schema URI is resolved against.
pub const DEFAULT_SCHEMA_ROOT: &str = "http://schema.ninjablocks.com/";

/// Path, relative to the schema root, channel protocols live under.
pub const PROTOCOL_PATH: &str = "protocol/";

/// Resolves and validates schemas.
pub trait SchemaResolver: Send + Sync {
    /// Normalize a schema URI to an absolute one.
    fn resolve_uri(&self, uri: &str) -> Result<String, ConfigurationError>;

    /// Resolve a channel protocol name (e.g. `motion`) to its schema URI.
    fn resolve_protocol_uri(&self, protocol: &str) -> Result<String, ConfigurationError>;

    /// Validate `payload` against `schema`.
    ///
    /// # Returns
    ///
    /// One message per violation; empty when valid or validation is disabled.
    fn validate(&self, _schema: &str, _payload: &Value) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves URIs against fixed roots. Does not validate.
#[derive(Debug, Clone)]
pub struct UrlSchemaResolver {
    root: Url,
    protocol_root: Url,
}

impl UrlSchemaResolver {
    /// Create a resolver rooted at `root`.
    pub fn new(root: &str) -> Result<Self, ConfigurationError> {
        let root = parse(root, Url::parse(root))?;
        let protocol_root = parse(PROTOCOL_PATH, root.join(PROTOCOL_PATH))?;
        Ok(Self {
            root,
            protocol_root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &str {
        self.root.as_str()
    }
}

fn parse(uri: &str, result: Result<Url, url::ParseError>) -> Result<Url, ConfigurationError> {
    result.map_err(|e| ConfigurationError::InvalidSchemaUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}

impl SchemaResolver for UrlSchemaResolver {
    fn resolve_uri(&self, uri: &str) -> Result<String, ConfigurationError> {
        parse(uri, self.root.join(uri)).map(String::from)
    }

    fn resolve_protocol_uri(&self, protocol: &str) -> Result<String, ConfigurationError> {
        parse(protocol, self.protocol_root.join(protocol)).map(String::from)
    }
}
