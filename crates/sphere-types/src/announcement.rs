//! # Service Announcements
//!
//! The descriptor a service publishes (event `announce`) when it is exported,
//! and the element type of discovery responses.

use serde::{Deserialize, Serialize};

/// Describes an exported service: its schema, topic and capabilities.
///
/// `supported_methods` and `supported_events` are `None` until the exporter
/// fills them in; a published announcement always carries both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAnnouncement {
    /// Schema URI (absolute once exported).
    pub schema: String,

    /// Topic the service is bound to.
    #[serde(default)]
    pub topic: String,

    /// Methods callable through the RPC convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_methods: Option<Vec<String>>,

    /// Events the service may emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_events: Option<Vec<String>>,
}

impl ServiceAnnouncement {
    /// Create an announcement for a schema. Methods and events are left
    /// undeclared.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    /// Declare the supported methods explicitly.
    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Declare the supported events explicitly.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// Supported methods, empty when undeclared.
    #[must_use]
    pub fn methods(&self) -> &[String] {
        self.supported_methods.as_deref().unwrap_or_default()
    }

    /// Supported events, empty when undeclared.
    #[must_use]
    pub fn events(&self) -> &[String] {
        self.supported_events.as_deref().unwrap_or_default()
    }
}

/// Anything that can be published as a service announcement.
///
/// Extended announcements (devices, channels, modules) embed a
/// [`ServiceAnnouncement`] and expose it here so the exporter can fill in the
/// common fields while publishing the full document.
pub trait Announcement: Serialize + Send + Sync + 'static {
    /// The embedded service announcement.
    fn service(&self) -> &ServiceAnnouncement;

    /// Mutable access used while the export is in progress.
    fn service_mut(&mut self) -> &mut ServiceAnnouncement;
}

impl Announcement for ServiceAnnouncement {
    fn service(&self) -> &ServiceAnnouncement {
        self
    }

    fn service_mut(&mut self) -> &mut ServiceAnnouncement {
        self
    }
}
