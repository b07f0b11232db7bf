//! # Service Exporter
//!
//! Makes an object callable on a topic and tells the mesh about it.
//!
//! ## Export Steps
//!
//! 1. Resolve the announcement's schema URI
//! 2. Register the service with the RPC registrar (yields its methods)
//! 3. Adopt the discovered methods, or check the declared ones are among them
//! 4. Default the supported events to none
//! 5. Set the announcement's topic
//! 6. Publish the `announce` event on the topic
//! 7. Bind the service's event emitter to the topic
//! 8. Record the announcement for discovery
//!
//! A failed step aborts only this export. Nothing is published or recorded
//! when the declared methods do not fit, and a failure after step 2 releases
//! the topic again so the export can be retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sphere_rpc::{EventSink, RpcError, RpcRegistrar, RpcService, ServiceEndpoint};
use sphere_telemetry::metric_inc;
use sphere_telemetry::metrics::{
    EMIT_FAILURES, EXPORT_FAILURES, MESSAGES_PUBLISHED, SERVICES_EXPORTED,
};
use sphere_types::{Announcement, ServiceAnnouncement};
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryRegistry;
use crate::error::{ConfigurationError, ExportError};
use crate::schema::SchemaResolver;
use crate::ANNOUNCE_EVENT;

/// A service bound to its topic.
#[derive(Clone)]
pub struct ExportedService {
    announcement: ServiceAnnouncement,
    endpoint: Arc<dyn ServiceEndpoint>,
}

impl ExportedService {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.announcement.topic
    }

    /// The announcement as published.
    #[must_use]
    pub fn announcement(&self) -> &ServiceAnnouncement {
        &self.announcement
    }

    /// Send an event through the service's topic.
    pub async fn send_event(&self, event: &str, payload: Vec<Value>) -> Result<(), RpcError> {
        self.endpoint.send_event(event, payload).await
    }
}

impl std::fmt::Debug for ExportedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedService")
            .field("announcement", &self.announcement)
            .finish_non_exhaustive()
    }
}

/// Event sink publishing through an exported service's endpoint.
///
/// Publish failures are logged and counted; the emitting service never sees
/// them.
struct EndpointSink {
    endpoint: Arc<dyn ServiceEndpoint>,
}

#[async_trait]
impl EventSink for EndpointSink {
    async fn emit(&self, event: &str, payload: Vec<Value>) {
        match self.endpoint.send_event(event, payload).await {
            Ok(()) => metric_inc!(MESSAGES_PUBLISHED),
            Err(e) => {
                warn!(
                    topic = %self.endpoint.topic(),
                    event = event,
                    error = %e,
                    "Event failed to send"
                );
                metric_inc!(EMIT_FAILURES);
            }
        }
    }
}

/// Declared methods must be a subset of the discovered ones.
fn check_declared(
    topic: &str,
    declared: &[String],
    discovered: &[String],
) -> Result<(), ConfigurationError> {
    if declared.len() > discovered.len() {
        return Err(ConfigurationError::TooManyMethods {
            topic: topic.to_string(),
            declared: declared.len(),
            discovered: discovered.len(),
        });
    }

    let unknown: Vec<String> = declared
        .iter()
        .filter(|method| !discovered.contains(method))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigurationError::UndiscoveredMethods {
            topic: topic.to_string(),
            methods: unknown,
        });
    }
    Ok(())
}

/// Exports services for one connection.
pub struct ServiceExporter {
    registrar: Arc<dyn RpcRegistrar>,
    schemas: Arc<dyn SchemaResolver>,
    registry: Arc<DiscoveryRegistry>,
}

impl ServiceExporter {
    #[must_use]
    pub fn new(
        registrar: Arc<dyn RpcRegistrar>,
        schemas: Arc<dyn SchemaResolver>,
        registry: Arc<DiscoveryRegistry>,
    ) -> Self {
        Self {
            registrar,
            schemas,
            registry,
        }
    }

    #[must_use]
    pub fn schemas(&self) -> &Arc<dyn SchemaResolver> {
        &self.schemas
    }

    /// Export `service` on `topic`, announcing it with `announcement`.
    ///
    /// # Arguments
    ///
    /// * `service` - The object answering calls
    /// * `topic` - Concrete topic to bind
    /// * `announcement` - Service or extended (device, channel, module)
    ///   announcement. Its `supported_methods`, when set, may only name
    ///   methods the registrar finds on the service.
    ///
    /// # Returns
    ///
    /// The exported service, whose announcement is what was published.
    pub async fn export<A: Announcement>(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        announcement: A,
    ) -> Result<ExportedService, ExportError> {
        let result = self.export_inner(service, topic, announcement).await;
        if let Err(e) = &result {
            warn!(topic = topic, error = %e, "Export failed");
            metric_inc!(EXPORT_FAILURES);
        }
        result
    }

    async fn export_inner<A: Announcement>(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        mut announcement: A,
    ) -> Result<ExportedService, ExportError> {
        let schema = self.schemas.resolve_uri(&announcement.service().schema)?;
        announcement.service_mut().schema = schema.clone();

        let capability = service.event_capability();
        let endpoint = self
            .registrar
            .register_service(service, topic, &schema)
            .await
            .map_err(|source| ExportError::Registration {
                topic: topic.to_string(),
                source,
            })?;

        if let Err(e) = self.announce(&endpoint, topic, &schema, &mut announcement).await {
            // Un-announced services must not keep the topic
            self.registrar.unregister(topic);
            return Err(e);
        }

        let sink: Arc<dyn EventSink> = Arc::new(EndpointSink {
            endpoint: Arc::clone(&endpoint),
        });
        if capability.bind(sink) {
            debug!(topic = topic, emitter = capability.kind(), "Event emitter bound");
        }

        let announcement = announcement.service().clone();
        self.registry.record(announcement.clone());
        metric_inc!(SERVICES_EXPORTED);

        info!(
            topic = topic,
            schema = %announcement.schema,
            methods = %announcement.methods().join(", "),
            "Exported service"
        );

        Ok(ExportedService {
            announcement,
            endpoint,
        })
    }

    /// Complete the announcement from the registered endpoint and publish it.
    async fn announce<A: Announcement>(
        &self,
        endpoint: &Arc<dyn ServiceEndpoint>,
        topic: &str,
        schema: &str,
        announcement: &mut A,
    ) -> Result<(), ExportError> {
        let service_part = announcement.service_mut();
        match &service_part.supported_methods {
            Some(declared) => check_declared(topic, declared, endpoint.methods())?,
            None => service_part.supported_methods = Some(endpoint.methods().to_vec()),
        }

        service_part.supported_events.get_or_insert_with(Vec::new);
        service_part.topic = topic.to_string();

        let payload = serde_json::to_value(&*announcement).map_err(|e| ExportError::Announce {
            topic: topic.to_string(),
            source: e.into(),
        })?;
        for violation in self.schemas.validate(schema, &payload) {
            warn!(
                topic = topic,
                schema = schema,
                violation = %violation,
                "Announcement does not match its schema"
            );
        }

        endpoint
            .send_event(ANNOUNCE_EVENT, vec![payload])
            .await
            .map_err(|source| ExportError::Announce {
                topic: topic.to_string(),
                source,
            })?;
        metric_inc!(MESSAGES_PUBLISHED);
        Ok(())
    }
}
