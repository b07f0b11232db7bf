//! # Connection
//!
//! One process's handle on the service mesh. Owns the bus session, the RPC
//! server, the discovery registry and everything exported through them.
//!
//! ## Connect
//!
//! 1. Open a bus session at the configured broker address
//! 2. Build the RPC server, schema resolver, exporter and subscription manager
//! 3. Export the discovery responder on `$discover`
//!
//! The responder is therefore the first entry in its own registry.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use sphere_bus::{Bus, BusConnector, TOPIC_SEPARATOR};
use sphere_rpc::{JsonRpcServer, Notification, RpcRegistrar, RpcService, ServiceClient};
use sphere_telemetry::metric_inc;
use sphere_telemetry::metrics::MESSAGES_PUBLISHED;
use sphere_types::{Announcement, ChannelAnnouncement, ServiceAnnouncement};
use tracing::{debug, info};

use crate::adapter::Callback;
use crate::config::ConnectionConfig;
use crate::device::{
    channel_topic, device_topic, module_topic, resolve_device_id, Channel, Device, Module,
};
use crate::discovery::{DiscoveryRegistry, DiscoveryService, DISCOVER_TOPIC};
use crate::error::{ConfigurationError, ConnectionError, ExportError};
use crate::exporter::{ExportedService, ServiceExporter};
use crate::schema::{SchemaResolver, UrlSchemaResolver};
use crate::subscription::{Flavour, Subscription, SubscriptionManager};
use crate::{APP_SCHEMA, DEVICE_SCHEMA, DRIVER_SCHEMA, START_METHOD};

/// A live connection to the service mesh.
pub struct Connection {
    config: ConnectionConfig,
    bus: Arc<dyn Bus>,
    schemas: Arc<dyn SchemaResolver>,
    exporter: ServiceExporter,
    subscriptions: SubscriptionManager,
    registry: Arc<DiscoveryRegistry>,
    discovery: ExportedService,
    // Owns the registrations; dropping it cancels them
    _server: Arc<JsonRpcServer>,
}

impl Connection {
    /// Connect to the broker and export the discovery responder.
    ///
    /// # Arguments
    ///
    /// * `connector` - Bus implementation to open the session with
    /// * `config` - Broker address, client id and export settings
    pub async fn connect(
        connector: &dyn BusConnector,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let address = config.broker_address();
        let bus = connector.connect(&address, &config.client_id).await?;
        info!(address = %address, client_id = %config.client_id, "Connected to broker");

        let server = Arc::new(JsonRpcServer::new(Arc::clone(&bus)));
        let schemas: Arc<dyn SchemaResolver> =
            Arc::new(UrlSchemaResolver::new(&config.schema_root)?);
        let registry = Arc::new(DiscoveryRegistry::new());
        let exporter = ServiceExporter::new(
            Arc::clone(&server) as Arc<dyn RpcRegistrar>,
            Arc::clone(&schemas),
            Arc::clone(&registry),
        );

        let discovery = exporter
            .export(
                Arc::new(DiscoveryService::new(Arc::clone(&registry))),
                DISCOVER_TOPIC,
                DiscoveryService::announcement(),
            )
            .await?;

        Ok(Self {
            subscriptions: SubscriptionManager::new(Arc::clone(&bus)),
            config,
            bus,
            schemas,
            exporter,
            registry,
            discovery,
            _server: server,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.bus.client_id()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The bus session, for traffic outside the mesh conventions.
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    /// Announcements exported through this connection, in export order.
    #[must_use]
    pub fn registry(&self) -> &Arc<DiscoveryRegistry> {
        &self.registry
    }

    /// The exported discovery responder.
    #[must_use]
    pub fn discovery(&self) -> &ExportedService {
        &self.discovery
    }

    /// Subscribe to RPC-style messages; the callback receives the `params`.
    pub async fn subscribe<Args, C: Callback<Args>>(
        &self,
        template: &str,
        callback: C,
    ) -> Result<Subscription, ConnectionError> {
        self.subscriptions
            .subscribe(template, Flavour::Rpc, callback)
            .await
    }

    /// Subscribe to raw messages; the callback receives the body as published.
    pub async fn subscribe_raw<Args, C: Callback<Args>>(
        &self,
        template: &str,
        callback: C,
    ) -> Result<Subscription, ConnectionError> {
        self.subscriptions
            .subscribe(template, Flavour::Raw, callback)
            .await
    }

    /// Export an RPC service on `topic` and announce it.
    pub async fn export_service<A: Announcement>(
        &self,
        service: Arc<dyn RpcService>,
        topic: &str,
        announcement: A,
    ) -> Result<ExportedService, ConnectionError> {
        Ok(self.exporter.export(service, topic, announcement).await?)
    }

    /// Export a device on `$device/{id}`.
    pub async fn export_device<D: Device>(
        &self,
        device: Arc<D>,
    ) -> Result<ExportedService, ConnectionError> {
        let mut announcement = device.device_info();
        let topic = device_topic(resolve_device_id(&mut announcement));
        announcement.service.schema = DEVICE_SCHEMA.to_string();

        self.export_service(device, &topic, announcement).await
    }

    /// Export a channel of `device` on `$device/{deviceId}/channel/{id}`.
    pub async fn export_channel<D: Device, C: Channel>(
        &self,
        device: &D,
        channel: Arc<C>,
        id: &str,
    ) -> Result<ExportedService, ConnectionError> {
        self.export_channel_with_supported(device, channel, id, None, None)
            .await
    }

    /// Like [`Connection::export_channel`], with declared methods and events.
    ///
    /// Declared methods must all be exported by the channel.
    pub async fn export_channel_with_supported<D: Device, C: Channel>(
        &self,
        device: &D,
        channel: Arc<C>,
        id: &str,
        supported_methods: Option<Vec<String>>,
        supported_events: Option<Vec<String>>,
    ) -> Result<ExportedService, ConnectionError> {
        let mut announcement = channel.channel_info(id);
        if announcement.protocol.is_empty() {
            return Err(ConfigurationError::MissingProtocol {
                channel_id: id.to_string(),
            }
            .into());
        }
        announcement.service = ServiceAnnouncement {
            schema: self.schemas.resolve_protocol_uri(&announcement.protocol)?,
            topic: String::new(),
            supported_methods,
            supported_events,
        };

        let mut device_info = device.device_info();
        let topic = channel_topic(&device_topic(resolve_device_id(&mut device_info)), id);

        self.export_service(channel, &topic, announcement).await
    }

    /// Export a channel under an already known device topic,
    /// `{device_topic}/channel/{id}`.
    pub async fn export_channel_with_model(
        &self,
        service: Arc<dyn RpcService>,
        device_topic: &str,
        mut announcement: ChannelAnnouncement,
    ) -> Result<ExportedService, ConnectionError> {
        if announcement.service.schema.is_empty() {
            if announcement.protocol.is_empty() {
                return Err(ConfigurationError::MissingProtocol {
                    channel_id: announcement.id,
                }
                .into());
            }
            announcement.service.schema =
                self.schemas.resolve_protocol_uri(&announcement.protocol)?;
        }
        let topic = channel_topic(device_topic, &announcement.id);

        self.export_service(service, &topic, announcement).await
    }

    /// Export a driver on `$node/{serial}/driver/{id}`.
    ///
    /// Waits the configured start-up delay first, and calls `start` on the
    /// driver afterwards when autostart is on.
    pub async fn export_driver<M: Module>(
        &self,
        driver: Arc<M>,
    ) -> Result<ExportedService, ConnectionError> {
        if !self.config.driver_startup_delay.is_zero() {
            debug!(delay = ?self.config.driver_startup_delay, "Waiting before exporting driver");
            tokio::time::sleep(self.config.driver_startup_delay).await;
        }
        self.export_module(driver, "driver", DRIVER_SCHEMA).await
    }

    /// Export an app on `$node/{serial}/app/{id}`, calling `start` afterwards
    /// when autostart is on.
    pub async fn export_app<M: Module>(
        &self,
        app: Arc<M>,
    ) -> Result<ExportedService, ConnectionError> {
        self.export_module(app, "app", APP_SCHEMA).await
    }

    async fn export_module<M: Module>(
        &self,
        module: Arc<M>,
        kind: &str,
        schema: &str,
    ) -> Result<ExportedService, ConnectionError> {
        let mut announcement = module.module_info();
        if announcement.id.is_empty() {
            return Err(ConfigurationError::MissingModuleId.into());
        }
        announcement.service = ServiceAnnouncement::new(schema);
        let topic = module_topic(&self.config.serial, kind, &announcement.id);

        let exported = self.export_service(module, &topic, announcement).await?;

        if self.config.autostart {
            info!(topic = %topic, kind = kind, "Autostarting");
            self.service_client(&topic)
                .call_with_timeout::<_, Value>(
                    START_METHOD,
                    json!({}),
                    self.config.autostart_timeout,
                )
                .await
                .map_err(|source| ExportError::Autostart {
                    topic: topic.clone(),
                    source,
                })?;
        }

        Ok(exported)
    }

    /// Publish `values` as a JSON array.
    pub async fn publish_raw(&self, topic: &str, values: &[Value]) -> Result<(), ConnectionError> {
        self.publish_json(topic, values).await
    }

    /// Publish one value as is.
    pub async fn publish_raw_single_value<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<(), ConnectionError> {
        self.publish_json(topic, value).await
    }

    /// Publish a JSON-RPC notification on `topic`. The method is the topic's
    /// last segment.
    pub async fn send_notification(
        &self,
        topic: &str,
        params: Vec<Value>,
    ) -> Result<(), ConnectionError> {
        let method = topic.rsplit(TOPIC_SEPARATOR).next().unwrap_or(topic);
        self.publish_json(topic, &Notification::new(method, params))
            .await
    }

    async fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<(), ConnectionError> {
        let body = serde_json::to_vec(value).map_err(|e| ConnectionError::Encode {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.bus.publish(topic, Bytes::from(body)).await?;
        metric_inc!(MESSAGES_PUBLISHED);
        Ok(())
    }

    /// RPC client for the service on `topic`.
    #[must_use]
    pub fn service_client(&self, topic: &str) -> ServiceClient {
        ServiceClient::new(Arc::clone(&self.bus), topic, self.config.rpc_timeout)
    }

    /// RPC client for an announced service, carrying its capabilities.
    #[must_use]
    pub fn service_client_from_announcement(
        &self,
        announcement: &ServiceAnnouncement,
    ) -> ServiceClient {
        self.service_client(&announcement.topic).with_capabilities(
            announcement.methods().to_vec(),
            announcement.events().to_vec(),
        )
    }
}
