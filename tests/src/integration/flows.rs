//! # Export and Discovery Flows
//!
//! One process exports services through a `Connection`; a second session on
//! the same broker watches the announcements, queries `$discover` and calls
//! the exported methods.
//!
//! ## Flow Tested
//!
//! 1. **Export → Announce**: every export publishes `announce` on its topic
//! 2. **Announce → Discover**: discovery returns exactly what was announced,
//!    in export order, after the responder's own entry
//! 3. **Call**: a plain RPC client reaches the exported methods

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::time::{sleep, timeout};

    use sphere_bus::{Bus, InMemoryBroker};
    use sphere_connection::{
        Connection, ConnectionConfig, Device, Flavour, SubscriptionManager, DISCOVER_TOPIC,
    };
    use sphere_rpc::{decode_params, RpcError, RpcService, ServiceClient};
    use sphere_types::{DeviceAnnouncement, ServiceAnnouncement};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            mqtt_host: "memory://localhost".to_string(),
            serial: "NODE1".to_string(),
            driver_startup_delay: Duration::ZERO,
            rpc_timeout: Duration::from_secs(2),
            ..ConnectionConfig::default()
        }
    }

    /// A thermostat with a settable target temperature.
    struct Thermostat {
        serial: String,
        target: Mutex<f64>,
    }

    impl Thermostat {
        fn new(serial: &str) -> Arc<Self> {
            Arc::new(Self {
                serial: serial.to_string(),
                target: Mutex::new(20.0),
            })
        }
    }

    #[async_trait]
    impl RpcService for Thermostat {
        fn methods(&self) -> Vec<String> {
            vec!["getTarget".into(), "setTarget".into()]
        }

        async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            match method {
                "getTarget" => Ok(json!(*self.target.lock())),
                "setTarget" => {
                    let target: f64 = decode_params(params)?;
                    *self.target.lock() = target;
                    Ok(Value::Null)
                }
                _ => Err(RpcError::MethodNotFound {
                    method: method.to_string(),
                }),
            }
        }
    }

    impl Device for Thermostat {
        fn device_info(&self) -> DeviceAnnouncement {
            DeviceAnnouncement::new("zwave", &self.serial).with_name("Thermostat")
        }
    }

    /// Wait until `items` holds `count` entries.
    async fn wait_for<T>(items: &Mutex<Vec<T>>, count: usize) {
        timeout(Duration::from_secs(2), async {
            while items.lock().len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for messages");
    }

    // =============================================================================
    // INTEGRATION TESTS: EXPORT → ANNOUNCE → DISCOVER
    // =============================================================================

    #[tokio::test]
    async fn test_discovery_returns_announced_services_in_order() {
        let broker = InMemoryBroker::default();
        let hub: Arc<dyn Bus> = broker.session("hub");

        // Hub watches device announcements
        let announced = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&announced);
        SubscriptionManager::new(Arc::clone(&hub))
            .subscribe(
                "$device/:id/event/announce",
                Flavour::Rpc,
                move |announcement: ServiceAnnouncement| {
                    sink.lock().push(announcement);
                    true
                },
            )
            .await
            .unwrap();

        let conn = Connection::connect(&broker, config()).await.unwrap();
        for serial in ["t-1", "t-2", "t-3"] {
            conn.export_device(Thermostat::new(serial)).await.unwrap();
        }
        wait_for(&announced, 3).await;

        let discovered: Vec<ServiceAnnouncement> =
            ServiceClient::new(hub, DISCOVER_TOPIC, Duration::from_secs(2))
                .call("services", ())
                .await
                .unwrap();

        assert_eq!(discovered.len(), 4, "responder plus three devices");
        assert_eq!(discovered[0].topic, DISCOVER_TOPIC);
        assert_eq!(&discovered[1..], announced.lock().as_slice());
        for announcement in &discovered[1..] {
            assert_eq!(announcement.methods(), ["getTarget", "setTarget"]);
            assert!(announcement.events().is_empty());
        }
    }

    #[tokio::test]
    async fn test_announcement_carries_device_fields() {
        let broker = InMemoryBroker::default();
        let hub: Arc<dyn Bus> = broker.session("hub");

        let announced = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&announced);
        SubscriptionManager::new(hub)
            .subscribe(
                "$device/:id/event/announce",
                Flavour::Rpc,
                move |device: DeviceAnnouncement| {
                    sink.lock().push(device);
                    true
                },
            )
            .await
            .unwrap();

        let conn = Connection::connect(&broker, config()).await.unwrap();
        let exported = conn.export_device(Thermostat::new("t-9")).await.unwrap();
        wait_for(&announced, 1).await;

        let device = announced.lock()[0].clone();
        assert_eq!(device.natural_id, "t-9");
        assert_eq!(device.natural_id_type, "zwave");
        assert_eq!(device.name.as_deref(), Some("Thermostat"));
        assert_eq!(format!("$device/{}", device.id), exported.topic());
        assert_eq!(device.service, *exported.announcement());
    }

    #[tokio::test]
    async fn test_call_exported_device() {
        let broker = InMemoryBroker::default();
        let conn = Connection::connect(&broker, config()).await.unwrap();
        let thermostat = Thermostat::new("t-1");
        let exported = conn.export_device(Arc::clone(&thermostat)).await.unwrap();

        let client = ServiceClient::new(
            broker.session("hub"),
            exported.topic(),
            Duration::from_secs(2),
        );
        client.call::<_, Value>("setTarget", 22.5).await.unwrap();
        let target: f64 = client.call("getTarget", ()).await.unwrap();

        assert_eq!(target, 22.5);
        assert_eq!(*thermostat.target.lock(), 22.5);

        let err = client
            .call::<_, Value>("setTarget", "warm")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote { code, .. } if code == sphere_rpc::error::INVALID_PARAMS
        ));
    }

    #[tokio::test]
    async fn test_failed_export_leaves_others_untouched() {
        let broker = InMemoryBroker::default();
        let hub: Arc<dyn Bus> = broker.session("hub");

        let announced = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = Arc::clone(&announced);
        SubscriptionManager::new(hub)
            .subscribe("thermo/:id/event/announce", Flavour::Rpc, move |a: Value| {
                sink.lock().push(a);
                true
            })
            .await
            .unwrap();

        let conn = Connection::connect(&broker, config()).await.unwrap();

        let err = conn
            .export_service(
                Thermostat::new("bad"),
                "thermo/bad",
                ServiceAnnouncement::new("/service/thermostat")
                    .with_methods(["getTarget", "setTarget", "calibrate"]),
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        conn.export_service(
            Thermostat::new("good"),
            "thermo/good",
            ServiceAnnouncement::new("/service/thermostat").with_methods(["getTarget"]),
        )
        .await
        .unwrap();
        wait_for(&announced, 1).await;

        // Give a stray announce for the failed export time to arrive
        sleep(Duration::from_millis(50)).await;
        let announced = announced.lock();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0]["topic"], "thermo/good");
        assert_eq!(announced[0]["supportedMethods"], json!(["getTarget"]));

        let topics: Vec<String> = conn.registry().query().into_iter().map(|a| a.topic).collect();
        assert_eq!(topics, [DISCOVER_TOPIC, "thermo/good"]);
    }

    #[tokio::test]
    async fn test_exports_are_counted_in_metrics() {
        sphere_telemetry::register_metrics().unwrap();
        let before = sphere_telemetry::metrics::SERVICES_EXPORTED.get();

        let broker = InMemoryBroker::default();
        let conn = Connection::connect(&broker, config()).await.unwrap();
        conn.export_device(Thermostat::new("t-1")).await.unwrap();

        // Other tests export concurrently, so only a lower bound holds
        assert!(sphere_telemetry::metrics::SERVICES_EXPORTED.get() >= before + 2.0);
        let text = sphere_telemetry::gather_metrics().unwrap();
        assert!(text.contains("sphere_export_services_total"));
    }
}
