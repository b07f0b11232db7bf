//! # Driver and Hub Choreography
//!
//! Two `Connection`s on one broker: a driver process exporting a device and
//! its channels, and a hub process subscribing to what they emit.
//!
//! ## Flow Tested
//!
//! 1. **Channel event → Hub**: `send_motion` reaches a templated hub
//!    subscription with the device and channel ids captured
//! 2. **Stop on false**: a callback returning `false` sees no later message,
//!    and the broker-side subscription is gone
//! 3. **Module export**: driver announcements carry the module fields

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    use sphere_bus::InMemoryBroker;
    use sphere_connection::{
        Connection, ConnectionConfig, Device, Module, MotionChannel, SubscriptionState,
        TopicValues,
    };
    use sphere_rpc::{RpcError, RpcService};
    use sphere_types::{device_guid, DeviceAnnouncement, ModuleAnnouncement};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn config(serial: &str) -> ConnectionConfig {
        ConnectionConfig {
            mqtt_host: "memory://localhost".to_string(),
            serial: serial.to_string(),
            driver_startup_delay: Duration::ZERO,
            ..ConnectionConfig::default()
        }
    }

    async fn processes(broker: &InMemoryBroker) -> (Connection, Connection) {
        let driver = Connection::connect(broker, config("NODE1")).await.unwrap();
        let hub = Connection::connect(broker, config("NODE1")).await.unwrap();
        (driver, hub)
    }

    /// A PIR sensor exposing one motion channel.
    struct PirSensor;

    #[async_trait]
    impl RpcService for PirSensor {
        fn methods(&self) -> Vec<String> {
            Vec::new()
        }

        async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            Err(RpcError::MethodNotFound {
                method: method.to_string(),
            })
        }
    }

    impl Device for PirSensor {
        fn device_info(&self) -> DeviceAnnouncement {
            DeviceAnnouncement::new("zigbee", "00:17:88:01").with_name("Hallway PIR")
        }
    }

    struct ZigbeeDriver {
        starts: AtomicUsize,
    }

    #[async_trait]
    impl RpcService for ZigbeeDriver {
        fn methods(&self) -> Vec<String> {
            vec!["start".into(), "stop".into()]
        }

        async fn call(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    impl Module for ZigbeeDriver {
        fn module_info(&self) -> ModuleAnnouncement {
            let mut info = ModuleAnnouncement::new("driver-zigbee");
            info.version = Some("1.2.0".to_string());
            info
        }
    }

    // =============================================================================
    // INTEGRATION TESTS: DRIVER → HUB
    // =============================================================================

    #[tokio::test]
    async fn test_motion_reaches_hub_with_topic_values() {
        let broker = InMemoryBroker::default();
        let (driver, hub) = processes(&broker).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(
            "$device/:device/channel/:channel/event/state",
            move |state: bool, values: TopicValues| {
                let _ = tx.send((state, values));
                true
            },
        )
        .await
        .unwrap();

        let sensor = Arc::new(PirSensor);
        let motion = Arc::new(MotionChannel::new());
        driver.export_device(Arc::clone(&sensor)).await.unwrap();
        driver
            .export_channel(sensor.as_ref(), Arc::clone(&motion), "pir")
            .await
            .unwrap();

        motion.send_motion().await;

        let (state, values) = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout waiting for motion")
            .expect("channel closed");
        assert!(state);
        assert_eq!(values["device"], device_guid("zigbee", "00:17:88:01"));
        assert_eq!(values["channel"], "pir");
    }

    #[tokio::test]
    async fn test_callback_false_stops_delivery() {
        let broker = InMemoryBroker::default();
        let (driver, hub) = processes(&broker).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = hub
            .subscribe_raw("sensors/:room/temperature", move |celsius: f64| {
                sink.lock().push(celsius);
                false
            })
            .await
            .unwrap();
        assert!(subscription.is_active());

        // Published back to back so the later ones queue behind the first
        for celsius in [21.0, 21.5, 22.0] {
            driver
                .publish_raw_single_value("sensors/hall/temperature", &celsius)
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(100)).await;

        assert_eq!(seen.lock().as_slice(), &[21.0]);
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
        assert_eq!(broker.subscriptions_for("sensors/+/temperature"), 0);
        assert!(!subscription.cancel(), "cancellation happens once");
    }

    #[tokio::test]
    async fn test_explicit_cancel_stops_delivery() {
        let broker = InMemoryBroker::default();
        let (driver, hub) = processes(&broker).await;

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subscription = hub
            .subscribe("$node/:serial/notify", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();

        driver
            .send_notification("$node/NODE1/notify", vec![json!("first")])
            .await
            .unwrap();
        timeout(Duration::from_secs(1), async {
            while count.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for first notification");

        assert!(subscription.cancel());
        driver
            .send_notification("$node/NODE1/notify", vec![json!("second")])
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_driver_announcement_carries_module_fields() {
        let broker = InMemoryBroker::default();
        let (driver, hub) = processes(&broker).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(
            "$node/:serial/driver/:id/event/announce",
            move |module: ModuleAnnouncement| {
                let _ = tx.send(module);
                true
            },
        )
        .await
        .unwrap();

        let zigbee = Arc::new(ZigbeeDriver {
            starts: AtomicUsize::new(0),
        });
        let exported = driver.export_driver(Arc::clone(&zigbee)).await.unwrap();

        let module = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout waiting for announcement")
            .expect("channel closed");
        assert_eq!(module.id, "driver-zigbee");
        assert_eq!(module.version.as_deref(), Some("1.2.0"));
        assert_eq!(module.service.topic, "$node/NODE1/driver/driver-zigbee");
        assert_eq!(module.service, *exported.announcement());

        // Autostart is off
        assert_eq!(zigbee.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hub_calls_driver_method() {
        let broker = InMemoryBroker::default();
        let (driver, hub) = processes(&broker).await;

        let zigbee = Arc::new(ZigbeeDriver {
            starts: AtomicUsize::new(0),
        });
        let exported = driver.export_driver(Arc::clone(&zigbee)).await.unwrap();

        let client = hub.service_client_from_announcement(exported.announcement());
        assert_eq!(client.supported_methods, ["start", "stop"]);
        client.call::<_, Value>("start", json!({})).await.unwrap();

        assert_eq!(zigbee.starts.load(Ordering::SeqCst), 1);
    }
}
