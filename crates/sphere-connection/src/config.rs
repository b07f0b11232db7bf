//! Connection configuration from environment variables.

use std::env;
use std::time::Duration;

use sphere_telemetry::parse_flag;
use uuid::Uuid;

use crate::schema::DEFAULT_SCHEMA_ROOT;
use crate::{DEFAULT_AUTOSTART_TIMEOUT_MS, DEFAULT_DRIVER_STARTUP_DELAY_MS};

/// Settings for one [`crate::Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker host
    pub mqtt_host: String,

    /// Broker port
    pub mqtt_port: u16,

    /// Client id presented to the broker
    pub client_id: String,

    /// Serial of the node this process runs on (used in driver and app topics)
    pub serial: String,

    /// Wait before exporting a driver
    pub driver_startup_delay: Duration,

    /// Call `start` on drivers and apps right after exporting them
    pub autostart: bool,

    /// Default timeout of calls made through service clients
    pub rpc_timeout: Duration,

    /// Timeout of the autostart `start` call
    pub autostart_timeout: Duration,

    /// Root relative schema URIs are resolved against
    pub schema_root: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            client_id: generate_client_id(),
            serial: "unknown".to_string(),
            driver_startup_delay: Duration::from_millis(DEFAULT_DRIVER_STARTUP_DELAY_MS),
            autostart: false,
            rpc_timeout: Duration::from_millis(sphere_rpc::DEFAULT_CALL_TIMEOUT_MS),
            autostart_timeout: Duration::from_millis(DEFAULT_AUTOSTART_TIMEOUT_MS),
            schema_root: DEFAULT_SCHEMA_ROOT.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SPHERE_MQTT_HOST`: Broker host (default: localhost)
    /// - `SPHERE_MQTT_PORT`: Broker port (default: 1883)
    /// - `SPHERE_CLIENT_ID`: Client id (default: generated)
    /// - `SPHERE_SERIAL`: Node serial (default: unknown)
    /// - `SPHERE_DRIVER_STARTUP_DELAY_MS`: Driver start-up delay (default: 3000)
    /// - `SPHERE_AUTOSTART`: Autostart drivers and apps (default: false)
    /// - `SPHERE_RPC_TIMEOUT_MS`: Client call timeout (default: 10000)
    /// - `SPHERE_SCHEMA_ROOT`: Schema root URI
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            mqtt_host: env::var("SPHERE_MQTT_HOST").unwrap_or(defaults.mqtt_host),

            mqtt_port: env::var("SPHERE_MQTT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.mqtt_port),

            client_id: env::var("SPHERE_CLIENT_ID")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.client_id),

            serial: env::var("SPHERE_SERIAL").unwrap_or(defaults.serial),

            driver_startup_delay: millis_from_env("SPHERE_DRIVER_STARTUP_DELAY_MS")
                .unwrap_or(defaults.driver_startup_delay),

            autostart: env::var("SPHERE_AUTOSTART")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(false),

            rpc_timeout: millis_from_env("SPHERE_RPC_TIMEOUT_MS").unwrap_or(defaults.rpc_timeout),

            autostart_timeout: defaults.autostart_timeout,

            schema_root: env::var("SPHERE_SCHEMA_ROOT").unwrap_or(defaults.schema_root),
        }
    }

    /// Address handed to the bus connector.
    #[must_use]
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.mqtt_host, self.mqtt_port)
    }
}

fn millis_from_env(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_millis)
}

fn generate_client_id() -> String {
    format!("sphere-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.broker_address(), "localhost:1883");
        assert_eq!(config.driver_startup_delay, Duration::from_secs(3));
        assert_eq!(config.autostart_timeout, Duration::from_secs(20));
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert!(!config.autostart);
        assert_eq!(config.schema_root, "http://schema.ninjablocks.com/");
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let a = ConnectionConfig::default();
        let b = ConnectionConfig::default();

        assert!(a.client_id.starts_with("sphere-"));
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_broker_address_for_memory_host() {
        let config = ConnectionConfig {
            mqtt_host: "memory://localhost".to_string(),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.broker_address(), "memory://localhost:1883");
    }
}
