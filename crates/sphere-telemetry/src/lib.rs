//! # Sphere Telemetry
//!
//! Logging and metrics for processes taking part in the service mesh.
//!
//! ## Components
//!
//! - **Logs**: `tracing` subscriber with an `EnvFilter` and a pretty or JSON
//!   console layer
//! - **Metrics**: Prometheus counters, gauges and histograms in one global
//!   registry, rendered by [`gather_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sphere_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::for_service("driver-hue"))
//!         .expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SPHERE_SERVICE_NAME` | `sphere` | Service name in log lines |
//! | `SPHERE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `SPHERE_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `SPHERE_JSON_LOGS` | `false` | JSON log lines (default true in containers) |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::{parse_flag, TelemetryConfig};
pub use metrics::{gather_metrics, register_metrics};
pub use tracing_setup::{env_filter, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Metrics first, so nothing recorded during startup is lost
    register_metrics()?;
    init_tracing(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
