//! Prometheus metrics for Sphere participants.
//!
//! All metrics follow the naming convention: `sphere_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

/// Drop reason label: the topic did not match the subscription template.
pub const DROP_NO_MATCH: &str = "no_match";
/// Drop reason label: the payload or its envelope failed to decode.
pub const DROP_DECODE: &str = "decode";
/// Drop reason label: the subscription was already cancelled.
pub const DROP_CANCELLED: &str = "cancelled";

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Messages published through a connection
    pub static ref MESSAGES_PUBLISHED: Counter = Counter::new(
        "sphere_bus_messages_published_total",
        "Total messages published through connections"
    ).expect("metric creation failed");

    /// Messages handed to subscription callbacks
    pub static ref MESSAGES_DELIVERED: Counter = Counter::new(
        "sphere_subscription_messages_delivered_total",
        "Total messages delivered to subscription callbacks"
    ).expect("metric creation failed");

    /// Messages dropped before reaching a callback
    pub static ref MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("sphere_subscription_messages_dropped_total", "Messages dropped by reason"),
        &["reason"]  // no_match, decode, cancelled
    ).expect("metric creation failed");

    /// Live subscriptions
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge = Gauge::new(
        "sphere_subscription_active",
        "Subscriptions currently delivering"
    ).expect("metric creation failed");

    /// Time spent inside subscription callbacks
    pub static ref CALLBACK_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sphere_subscription_callback_duration_seconds",
            "Time spent in subscription callbacks"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // EXPORT METRICS
    // =========================================================================

    /// Services exported successfully
    pub static ref SERVICES_EXPORTED: Counter = Counter::new(
        "sphere_export_services_total",
        "Total services exported"
    ).expect("metric creation failed");

    /// Exports that failed
    pub static ref EXPORT_FAILURES: Counter = Counter::new(
        "sphere_export_failures_total",
        "Total failed service exports"
    ).expect("metric creation failed");

    /// Events that could not be published
    pub static ref EMIT_FAILURES: Counter = Counter::new(
        "sphere_export_emit_failures_total",
        "Total event emissions that failed to publish"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bus
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(MESSAGES_DELIVERED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
        Box::new(CALLBACK_DURATION.clone()),
        // Export
        Box::new(SERVICES_EXPORTED.clone()),
        Box::new(EXPORT_FAILURES.clone()),
        Box::new(EMIT_FAILURES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_dropped_by_reason() {
        MESSAGES_DROPPED.with_label_values(&[DROP_DECODE]).inc();
        assert!(MESSAGES_DROPPED.with_label_values(&[DROP_DECODE]).get() >= 1.0);
    }

    #[test]
    fn test_gather_contains_registered_metrics() {
        register_metrics().unwrap();
        SERVICES_EXPORTED.inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("sphere_export_services_total"));
    }

    #[test]
    fn test_histogram_timer() {
        let before = CALLBACK_DURATION.get_sample_count();
        {
            let _timer = HistogramTimer::new(&CALLBACK_DURATION);
        }
        assert!(CALLBACK_DURATION.get_sample_count() > before);
    }
}
