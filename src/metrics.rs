//! Prometheus metrics for the deadline scanner.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Counters are updated by the scan pass and the emitter.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram, CounterVec, Encoder,
    Histogram, TextEncoder,
};

use crate::models::notification::{NotificationType, Priority};

pub struct ScanMetrics {
    emitted_total: CounterVec,
    suppressed_total: CounterVec,
    failures_total: CounterVec,
    pass_duration_seconds: Histogram,
}

/// Registered once in the global Prometheus registry.
pub static SCAN_METRICS: Lazy<ScanMetrics> = Lazy::new(ScanMetrics::register);

impl ScanMetrics {
    fn register() -> Self {
        let emitted_total = register_counter_vec!(
            opts!("notifier_notifications_emitted_total", "Notifications written to the store"),
            &["type", "priority"]
        )
        .expect("failed to register notifier_notifications_emitted_total");

        let suppressed_total = register_counter_vec!(
            opts!(
                "notifier_notifications_suppressed_total",
                "Alerts dropped by the duplicate guard or a store conflict"
            ),
            &["type", "reason"]
        )
        .expect("failed to register notifier_notifications_suppressed_total");

        let failures_total = register_counter_vec!(
            opts!("notifier_scan_failures_total", "Per-item or per-source scan failures"),
            &["source"]
        )
        .expect("failed to register notifier_scan_failures_total");

        let pass_duration_seconds = register_histogram!(histogram_opts!(
            "notifier_scan_duration_seconds",
            "Wall time of one scan pass in seconds",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        ))
        .expect("failed to register notifier_scan_duration_seconds");

        Self {
            emitted_total,
            suppressed_total,
            failures_total,
            pass_duration_seconds,
        }
    }

    pub fn emitted(&self, r#type: NotificationType, priority: Priority) {
        self.emitted_total
            .with_label_values(&[r#type.as_str(), priority.as_str()])
            .inc();
    }

    /// `reason` is "guard" or "conflict".
    pub fn suppressed(&self, r#type: NotificationType, reason: &str) {
        self.suppressed_total
            .with_label_values(&[r#type.as_str(), reason])
            .inc();
    }

    pub fn failed(&self, source: &str) {
        self.failures_total.with_label_values(&[source]).inc();
    }

    pub fn observe_pass(&self, seconds: f64) {
        self.pass_duration_seconds.observe(seconds);
    }
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        SCAN_METRICS.emitted(NotificationType::Task, Priority::High);
        SCAN_METRICS.suppressed(NotificationType::Task, "guard");
        SCAN_METRICS.failed("tasks");
        let output = encode_metrics();
        assert!(output.contains("notifier_notifications_emitted_total"));
        assert!(output.contains("notifier_scan_failures_total"));
    }
}
