use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PAYMENT_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_VERIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_OVERDUE_SWEPT_TOTAL: OnceLock<IntCounter> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let transitions_counter = IntCounterVec::new(
        Opts::new(
            "payment_transitions_total",
            "Payment status transitions by resulting status",
        ),
        &["status"],
    )
    .expect("Failed to create payment_transitions_total metric");

    let verifications_counter = IntCounterVec::new(
        Opts::new(
            "payment_verifications_total",
            "Gateway signature verifications by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create payment_verifications_total metric");

    let swept_counter = IntCounter::new(
        "payment_overdue_swept_total",
        "Payments moved to OVERDUE by the periodic sweep",
    )
    .expect("Failed to create payment_overdue_swept_total metric");

    registry
        .register(Box::new(transitions_counter.clone()))
        .expect("Failed to register payment_transitions_total");
    registry
        .register(Box::new(verifications_counter.clone()))
        .expect("Failed to register payment_verifications_total");
    registry
        .register(Box::new(swept_counter.clone()))
        .expect("Failed to register payment_overdue_swept_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    PAYMENT_TRANSITIONS_TOTAL
        .set(transitions_counter)
        .expect("Failed to set payment_transitions_total");
    PAYMENT_VERIFICATIONS_TOTAL
        .set(verifications_counter)
        .expect("Failed to set payment_verifications_total");
    PAYMENT_OVERDUE_SWEPT_TOTAL
        .set(swept_counter)
        .expect("Failed to set payment_overdue_swept_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record status transitions actually written by the lifecycle, labeled
/// by the resulting status. No-op counts are not recorded.
pub fn record_transition(status: &str, count: u64) {
    if let Some(counter) = PAYMENT_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[status]).inc_by(count);
    }
}

/// Record a gateway verification outcome.
pub fn record_verification(outcome: &str) {
    if let Some(counter) = PAYMENT_VERIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record payments moved to OVERDUE by a sweep run.
pub fn record_swept(count: u64) {
    if let Some(counter) = PAYMENT_OVERDUE_SWEPT_TOTAL.get() {
        counter.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transitions_counter() -> &'static IntCounterVec {
        PAYMENT_TRANSITIONS_TOTAL.get_or_init(|| {
            IntCounterVec::new(
                Opts::new(
                    "payment_transitions_total",
                    "Payment status transitions by resulting status",
                ),
                &["status"],
            )
            .unwrap()
        })
    }

    #[test]
    fn transitions_increment_by_applied_count_only() {
        let counter = transitions_counter();
        // Label unused by any production path, so parallel tests cannot
        // interfere with the reads below.
        let label = "GUARD_CHECK";
        let before = counter.with_label_values(&[label]).get();

        record_transition(label, 3);
        // A sweep that applied nothing records nothing.
        record_transition(label, 0);

        assert_eq!(counter.with_label_values(&[label]).get(), before + 3);
    }
}
