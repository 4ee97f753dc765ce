//! Prometheus metrics for the Portall server.
//!
//! Covers certificate sync, alert delivery and background job health.
//!
//! The `/metrics` endpoint is unauthenticated. Counters carry source names and
//! job types only, never certificate names or hosts, but they still reveal
//! inventory size. Restrict it to the Prometheus scraper at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Sync metrics
pub static SYNC_RECORDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "portall_sync_records_total",
            "Certificate records processed by sync, by source and outcome",
        ),
        &["source", "outcome"],
    )
    .expect("metric creation failed")
});

pub static SYNC_SOURCE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "portall_sync_source_failures_total",
            "Sync runs in which a source could not be read",
        ),
        &["source"],
    )
    .expect("metric creation failed")
});

// Alert metrics
pub static ALERT_NOTIFICATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "portall_alert_notifications_total",
            "Expiry alert notifications by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Job metrics
pub static JOB_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("portall_job_runs_total", "Background job runs by type and final state"),
        &["job_type", "state"],
    )
    .expect("metric creation failed")
});

pub static JOB_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "portall_job_duration_seconds",
            "Background job duration by type and state",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0]),
        &["job_type", "state"],
    )
    .expect("metric creation failed")
});

pub static JOBS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "portall_jobs_active",
        "Number of currently active background jobs (queued + running)",
    )
    .expect("metric creation failed")
});

pub static JOBS_PANICKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "portall_jobs_panicked_total",
        "Total number of background jobs that panicked",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(SYNC_RECORDS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SYNC_SOURCE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ALERT_NOTIFICATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOBS_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOBS_PANICKED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record sync outcomes for one source.
pub fn record_sync(source: &str, outcome: &str, count: u64) {
    if count > 0 {
        SYNC_RECORDS
            .with_label_values(&[source, outcome])
            .inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_record_sync_skips_zero() {
        let before = SYNC_RECORDS.with_label_values(&["sql", "created"]).get();
        record_sync("sql", "created", 0);
        record_sync("sql", "created", 3);
        assert_eq!(
            SYNC_RECORDS.with_label_values(&["sql", "created"]).get(),
            before + 3
        );
    }
}
