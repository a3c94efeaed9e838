//! Prometheus metrics for the ferry server.
//!
//! Exposes counters for the upload lifecycle, transfer volume and the
//! expiry sweeper.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no upload ids or file names, only aggregate usage.
//! Restrict the endpoint to scraper IPs at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload lifecycle
pub static UPLOADS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ferry_uploads_created_total", "Total number of uploads created")
        .expect("metric creation failed")
});

pub static FILES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_files_ingested_total",
        "Total number of files successfully ingested",
    )
    .expect("metric creation failed")
});

pub static BYTES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_bytes_ingested_total",
        "Total bytes of successfully ingested files",
    )
    .expect("metric creation failed")
});

pub static INGEST_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_ingest_failures_total", "Total ingest failures by reason"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static INGEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "ferry_ingest_duration_seconds",
            "Time taken to stream one file into storage",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_downloads_completed_total",
        "Total number of file downloads streamed to completion",
    )
    .expect("metric creation failed")
});

pub static ONE_SHOT_CONSUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_one_shot_consumed_total",
        "Total number of one-shot files marked downloaded",
    )
    .expect("metric creation failed")
});

pub static FILES_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ferry_files_removed_total", "Total number of explicit file removals")
        .expect("metric creation failed")
});

// Sweeper
pub static SWEEPER_CYCLES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ferry_sweeper_cycles_total", "Total number of sweep passes")
        .expect("metric creation failed")
});

pub static UPLOADS_PURGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_uploads_purged_total",
        "Total number of expired uploads purged from both backends",
    )
    .expect("metric creation failed")
});

pub static SWEEPER_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_sweeper_errors_total",
        "Total number of failed purge steps during sweeps",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
/// This allows safe use in integration tests or when embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_INGESTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_INGESTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ONE_SHOT_CONSUMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_REMOVED.clone()))
            .expect("metric registration failed");

        // Sweeper metrics
        REGISTRY
            .register(Box::new(SWEEPER_CYCLES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_PURGED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SWEEPER_ERRORS.clone()))
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

/// Helper to record ingest failures by reason.
pub fn record_ingest_failure(reason: &str) {
    INGEST_FAILURES.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // This would panic if any metric creation failed
        register_metrics();
        register_metrics();
    }

    #[tokio::test]
    async fn test_metrics_handler_exposes_counters() {
        register_metrics();
        record_ingest_failure("size_limit");

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ferry_ingest_failures_total"));
        assert!(text.contains("size_limit"));
    }
}
