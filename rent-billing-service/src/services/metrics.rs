//! Prometheus metrics for rent-billing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Invoice counter by status transition applied.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoices_total",
        "Total number of invoices by status",
        &["status"] // draft, pending, sent, viewed, paid, cancelled, refunded
    )
    .expect("Failed to register invoices_total")
});

/// Recurring generation run counter by outcome.
pub static GENERATION_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_generation_runs_total",
        "Total number of recurring generation runs by outcome",
        &["outcome"] // completed, failed
    )
    .expect("Failed to register generation_runs_total")
});

/// Invoices created by recurring generation.
pub static GENERATED_INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_generated_invoices_total",
        "Invoices created by the recurring generation job",
        &["result"] // created, skipped
    )
    .expect("Failed to register generated_invoices_total")
});

/// Bulk action counter.
pub static BULK_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_bulk_actions_total",
        "Total number of bulk actions by action",
        &["action"]
    )
    .expect("Failed to register bulk_actions_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&GENERATION_RUNS_TOTAL);
    Lazy::force(&GENERATED_INVOICES_TOTAL);
    Lazy::force(&BULK_ACTIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
