//! Prometheus metrics for workshop-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Engine command counter by command and outcome.
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_commands_total",
        "Total number of engine commands",
        &["command", "status"]
    )
    .expect("Failed to register commands_total")
});

/// Engine command duration histogram by command.
pub static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "workshop_command_duration_seconds",
        "Engine command duration in seconds",
        &["command"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register command_duration")
});

/// Status transitions by target status.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_transitions_total",
        "Total number of status transitions",
        &["status"] // diagnosis, repair, completed
    )
    .expect("Failed to register transitions_total")
});

/// Invoices generated by membership tier.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_invoices_total",
        "Total number of invoices by membership",
        &["membership"]
    )
    .expect("Failed to register invoices_total")
});

/// Invoiced amount by currency.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_invoice_amount_total",
        "Total invoiced amount by currency",
        &["currency"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Payments recorded by method and status.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_payments_total",
        "Total number of payments by method and status",
        &["method", "status"]
    )
    .expect("Failed to register payments_total")
});

/// Vehicles handed back.
pub static DISPATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_dispatches_total",
        "Total number of vehicle dispatches",
        &["outcome"]
    )
    .expect("Failed to register dispatches_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Notifications that were given up on.
pub static NOTIFICATION_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_notification_failures_total",
        "Total number of undelivered notifications by kind",
        &["kind"]
    )
    .expect("Failed to register notification_failures_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&COMMANDS_TOTAL);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&TRANSITIONS_TOTAL);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&DISPATCHES_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&NOTIFICATION_FAILURES_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
