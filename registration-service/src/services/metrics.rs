use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if METRICS_HANDLE.set(handle).is_err() {
                tracing::debug!("Metrics handle already set");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            return;
        }
    }

    metrics::describe_counter!("teams_created_total", "Teams created on first registration");
    metrics::describe_counter!("orders_created_total", "Gateway orders opened, by gateway");
    metrics::describe_counter!("orders_failed_total", "Gateway order creation failures");
    metrics::describe_counter!(
        "reconciliations_total",
        "Reconciliation runs by resulting state and trigger"
    );
    metrics::describe_counter!(
        "payment_signature_rejected_total",
        "Checkout verifications with a bad signature"
    );
    metrics::describe_counter!(
        "payment_callbacks_rejected_total",
        "Gateway callbacks that failed authentication"
    );
    metrics::describe_counter!("notifications_sent_total", "Emails delivered, by kind");
    metrics::describe_counter!("notifications_failed_total", "Emails abandoned after retries");
    metrics::describe_counter!("notifications_dropped_total", "Emails dropped on a full queue");
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}
