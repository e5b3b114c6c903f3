//! Prometheus metrics for background work
//!
//! Provides observability into task accounting, queue throughput and
//! reported errors.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops. Failing to
/// install the recorder only disables metrics.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_ok() {
                info!("Prometheus metrics initialized");
            }
        }
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled"),
    }
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Delivery outcome label for dispatched jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Record a task being registered with the supervisor
pub fn record_task_registered(task: &str) {
    counter!("background_tasks_registered_total", "task" => task.to_string()).increment(1);
}

/// Record a registration refused because shutdown is draining
pub fn record_task_rejected(task: &str) {
    counter!("background_tasks_rejected_total", "task" => task.to_string()).increment(1);
}

/// Update the in-flight task gauge
pub fn set_active_tasks(active: usize) {
    gauge!("background_tasks_active").set(active as f64);
}

/// Record a job accepted by a dispatch queue
pub fn record_job_enqueued(queue: &'static str) {
    counter!("dispatch_jobs_enqueued_total", "queue" => queue).increment(1);
}

/// Record the outcome of one dispatch attempt
pub fn record_job_processed(queue: &'static str, status: DeliveryStatus) {
    counter!(
        "dispatch_jobs_processed_total",
        "queue" => queue,
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record an error report by origin
pub fn record_error_report(origin: &str) {
    counter!("error_sink_reports_total", "origin" => origin.to_string()).increment(1);
}
