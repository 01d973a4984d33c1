//! Prometheus metrics collection.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::{ObservabilityConfig, ReconcileObserver};
use crate::errors::{Error, Result};

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::config(format!("failed to install metrics exporter: {}", e)))
}

/// Records controller metrics through the `metrics` facade.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance.
    pub fn new() -> Self {
        Self
    }
}

/// Reduce a host to its registrable domain for low-cardinality labels.
fn registered_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}

impl ReconcileObserver for MetricsRecorder {
    fn certificate_issued(&self, namespace: &str, host: &str) {
        let labels = [
            ("namespace", namespace.to_string()),
            ("registered_domain", registered_domain(host)),
        ];
        counter!("certflow_certificates_issued_total", &labels).increment(1);
    }

    fn certificate_failed(&self, namespace: &str, host: &str) {
        let labels = [("namespace", namespace.to_string()), ("host", host.to_string())];
        counter!("certflow_certificate_errors_total", &labels).increment(1);
    }

    fn pass_completed(&self, namespace: &str, name: &str, succeeded: usize, failed: usize) {
        let labels = [("namespace", namespace.to_string()), ("name", name.to_string())];
        counter!("certflow_reconcile_passes_total", &labels).increment(1);
        gauge!("certflow_reconcile_bindings_succeeded", &labels).set(succeeded as f64);
        gauge!("certflow_reconcile_bindings_failed", &labels).set(failed as f64);
    }
}
