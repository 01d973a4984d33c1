//! # Observability Infrastructure
//!
//! Structured logging via the tracing ecosystem and Prometheus metrics via
//! the `metrics` facade. The reconciliation engine never touches metrics
//! directly; it reports through the narrow [`ReconcileObserver`] interface
//! injected at construction, which [`MetricsRecorder`] implements.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsRecorder};

use crate::errors::Result;

/// Observability configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,
    /// Whether to expose the Prometheus scrape endpoint.
    pub enable_metrics: bool,
    /// Port for the Prometheus scrape endpoint.
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false, enable_metrics: true, metrics_port: 9090 }
    }
}

impl ObservabilityConfig {
    /// Read observability settings from `CERTFLOW_LOG`, `CERTFLOW_LOG_JSON`,
    /// `CERTFLOW_METRICS` and `CERTFLOW_METRICS_PORT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("CERTFLOW_LOG").unwrap_or(defaults.log_level),
            json_logs: env_flag("CERTFLOW_LOG_JSON", defaults.json_logs),
            enable_metrics: env_flag("CERTFLOW_METRICS", defaults.enable_metrics),
            metrics_port: std::env::var("CERTFLOW_METRICS_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

/// Initialize logging and, when enabled, the metrics exporter.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    if config.enable_metrics {
        init_metrics(config)?;
    }
    tracing::info!(
        log_level = %config.log_level,
        metrics_enabled = config.enable_metrics,
        "observability initialized"
    );
    Ok(())
}

/// Event sink for reconciliation outcomes.
///
/// Injected into the engine at construction so success and failure counts
/// land wherever the embedder wants them, rather than in process-wide
/// globals.
pub trait ReconcileObserver: Send + Sync {
    /// A certificate was issued and its secret persisted.
    fn certificate_issued(&self, namespace: &str, host: &str);

    /// Issuance or persistence failed for one binding.
    fn certificate_failed(&self, namespace: &str, host: &str);

    /// A reconciliation pass over one route set finished.
    fn pass_completed(&self, namespace: &str, name: &str, succeeded: usize, failed: usize);
}
