//! Structured logging setup.

use tracing_subscriber::EnvFilter;

use super::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured default filter.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::config(format!("failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_not_reentrant() {
        let config = ObservabilityConfig::default();
        // First install may succeed or fail depending on test ordering;
        // a second install in the same process must fail cleanly.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
