//! # Runtime Configuration
//!
//! Command-line flags via clap, with environment fallbacks for cluster
//! connection details. Vault connection settings come separately from the
//! conventional `VAULT_*` environment through
//! [`crate::cert::VaultConfig::from_env`].

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::cert::DEFAULT_KEY_STRENGTH;
use crate::errors::{Error, Result};

/// Conventional in-cluster service-account token location.
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Which certificate backend the controller issues through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Sign locally-generated CSRs through Vault's PKI engine.
    Delegated,
    /// Self-sign locally. Development and testing only.
    SelfSigned,
}

/// Controller settings, parsed from the command line.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "certflow",
    version,
    about = "Certificate lifecycle controller for ingress-style TLS bindings"
)]
pub struct Settings {
    /// Certificate backend.
    #[arg(long, value_enum, default_value_t = Backend::Delegated)]
    pub backend: Backend,

    /// Certificate validity period, e.g. "240h", "90m" or "10d".
    #[arg(long, default_value = "240h", value_parser = parse_ttl)]
    pub ttl: Duration,

    /// Synthesize a TLS binding for every declared routing host that
    /// lacks one.
    #[arg(long)]
    pub force_tls: bool,

    /// RSA key strength in bits for locally generated keys.
    #[arg(long, default_value_t = DEFAULT_KEY_STRENGTH)]
    pub key_strength: u32,

    /// Contact email recorded in certificate signing requests. Omitted
    /// from the CSR when empty.
    #[arg(long, default_value = "")]
    pub email: String,

    /// Upper bound on a single backend issuance call, e.g. "30s".
    /// Unbounded when omitted.
    #[arg(long, value_parser = parse_ttl)]
    pub backend_timeout: Option<Duration>,

    /// Base URL of the cluster API server. Falls back to
    /// `CERTFLOW_CLUSTER_URL`.
    #[arg(long)]
    pub cluster_url: Option<String>,

    /// Bearer token for the cluster API. Falls back to
    /// `CERTFLOW_CLUSTER_TOKEN`, then to the in-cluster service-account
    /// token file.
    #[arg(long)]
    pub cluster_token: Option<String>,
}

impl Settings {
    /// Resolve the cluster API base URL from the flag or environment.
    pub fn resolve_cluster_url(&self) -> Result<String> {
        if let Some(url) = &self.cluster_url {
            return Ok(url.clone());
        }
        std::env::var("CERTFLOW_CLUSTER_URL").map_err(|_| {
            Error::config("cluster API URL required: pass --cluster-url or set CERTFLOW_CLUSTER_URL")
        })
    }

    /// Resolve the cluster bearer token, if any source provides one.
    pub fn resolve_cluster_token(&self) -> Option<String> {
        if let Some(token) = &self.cluster_token {
            return Some(token.clone());
        }
        if let Ok(token) = std::env::var("CERTFLOW_CLUSTER_TOKEN") {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
        std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

/// Parse a duration like "240h", "90m", "30s" or "10d". A bare number is
/// taken as seconds.
pub fn parse_ttl(value: &str) -> Result<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::config("duration must not be empty"));
    }

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let count: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid duration {:?}", value)))?;

    let secs = match unit {
        "s" => Some(count),
        "m" => count.checked_mul(60),
        "h" => count.checked_mul(3_600),
        "d" => count.checked_mul(86_400),
        other => {
            return Err(Error::config(format!(
                "unknown duration unit {:?} in {:?} (expected s, m, h or d)",
                other, value
            )))
        }
    };

    secs.map(Duration::from_secs)
        .ok_or_else(|| Error::config(format!("duration {:?} is too large", value)))
}
