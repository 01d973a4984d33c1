//! # Certflow
//!
//! A certificate lifecycle controller: it watches ingress-style routing
//! rules in a cluster, issues TLS certificates for their declared hosts
//! through a pluggable backend, and keeps the certificate secrets the
//! routing layer serves from fresh.
//!
//! ## Architecture
//!
//! - [`cert`]: the [`Certifier`] contract, its three backends (Vault CSR
//!   signing, local self-signing, ACME passthrough) and the expiry-aware
//!   [`CertificateCache`].
//! - [`cluster`]: the [`cluster::ClusterClient`] collaborator trait and its
//!   REST adapter.
//! - [`reconcile`]: the watch- and timer-driven [`Reconciler`].
//! - [`observability`]: tracing setup, Prometheus metrics and the injected
//!   [`observability::ReconcileObserver`] event sink.
//! - [`config`]: command-line settings.

pub mod cert;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod observability;
pub mod reconcile;

pub use cert::{CertificateCache, Certifier};
pub use errors::{Error, Result};
pub use reconcile::Reconciler;

/// Crate version, stamped into logs at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name used in logs.
pub const APP_NAME: &str = "certflow";
