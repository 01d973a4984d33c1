//! # Error Handling
//!
//! Error taxonomy for the certflow controller, built on `thiserror`.
//!
//! The variants mirror how failures propagate through a reconciliation pass:
//! a `Signing` or `Parse` error skips one binding and the batch continues,
//! a `Persist` error aborts the current pass (the next trigger retries),
//! and `NothingToDo` is a skip condition rather than a failure.

use thiserror::Error;

/// Result type used throughout certflow.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the certflow controller.
#[derive(Error, Debug)]
pub enum Error {
    /// A route set has no TLS bindings and forced-TLS mode is off.
    /// This is a skip condition, never logged as a failure.
    #[error("nothing to do for {namespace}/{name}: no TLS bindings declared")]
    NothingToDo { namespace: String, name: String },

    /// A routing-rule or secret write failed. The current pass aborts and
    /// the next watch event or resync tick retries.
    #[error("failed to persist {what}: {message}")]
    Persist { what: String, message: String },

    /// The issuing backend rejected the request or failed to produce a
    /// certificate for a host. Skips the affected binding only.
    #[error("failed to obtain certificate for {host}: {message}")]
    Signing { host: String, message: String },

    /// A backend returned malformed PEM or X.509 material. Treated the same
    /// as a signing failure by the reconciliation engine.
    #[error("malformed certificate material: {message}")]
    Parse { message: String },

    /// A TLS handshake arrived without a server name. The handshake is
    /// rejected before the certificate cache is consulted.
    #[error("cannot select a certificate without TLS SNI (no server name was indicated)")]
    MissingSni,

    /// Reading from the cluster API failed (list/get). Fatal to the current
    /// sweep; the next periodic tick retries.
    #[error("cluster API error: {message}")]
    Cluster { message: String },

    /// Watch session error. Initial establishment failure is fatal to the
    /// process; later failures are retried by the watch loop.
    #[error("watch error: {message}")]
    Watch { message: String },

    /// Configuration errors detected at startup.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O errors (token files, CA bundles).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a skip marker for a route set with nothing to reconcile.
    pub fn nothing_to_do(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NothingToDo { namespace: namespace.into(), name: name.into() }
    }

    /// Create a persistence error for a named object.
    pub fn persist(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persist { what: what.into(), message: message.into() }
    }

    /// Create a signing error for a host.
    pub fn signing(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Signing { host: host.into(), message: message.into() }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    /// Create a cluster API error.
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster { message: message.into() }
    }

    /// Create a watch error.
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch { message: message.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Whether this error is the "no bindings declared" skip condition.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Self::NothingToDo { .. })
    }
}
