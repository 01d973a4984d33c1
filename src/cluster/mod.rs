//! # Cluster State Collaborator
//!
//! Types and the [`ClusterClient`] trait describing everything the
//! reconciliation engine needs from the cluster API: list and watch routing
//! rule objects, read and write certificate secrets, and update a route
//! set's TLS binding list. The engine is written purely against this trait;
//! [`http::HttpClusterClient`] is the REST adapter used by the binary.

pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::Result;

/// Annotation recorded on secrets this controller writes, naming the
/// issuing backend.
pub const BACKEND_ANNOTATION: &str = "certflow.io/backend";

/// Conventional secret name for a synthesized single-host binding.
pub fn default_secret_name(host: &str) -> String {
    format!("{}.tls", host)
}

/// A single host-to-backends routing rule. Backends are opaque to this
/// controller and carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Host name this rule routes for.
    pub host: String,
    /// Opaque backend targets, in declared order.
    #[serde(default)]
    pub backends: Vec<serde_json::Value>,
}

impl RoutingRule {
    /// Rule for a bare host, used widely in tests.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { host: host.into(), backends: Vec::new() }
    }
}

/// A declared association of one or more hosts with a named secret expected
/// to hold their certificate and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsBinding {
    /// Hosts covered by the secret, in declared order. A binding with zero
    /// hosts is invalid and skipped, never an error.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Name of the secret holding the certificate material.
    #[serde(rename = "secretName")]
    pub secret_name: String,
}

impl TlsBinding {
    /// Single-host binding with the conventional secret name.
    pub fn for_host(host: &str) -> Self {
        Self { hosts: vec![host.to_string()], secret_name: default_secret_name(host) }
    }

    /// The host anchoring the secret, when the binding declares any.
    pub fn primary_host(&self) -> Option<&str> {
        self.hosts.first().map(String::as_str)
    }
}

/// A watched routing-rule object: the set of rules and TLS bindings under
/// one `{namespace, name}` identity. Externally owned; this controller only
/// synthesizes or prunes the binding list through the cluster client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSet {
    pub namespace: String,
    pub name: String,
    /// Declared routing rules, read-only to this controller.
    pub rules: Vec<RoutingRule>,
    /// Declared TLS bindings.
    pub tls: Vec<TlsBinding>,
}

impl RouteSet {
    /// All declared rule hosts, in order.
    pub fn rule_hosts(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.host.as_str())
    }
}

/// Desired contents of a certificate secret. Existence in the cluster
/// decides create-versus-update; this controller never deletes secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSecret {
    pub namespace: String,
    pub name: String,
    /// Annotations carried on the secret object.
    pub annotations: BTreeMap<String, String>,
    /// Data keyed by convention: `tls.crt` and `tls.key`.
    pub data: BTreeMap<String, Vec<u8>>,
}

impl CertificateSecret {
    /// Empty secret shell for a `{namespace, name}` identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            annotations: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }
}

/// Kind of a watch event. Deleted and unknown kinds are ignored by the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
    Other,
}

impl WatchEventKind {
    /// Whether this event kind triggers a reconciliation pass.
    pub fn triggers_reconcile(&self) -> bool {
        matches!(self, Self::Added | Self::Modified)
    }
}

/// A routing-rule change event delivered by the watch session.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub route_set: RouteSet,
}

/// The cluster-state collaborator contract.
///
/// Update conflicts (optimistic concurrency) surface as
/// [`crate::Error::Persist`]; they are retryable on the next trigger, never
/// fatal.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all namespace names.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// List routing-rule objects in one namespace.
    async fn list_route_sets(&self, namespace: &str) -> Result<Vec<RouteSet>>;

    /// Fetch the current state of one routing-rule object.
    async fn get_route_set(&self, namespace: &str, name: &str) -> Result<RouteSet>;

    /// Replace a routing-rule object's TLS binding list, returning the
    /// updated object.
    async fn update_tls_bindings(
        &self,
        namespace: &str,
        name: &str,
        bindings: Vec<TlsBinding>,
    ) -> Result<RouteSet>;

    /// Fetch a secret, `None` when absent.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<CertificateSecret>>;

    /// Create a secret that does not yet exist.
    async fn create_secret(&self, secret: &CertificateSecret) -> Result<()>;

    /// Update an existing secret in place.
    async fn update_secret(&self, secret: &CertificateSecret) -> Result<()>;

    /// Open a cluster-wide watch session over routing-rule objects. The
    /// receiver closes when the underlying session ends; callers re-establish
    /// by calling again.
    async fn watch_route_sets(&self) -> Result<mpsc::Receiver<WatchEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_secret_name_suffix() {
        assert_eq!(default_secret_name("foo.example.com"), "foo.example.com.tls");
    }

    #[test]
    fn test_binding_primary_host() {
        let binding = TlsBinding::for_host("foo.example.com");
        assert_eq!(binding.primary_host(), Some("foo.example.com"));

        let empty = TlsBinding { hosts: vec![], secret_name: "orphan.tls".to_string() };
        assert_eq!(empty.primary_host(), None);
    }

    #[test]
    fn test_watch_event_kinds() {
        assert!(WatchEventKind::Added.triggers_reconcile());
        assert!(WatchEventKind::Modified.triggers_reconcile());
        assert!(!WatchEventKind::Deleted.triggers_reconcile());
        assert!(!WatchEventKind::Other.triggers_reconcile());
    }

    #[test]
    fn test_binding_serde_field_names() {
        let binding = TlsBinding::for_host("foo.example.com");
        let json = serde_json::to_value(&binding).unwrap();
        assert!(json.get("secretName").is_some());
        assert!(json.get("hosts").is_some());
    }
}
