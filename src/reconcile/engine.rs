//! Watch-driven and periodically-triggered reconciliation.
//!
//! Each pass loads a route set's TLS bindings, synthesizes bindings for
//! uncovered hosts when forced-TLS mode is on, issues a certificate per
//! binding through the active [`Certifier`], persists the material to the
//! secret store, and finally prunes bindings whose certificate could not be
//! obtained so the routing layer never advertises TLS for a host with no
//! valid secret.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::diff::missing_hosts;
use crate::cert::{CertificateRequest, Certifier, KeyPair, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::cluster::{
    CertificateSecret, ClusterClient, RouteSet, TlsBinding, BACKEND_ANNOTATION,
};
use crate::errors::{Error, Result};
use crate::observability::ReconcileObserver;

/// Delay before retrying a failed watch re-establishment.
const REWATCH_BACKOFF: Duration = Duration::from_secs(2);

/// The reconciliation engine.
///
/// Written purely against the [`Certifier`] and [`ClusterClient`] contracts;
/// richer backend capabilities are discovered by query, never by downcast.
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    certifier: Arc<dyn Certifier>,
    observer: Arc<dyn ReconcileObserver>,
    ttl: Duration,
    force_tls: bool,
    backend_timeout: Option<Duration>,
}

impl Reconciler {
    /// Create an engine over the given collaborators. Forced-TLS mode is
    /// off and backend calls are unbounded unless configured otherwise.
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        certifier: Arc<dyn Certifier>,
        observer: Arc<dyn ReconcileObserver>,
        ttl: Duration,
    ) -> Self {
        Self { cluster, certifier, observer, ttl, force_tls: false, backend_timeout: None }
    }

    /// Guarantee every declared routing host a synthesized TLS binding.
    pub fn with_force_tls(mut self, force_tls: bool) -> Self {
        self.force_tls = force_tls;
        self
    }

    /// Bound each backend issuance call. A hung backend otherwise blocks
    /// the current pass indefinitely.
    pub fn with_backend_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Interval between full reissue sweeps: 90% of the TTL certificates
    /// from the active backend actually get.
    pub fn resync_interval(&self) -> Duration {
        self.certifier.effective_ttl(self.ttl).mul_f64(0.9)
    }

    /// Run one reconciliation pass for a route set, returning the route
    /// set's state after sync-back.
    pub async fn apply(&self, route: &RouteSet) -> Result<RouteSet> {
        let mut route = route.clone();

        if route.tls.is_empty() && !self.force_tls {
            return Err(Error::nothing_to_do(&route.namespace, &route.name));
        }

        if self.force_tls {
            let missing = missing_hosts(&route.rules, &route.tls);
            if !missing.is_empty() {
                let mut bindings = route.tls.clone();
                bindings.extend(missing.iter().map(|host| TlsBinding::for_host(host)));
                info!(
                    namespace = %route.namespace,
                    name = %route.name,
                    synthesized = missing.len(),
                    "synthesizing TLS bindings for uncovered hosts"
                );
                // Nothing is issued against a binding list that was not
                // durably saved.
                route = self
                    .cluster
                    .update_tls_bindings(&route.namespace, &route.name, bindings)
                    .await?;
            }
        }

        let mut succeeded: Vec<TlsBinding> = Vec::new();
        let mut failed = 0usize;

        for binding in &route.tls {
            let Some(primary) = binding.primary_host() else {
                debug!(
                    namespace = %route.namespace,
                    secret = %binding.secret_name,
                    "skipping binding with no hosts"
                );
                continue;
            };

            match self.issue_binding(&route.namespace, binding, primary).await {
                Ok(()) => {
                    self.observer.certificate_issued(&route.namespace, primary);
                    succeeded.push(binding.clone());
                }
                Err(e) => {
                    failed += 1;
                    self.observer.certificate_failed(&route.namespace, primary);
                    warn!(
                        namespace = %route.namespace,
                        host = %primary,
                        secret = %binding.secret_name,
                        error = %e,
                        "binding failed, continuing batch"
                    );
                }
            }
        }

        self.observer.pass_completed(&route.namespace, &route.name, succeeded.len(), failed);

        // The object may have changed while certificates were being issued;
        // prune against its latest state.
        let current = self
            .cluster
            .get_route_set(&route.namespace, &route.name)
            .await
            .map_err(|e| {
                Error::persist(
                    format!("routing rule {}/{}", route.namespace, route.name),
                    format!("failed to re-fetch for sync-back: {}", e),
                )
            })?;

        if succeeded.len() != current.tls.len() {
            info!(
                namespace = %current.namespace,
                name = %current.name,
                kept = succeeded.len(),
                declared = current.tls.len(),
                "pruning bindings without certificates"
            );
            return self
                .cluster
                .update_tls_bindings(&current.namespace, &current.name, succeeded)
                .await;
        }

        Ok(current)
    }

    async fn issue_binding(
        &self,
        namespace: &str,
        binding: &TlsBinding,
        primary: &str,
    ) -> Result<()> {
        let existing = self.cluster.get_secret(namespace, &binding.secret_name).await?;
        let is_new = existing.is_none();
        let mut secret = existing
            .unwrap_or_else(|| CertificateSecret::new(namespace, &binding.secret_name));

        let pair = self.obtain_pair(binding, primary).await?;

        secret
            .annotations
            .insert(BACKEND_ANNOTATION.to_string(), self.certifier.name().to_string());
        secret.data.insert(TLS_KEY_KEY.to_string(), pair.private_pem.clone());
        secret.data.insert(TLS_CERT_KEY.to_string(), pair.public_pem.clone());

        if is_new {
            self.cluster.create_secret(&secret).await?;
        } else {
            self.cluster.update_secret(&secret).await?;
        }

        debug!(
            namespace = %namespace,
            secret = %secret.name,
            host = %primary,
            created = is_new,
            "certificate material persisted"
        );
        Ok(())
    }

    /// Issue through the richer multi-host capability when the backend
    /// offers it, falling back to the single-host contract.
    async fn obtain_pair(&self, binding: &TlsBinding, primary: &str) -> Result<KeyPair> {
        let issue = async {
            if let Some(request_certifier) = self.certifier.as_request_certifier() {
                if let Some(request) = CertificateRequest::for_hosts(&binding.hosts) {
                    return request_certifier.issue_request(&request).await;
                }
            }
            self.certifier.issue(primary).await
        };

        match self.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, issue).await.map_err(|_| {
                Error::signing(primary, format!("backend call exceeded {:?}", limit))
            })?,
            None => issue.await,
        }
    }

    /// One full sweep over every namespace and route set. A listing error
    /// aborts the sweep; the next periodic tick retries.
    pub async fn sweep(&self) -> Result<()> {
        for namespace in self.cluster.list_namespaces().await? {
            for route in self.cluster.list_route_sets(&namespace).await? {
                match self.apply(&route).await {
                    Ok(_) => {}
                    Err(e) if e.is_nothing_to_do() => {
                        debug!(namespace = %namespace, name = %route.name, "nothing to do")
                    }
                    Err(e) => warn!(
                        namespace = %namespace,
                        name = %route.name,
                        error = %e,
                        "reconciliation pass failed"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Run the watch-driven and timer-driven loops until a fatal error.
    /// Only failure to establish the initial watch is fatal; everything
    /// else is retried.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let watcher = tokio::spawn(self.clone().watch_loop());
        let resync = tokio::spawn(self.clone().resync_loop());

        let outcome = watcher.await;
        resync.abort();
        outcome.map_err(|e| Error::watch(format!("watch task terminated abnormally: {}", e)))?
    }

    async fn watch_loop(self: Arc<Self>) -> Result<()> {
        // No reissue could ever proceed without a watch; a failed initial
        // subscription is fatal to the process.
        let mut events = self.cluster.watch_route_sets().await?;

        loop {
            while let Some(event) = events.recv().await {
                if !event.kind.triggers_reconcile() {
                    continue;
                }
                match self.apply(&event.route_set).await {
                    Ok(_) => {}
                    Err(e) if e.is_nothing_to_do() => debug!(
                        namespace = %event.route_set.namespace,
                        name = %event.route_set.name,
                        "nothing to do"
                    ),
                    Err(e) => warn!(
                        namespace = %event.route_set.namespace,
                        name = %event.route_set.name,
                        error = %e,
                        "failed to reconcile watched route set"
                    ),
                }
            }

            info!("watch channel closed, re-establishing");
            events = loop {
                match self.cluster.watch_route_sets().await {
                    Ok(events) => break events,
                    Err(e) => {
                        warn!(error = %e, "failed to re-establish watch, retrying");
                        tokio::time::sleep(REWATCH_BACKOFF).await;
                    }
                }
            };
        }
    }

    async fn resync_loop(self: Arc<Self>) {
        let interval = self.resync_interval();
        info!(interval_secs = interval.as_secs(), "periodic reissue sweep scheduled");
        loop {
            tokio::time::sleep(interval).await;
            info!("starting periodic reissue sweep");
            if let Err(e) = self.sweep().await {
                error!(error = %e, "sweep aborted, will retry on next tick");
            }
        }
    }
}
