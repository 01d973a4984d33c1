//! Expiry-aware certificate cache.
//!
//! Wraps any [`Certifier`] with concurrency-safe memoization for
//! high-frequency lookups, e.g. a per-handshake `get` keyed by SNI server
//! name. An expired entry and a missing entry are treated identically: both
//! escalate to an exclusive refresh through the wrapped certifier.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{Certifier, ParsedCertificate};
use crate::errors::{Error, Result};

/// In-memory, expiry-aware certificate store.
///
/// Readers run concurrently; a refresh holds the write lock for the minimum
/// "issue, parse, store" span and excludes readers for that duration. Under
/// a race two refreshes for the same host may both complete; the last writer
/// wins and the map is never corrupted.
pub struct CertificateCache {
    entries: RwLock<HashMap<String, Arc<ParsedCertificate>>>,
    certifier: Arc<dyn Certifier>,
}

impl CertificateCache {
    /// Wrap a certifier with an empty cache.
    pub fn new(certifier: Arc<dyn Certifier>) -> Self {
        Self { entries: RwLock::new(HashMap::new()), certifier }
    }

    /// Return a certificate for `host`, refreshing through the wrapped
    /// certifier when the cached entry is missing or outside its validity
    /// window.
    pub async fn get(&self, host: &str) -> Result<Arc<ParsedCertificate>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(host) {
                if entry.is_valid_at(Utc::now()) {
                    return Ok(entry.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;
        // Another refresher may have won the lock race; take its entry.
        if let Some(entry) = entries.get(host) {
            if entry.is_valid_at(Utc::now()) {
                return Ok(entry.clone());
            }
        }

        let pair = self.certifier.issue(host).await?;
        let entry = Arc::new(ParsedCertificate::from_key_pair(pair)?);
        entries.insert(host.to_string(), entry.clone());
        Ok(entry)
    }

    /// Handshake-time lookup. A handshake with no SNI value is rejected
    /// before the cache is consulted. Backends that manage their own
    /// handshake lookup (ACME managers) are delegated to directly.
    pub async fn get_for_server_name(
        &self,
        server_name: Option<&str>,
    ) -> Result<Arc<ParsedCertificate>> {
        let name = server_name.filter(|name| !name.is_empty()).ok_or(Error::MissingSni)?;

        if let Some(sni) = self.certifier.as_sni_certifier() {
            return sni.certificate_for_sni(name).await;
        }

        self.get(name).await
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
