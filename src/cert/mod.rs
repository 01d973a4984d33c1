//! # Certificate Issuance
//!
//! The [`Certifier`] trait is the single contract the rest of the controller
//! is written against: produce a signed [`KeyPair`] for a host name. Three
//! strategies implement it — delegated CSR signing against Vault's PKI
//! engine ([`VaultSigner`]), local self-signing ([`SelfSigner`]) and
//! passthrough to an ACME manager ([`AcmeIssuer`]).
//!
//! Richer capabilities are optional and discovered by query rather than by
//! downcasting to a concrete backend: [`RequestCertifier`] for multi-host
//! (SAN) issuance and [`SniCertifier`] for handshake-time lookup handled
//! entirely by the backend.

pub mod acme;
pub mod cache;
pub mod keypair;
pub mod self_signed;
pub mod vault;

pub use acme::{AcmeIssuer, AcmeManager, ACME_VALIDITY};
pub use cache::CertificateCache;
pub use keypair::{KeyPair, ParsedCertificate, TLS_CERT_KEY, TLS_KEY_KEY};
pub use self_signed::SelfSigner;
pub use vault::{VaultConfig, VaultSigner};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

/// Default RSA key strength, in bits, when none is configured.
pub const DEFAULT_KEY_STRENGTH: u32 = 2048;

/// A certificate request template for backends that support more than a
/// bare common name: the primary host anchors the subject, alternate hosts
/// become additional DNS SANs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Subject common name and first DNS SAN.
    pub common_name: String,
    /// Additional DNS SANs.
    pub alt_names: Vec<String>,
}

impl CertificateRequest {
    /// Build a request for a single host.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { common_name: host.into(), alt_names: Vec::new() }
    }

    /// Build a request from an ordered host list; the first entry becomes
    /// the common name, the rest become alternate names.
    pub fn for_hosts(hosts: &[String]) -> Option<Self> {
        let (primary, rest) = hosts.split_first()?;
        Some(Self { common_name: primary.clone(), alt_names: rest.to_vec() })
    }

    /// All requested DNS names, primary first.
    pub fn dns_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(1 + self.alt_names.len());
        names.push(self.common_name.clone());
        names.extend(self.alt_names.iter().cloned());
        names
    }
}

/// The polymorphic capability to produce a signed certificate for a host.
///
/// Implementations must be shareable across concurrent issuance requests;
/// configuration is immutable after construction.
#[async_trait]
pub trait Certifier: Send + Sync {
    /// Produce a signed key pair for the given host name.
    async fn issue(&self, host: &str) -> Result<KeyPair>;

    /// Short backend identifier, recorded on secrets this controller writes.
    fn name(&self) -> &'static str;

    /// Optional richer capability: issuance from a full request template
    /// with explicit subject alternative names.
    fn as_request_certifier(&self) -> Option<&dyn RequestCertifier> {
        None
    }

    /// Optional capability: the backend performs its own handshake-time
    /// lookup (ACME managers cache and renew internally).
    fn as_sni_certifier(&self) -> Option<&dyn SniCertifier> {
        None
    }

    /// The validity period certificates from this backend actually get.
    /// Backends with a fixed issuance cycle override the configured TTL.
    fn effective_ttl(&self, configured: Duration) -> Duration {
        configured
    }
}

/// Issuance from a request template carrying explicit alternate names.
#[async_trait]
pub trait RequestCertifier: Send + Sync {
    /// Produce a signed key pair covering every name in the request.
    async fn issue_request(&self, request: &CertificateRequest) -> Result<KeyPair>;
}

/// Handshake-time certificate lookup keyed by SNI server name, fully
/// encapsulated by the backend.
#[async_trait]
pub trait SniCertifier: Send + Sync {
    /// Return a certificate for the indicated server name.
    async fn certificate_for_sni(&self, server_name: &str) -> Result<Arc<ParsedCertificate>>;
}
