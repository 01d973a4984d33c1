//! Passthrough auto-issuance backend.
//!
//! Wraps an ACME-protocol manager that handles its own challenge/response
//! cycle and caching. This controller treats it as opaque: the only
//! capability required is "hand back a certificate for a server name".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Certifier, KeyPair, ParsedCertificate, SniCertifier};
use crate::errors::Result;

/// Validity period of ACME-issued certificates. The issuance cycle is fixed
/// by the authority, so this overrides any configured TTL when scheduling
/// reissue sweeps.
pub const ACME_VALIDITY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// An external ACME manager, fully encapsulating registration, challenges
/// and renewal.
#[async_trait]
pub trait AcmeManager: Send + Sync {
    /// Return a certificate for the indicated server name, issuing or
    /// renewing as needed.
    async fn certificate(&self, server_name: &str) -> Result<Arc<ParsedCertificate>>;
}

/// [`Certifier`] that delegates directly to an [`AcmeManager`].
pub struct AcmeIssuer {
    manager: Arc<dyn AcmeManager>,
}

impl AcmeIssuer {
    /// Wrap an ACME manager.
    pub fn new(manager: Arc<dyn AcmeManager>) -> Self {
        Self { manager }
    }
}

impl std::fmt::Debug for AcmeIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeIssuer").finish()
    }
}

#[async_trait]
impl Certifier for AcmeIssuer {
    async fn issue(&self, host: &str) -> Result<KeyPair> {
        let certificate = self.manager.certificate(host).await?;
        Ok(certificate.key_pair.clone())
    }

    fn name(&self) -> &'static str {
        "acme"
    }

    fn as_sni_certifier(&self) -> Option<&dyn SniCertifier> {
        Some(self)
    }

    fn effective_ttl(&self, _configured: Duration) -> Duration {
        ACME_VALIDITY
    }
}

#[async_trait]
impl SniCertifier for AcmeIssuer {
    async fn certificate_for_sni(&self, server_name: &str) -> Result<Arc<ParsedCertificate>> {
        self.manager.certificate(server_name).await
    }
}
