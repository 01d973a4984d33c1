//! Self-signing certificate backend.
//!
//! A certificate-authority-of-one, used when no external trust anchor is
//! configured. Generates a fresh RSA key and a single self-signed leaf per
//! request; the only failure modes are local randomness or key generation.

use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyUsagePurpose, SerialNumber};
use time::OffsetDateTime;

use super::keypair::generate_rsa_key_pem;
use super::{Certifier, KeyPair, DEFAULT_KEY_STRENGTH};
use crate::errors::{Error, Result};

/// Locally self-signing [`Certifier`].
///
/// Serial numbers are drawn uniformly from `[0, 2^128)` using the OS
/// CSPRNG. Leaves are valid from "now" for the configured TTL with key
/// usages {digital signature, key encipherment} and extended usage
/// {server authentication}.
#[derive(Debug, Clone)]
pub struct SelfSigner {
    ttl: Duration,
    key_strength: u32,
}

impl SelfSigner {
    /// Create a self-signer issuing certificates valid for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, key_strength: DEFAULT_KEY_STRENGTH }
    }

    /// Override the RSA key strength in bits.
    pub fn with_key_strength(mut self, bits: u32) -> Self {
        self.key_strength = bits;
        self
    }

    fn issue_sync(&self, host: &str) -> Result<KeyPair> {
        let key_pem = generate_rsa_key_pem(self.key_strength)?;
        let key = rcgen::KeyPair::from_pem(&key_pem)
            .map_err(|e| Error::signing(host, format!("unusable RSA key: {}", e)))?;

        let mut params = CertificateParams::new(vec![host.to_string()])
            .map_err(|e| Error::signing(host, format!("invalid certificate params: {}", e)))?;
        params.distinguished_name.push(DnType::CommonName, host);

        // Uniform in [0, 2^128) as the largest serial.
        let mut serial = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut serial);
        params.serial_number = Some(SerialNumber::from_slice(&serial));

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::seconds(self.ttl.as_secs() as i64);

        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let cert = params
            .self_signed(&key)
            .map_err(|e| Error::signing(host, format!("self-signing failed: {}", e)))?;

        Ok(KeyPair::new(cert.pem(), key_pem.as_bytes().to_vec()))
    }
}

#[async_trait]
impl Certifier for SelfSigner {
    async fn issue(&self, host: &str) -> Result<KeyPair> {
        // RSA key generation is CPU-bound; keep it off the async workers.
        let signer = self.clone();
        let host = host.to_string();
        tokio::task::spawn_blocking(move || signer.issue_sync(&host))
            .await
            .map_err(|e| Error::signing("<unknown>", format!("issuance task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "self-signed"
    }
}
