//! Certificate key material types.
//!
//! [`KeyPair`] carries the raw PEM-encoded certificate chain and private key
//! with explicitly named fields so the two can never be transposed.
//! [`ParsedCertificate`] is the parsed view used by the cache and the SNI
//! lookup path: the leaf's validity window and subject, plus the DER chain.

use chrono::{DateTime, Utc};
use x509_parser::pem::Pem;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Error, Result};

/// Conventional secret data key for the certificate chain.
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Conventional secret data key for the private key.
pub const TLS_KEY_KEY: &str = "tls.key";

/// A PEM-encoded certificate chain and its private key.
///
/// The private half is zeroized on drop and redacted in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    /// PEM certificate bundle (leaf first, then any intermediates).
    pub public_pem: Vec<u8>,
    /// PEM private key.
    pub private_pem: Vec<u8>,
}

impl KeyPair {
    /// Build a key pair from PEM-encoded parts.
    pub fn new(public_pem: impl Into<Vec<u8>>, private_pem: impl Into<Vec<u8>>) -> Self {
        Self { public_pem: public_pem.into(), private_pem: private_pem.into() }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_pem", &String::from_utf8_lossy(&self.public_pem))
            .field("private_pem", &"[REDACTED]")
            .finish()
    }
}

/// A certificate parsed from its PEM form, retaining the raw pair.
///
/// An entry is usable only while `now` falls within
/// `[not_before, not_after)`; callers must treat anything else as absent.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    /// The raw PEM material this view was parsed from.
    pub key_pair: KeyPair,
    /// Leaf subject common name.
    pub common_name: String,
    /// Start of the leaf validity window.
    pub not_before: DateTime<Utc>,
    /// End of the leaf validity window (exclusive).
    pub not_after: DateTime<Utc>,
    /// DER-encoded chain, leaf first.
    pub chain_der: Vec<Vec<u8>>,
}

impl ParsedCertificate {
    /// Parse the public PEM bundle of a [`KeyPair`], taking the first
    /// certificate as the leaf.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        let mut chain_der = Vec::new();
        for pem in Pem::iter_from_buffer(&key_pair.public_pem) {
            let pem = pem.map_err(|e| Error::parse(format!("invalid PEM block: {}", e)))?;
            if pem.label == "CERTIFICATE" {
                chain_der.push(pem.contents);
            }
        }

        let leaf_der = chain_der
            .first()
            .ok_or_else(|| Error::parse("no CERTIFICATE block in PEM bundle"))?;

        let (_, leaf) = x509_parser::parse_x509_certificate(leaf_der)
            .map_err(|e| Error::parse(format!("invalid X.509 certificate: {}", e)))?;

        let common_name = leaf
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string();

        let not_before = timestamp_to_datetime(leaf.validity().not_before.timestamp())?;
        let not_after = timestamp_to_datetime(leaf.validity().not_after.timestamp())?;

        Ok(Self { key_pair, common_name, not_before, not_after, chain_der })
    }

    /// Whether the leaf validity window contains `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| Error::parse(format!("certificate validity timestamp out of range: {}", ts)))
}

/// Generate a fresh RSA private key of the given strength, PKCS#8 PEM
/// encoded. Key material never leaves the process; delegated backends only
/// transmit the CSR built from it.
pub(crate) fn generate_rsa_key_pem(bits: u32) -> Result<zeroize::Zeroizing<String>> {
    use rsa::pkcs8::EncodePrivateKey;

    let key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits as usize)
        .map_err(|e| Error::signing("<keygen>", format!("RSA key generation failed: {}", e)))?;
    key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
        .map_err(|e| Error::signing("<keygen>", format!("private key encoding failed: {}", e)))
}
