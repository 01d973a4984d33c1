//! Delegated certificate signing via HashiCorp Vault's PKI engine.
//!
//! The private key is generated locally and never transmitted; only the
//! certificate signing request built from it is submitted to Vault's
//! `sign` endpoint, with the configured role, identity email and TTL.

use std::time::Duration;

use async_trait::async_trait;
use rcgen::{CertificateParams, DnType, SanType};
use vaultrs::api::pki::requests::SignCertificateRequestBuilder;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use zeroize::Zeroizing;

use super::keypair::generate_rsa_key_pem;
use super::{
    CertificateRequest, Certifier, KeyPair, ParsedCertificate, RequestCertifier,
    DEFAULT_KEY_STRENGTH,
};
use crate::errors::{Error, Result};

/// Configuration for the Vault signing backend. Immutable after
/// construction and shared read-only across concurrent requests.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.internal:8200`.
    pub addr: String,
    /// Authentication token.
    pub token: String,
    /// PKI secrets engine mount path.
    pub mount: String,
    /// PKI role under which CSRs are signed.
    pub role: String,
    /// Human identity recorded in the CSR.
    pub email: String,
    /// RSA key strength in bits.
    pub key_strength: u32,
    /// Requested certificate TTL.
    pub ttl: Duration,
    /// Optional CA bundle paths for verifying Vault's own TLS.
    pub ca_certs: Vec<String>,
}

impl VaultConfig {
    /// Assemble connection settings from the conventional environment:
    /// `VAULT_ADDR`, `VAULT_TOKEN` (falling back to `VAULT_TOKEN_FILE` or
    /// `~/.vault-token`), `VAULT_CACERT`, `CERTFLOW_VAULT_MOUNT` and
    /// `CERTFLOW_VAULT_ROLE`.
    pub fn from_env(email: String, key_strength: u32, ttl: Duration) -> Result<Self> {
        let addr = std::env::var("VAULT_ADDR")
            .map_err(|_| Error::config("VAULT_ADDR is required for the delegated backend"))?;

        let token = match std::env::var("VAULT_TOKEN") {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => read_token_file()?,
        };

        let ca_certs = std::env::var("VAULT_CACERT").ok().into_iter().collect();
        let mount =
            std::env::var("CERTFLOW_VAULT_MOUNT").unwrap_or_else(|_| "pki".to_string());
        let role =
            std::env::var("CERTFLOW_VAULT_ROLE").unwrap_or_else(|_| "certflow".to_string());

        Ok(Self { addr, token, mount, role, email, key_strength, ttl, ca_certs })
    }
}

fn read_token_file() -> Result<String> {
    let path = match std::env::var("VAULT_TOKEN_FILE") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let home = std::env::var("HOME")
                .map_err(|_| Error::config("no VAULT_TOKEN set and HOME is unset"))?;
            std::path::Path::new(&home).join(".vault-token")
        }
    };
    let token = std::fs::read_to_string(&path)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::config(format!("vault token file {} is empty", path.display())));
    }
    Ok(token.to_string())
}

/// [`Certifier`] that signs locally-generated CSRs through Vault.
pub struct VaultSigner {
    client: VaultClient,
    config: VaultConfig,
}

impl std::fmt::Debug for VaultSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSigner")
            .field("addr", &self.config.addr)
            .field("mount", &self.config.mount)
            .field("role", &self.config.role)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultSigner {
    /// Build a signer from the given configuration.
    pub fn new(config: VaultConfig) -> Result<Self> {
        let mut settings = VaultClientSettingsBuilder::default();
        settings.address(&config.addr);
        settings.token(&config.token);
        if !config.ca_certs.is_empty() {
            settings.ca_certs(config.ca_certs.clone());
        }

        let settings = settings
            .build()
            .map_err(|e| Error::config(format!("invalid Vault settings: {}", e)))?;
        let client = VaultClient::new(settings)
            .map_err(|e| Error::config(format!("failed to create Vault client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn sign(&self, request: &CertificateRequest) -> Result<KeyPair> {
        let (csr_pem, key_pem) = {
            let owned = request.clone();
            let strength = self.config.key_strength;
            let email = self.config.email.clone();
            tokio::task::spawn_blocking(move || build_csr(&owned, strength, &email))
                .await
                .map_err(|e| {
                    Error::signing(&request.common_name, format!("CSR task failed: {}", e))
                })??
        };

        let mut opts = SignCertificateRequestBuilder::default();
        opts.format("pem_bundle");
        opts.ttl(format!("{}s", self.config.ttl.as_secs()));
        if !request.alt_names.is_empty() {
            opts.alt_names(request.alt_names.join(","));
        }

        let response = vaultrs::pki::cert::ca::sign(
            &self.client,
            &self.config.mount,
            &self.config.role,
            &csr_pem,
            &request.common_name,
            Some(&mut opts),
        )
        .await
        .map_err(|e| {
            Error::signing(&request.common_name, format!("Vault rejected the CSR: {}", e))
        })?;

        let pair = KeyPair::new(response.certificate.into_bytes(), key_pem.as_bytes().to_vec());

        // Reject malformed bundles here rather than letting them reach the
        // secret store.
        ParsedCertificate::from_key_pair(pair.clone())?;

        Ok(pair)
    }
}

/// Build a PEM CSR for the requested names, generating a fresh RSA key.
/// Returns the CSR and the PKCS#8 private key PEM.
fn build_csr(
    request: &CertificateRequest,
    key_strength: u32,
    email: &str,
) -> Result<(String, Zeroizing<String>)> {
    let strength = if key_strength == 0 { DEFAULT_KEY_STRENGTH } else { key_strength };
    let key_pem = generate_rsa_key_pem(strength)?;
    let key = rcgen::KeyPair::from_pem(&key_pem)
        .map_err(|e| Error::signing(&request.common_name, format!("unusable RSA key: {}", e)))?;

    let mut params = CertificateParams::new(request.dns_names()).map_err(|e| {
        Error::signing(&request.common_name, format!("invalid certificate params: {}", e))
    })?;
    params.distinguished_name.push(DnType::CommonName, request.common_name.as_str());

    if !email.is_empty() {
        let address = email.try_into().map_err(|e| {
            Error::config(format!("issuing identity {:?} is not a valid email: {}", email, e))
        })?;
        params.subject_alt_names.push(SanType::Rfc822Name(address));
    }

    let csr = params
        .serialize_request(&key)
        .map_err(|e| Error::signing(&request.common_name, format!("CSR build failed: {}", e)))?;
    let csr_pem = csr
        .pem()
        .map_err(|e| Error::signing(&request.common_name, format!("CSR encoding failed: {}", e)))?;

    Ok((csr_pem, key_pem))
}

#[async_trait]
impl Certifier for VaultSigner {
    async fn issue(&self, host: &str) -> Result<KeyPair> {
        self.sign(&CertificateRequest::for_host(host)).await
    }

    fn name(&self) -> &'static str {
        "vault"
    }

    fn as_request_certifier(&self) -> Option<&dyn RequestCertifier> {
        Some(self)
    }
}

#[async_trait]
impl RequestCertifier for VaultSigner {
    async fn issue_request(&self, request: &CertificateRequest) -> Result<KeyPair> {
        self.sign(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::pem::Pem;
    use x509_parser::prelude::FromDer;

    #[test]
    fn test_build_csr_embeds_subject_and_sans() {
        let request = CertificateRequest {
            common_name: "primary.example.com".to_string(),
            alt_names: vec!["alt.example.com".to_string()],
        };
        let (csr_pem, key_pem) = build_csr(&request, 2048, "ops@example.com").unwrap();

        assert!(csr_pem.contains("CERTIFICATE REQUEST"));
        assert!(key_pem.contains("PRIVATE KEY"));

        let pem = Pem::iter_from_buffer(csr_pem.as_bytes()).next().unwrap().unwrap();
        let (_, csr) =
            x509_parser::certification_request::X509CertificationRequest::from_der(&pem.contents)
                .unwrap();
        let cn = csr
            .certification_request_info
            .subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap();
        assert_eq!(cn, "primary.example.com");
    }

    #[test]
    fn test_build_csr_defaults_key_strength() {
        let request = CertificateRequest::for_host("zero.example.com");
        // Strength 0 falls back to 2048 rather than failing.
        let (csr_pem, _) = build_csr(&request, 0, "").unwrap();
        assert!(csr_pem.contains("CERTIFICATE REQUEST"));
    }

    #[test]
    fn test_build_csr_rejects_bad_email() {
        let request = CertificateRequest::for_host("mail.example.com");
        let err = build_csr(&request, 2048, "ops@exämple.com").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
