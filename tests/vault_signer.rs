//! Vault signing backend against a mocked PKI endpoint.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certflow::cert::{CertificateRequest, Certifier, VaultConfig, VaultSigner};
use certflow::Error;

fn test_config(addr: String) -> VaultConfig {
    VaultConfig {
        addr,
        token: "test-token".to_string(),
        mount: "pki".to_string(),
        role: "certflow".to_string(),
        email: String::new(),
        key_strength: 2048,
        ttl: Duration::from_secs(3_600),
        ca_certs: Vec::new(),
    }
}

fn signed_pem(host: &str) -> String {
    let key = rcgen::KeyPair::generate().unwrap();
    let params = rcgen::CertificateParams::new(vec![host.to_string()]).unwrap();
    params.self_signed(&key).unwrap().pem()
}

fn sign_response(certificate: &str) -> serde_json::Value {
    json!({
        "request_id": "5b7e6c3a-0000-0000-0000-000000000000",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": {
            "certificate": certificate,
            "issuing_ca": certificate,
            "ca_chain": [certificate],
            "serial_number": "39:dd:2e:90:b7:23:1f:8d",
            "expiration": 1_924_992_000u64,
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null,
    })
}

#[tokio::test]
async fn test_sign_returns_vault_certificate_and_local_key() {
    let server = MockServer::start().await;
    let certificate = signed_pem("signed.example.com");

    Mock::given(method("POST"))
        .and(path("/v1/pki/sign/certflow"))
        .and(header("X-Vault-Token", "test-token"))
        .and(body_partial_json(json!({
            "common_name": "signed.example.com",
            "format": "pem_bundle",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_response(&certificate)))
        .expect(1)
        .mount(&server)
        .await;

    let signer = VaultSigner::new(test_config(server.uri())).unwrap();
    let pair = signer.issue("signed.example.com").await.unwrap();

    assert_eq!(pair.public_pem, certificate.into_bytes());
    let key = String::from_utf8(pair.private_pem.clone()).unwrap();
    assert!(key.contains("PRIVATE KEY"));
}

#[tokio::test]
async fn test_multi_host_request_forwards_alt_names() {
    let server = MockServer::start().await;
    let certificate = signed_pem("primary.example.com");

    Mock::given(method("POST"))
        .and(path("/v1/pki/sign/certflow"))
        .and(body_partial_json(json!({
            "common_name": "primary.example.com",
            "alt_names": "alt1.example.com,alt2.example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_response(&certificate)))
        .expect(1)
        .mount(&server)
        .await;

    let signer = VaultSigner::new(test_config(server.uri())).unwrap();
    let request_certifier = signer.as_request_certifier().unwrap();
    let request = CertificateRequest {
        common_name: "primary.example.com".to_string(),
        alt_names: vec!["alt1.example.com".to_string(), "alt2.example.com".to_string()],
    };

    request_certifier.issue_request(&request).await.unwrap();
}

#[tokio::test]
async fn test_vault_rejection_is_a_signing_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pki/sign/certflow"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })),
        )
        .mount(&server)
        .await;

    let signer = VaultSigner::new(test_config(server.uri())).unwrap();
    let err = signer.issue("denied.example.com").await.unwrap_err();

    assert!(matches!(err, Error::Signing { .. }));
    assert!(err.to_string().contains("denied.example.com"));
}

#[tokio::test]
async fn test_malformed_bundle_is_rejected_before_persistence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pki/sign/certflow"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sign_response("not a certificate at all")),
        )
        .mount(&server)
        .await;

    let signer = VaultSigner::new(test_config(server.uri())).unwrap();
    let err = signer.issue("garbled.example.com").await.unwrap_err();

    assert!(matches!(err, Error::Parse { .. }));
}
