//! REST adapter for the cluster API.
//!
//! Speaks the Kubernetes-style JSON surface: namespaces and secrets under
//! `/api/v1`, routing-rule (ingress) objects under
//! `/apis/networking.k8s.io/v1`, and a line-delimited streaming watch.
//! Updates are read-modify-write so the server's optimistic concurrency
//! token rides along untouched; a conflict surfaces as a retryable persist
//! error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use super::{
    CertificateSecret, ClusterClient, RouteSet, RoutingRule, TlsBinding, WatchEvent,
    WatchEventKind,
};
use crate::errors::{Error, Result};

const ROUTES_API: &str = "apis/networking.k8s.io/v1";
const CORE_API: &str = "api/v1";

/// [`ClusterClient`] over HTTP.
pub struct HttpClusterClient {
    base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpClusterClient {
    /// Create a client for the API server at `base_url`, optionally
    /// authenticating with a bearer token.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid cluster URL {:?}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { base, token, client })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| Error::cluster(format!("bad API path {}: {}", path, e)))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path)?;
        let response = self
            .request(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::cluster(format!("GET {}: {}", path, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::cluster(format!("GET {} returned {}", path, status)));
        }
        response.json().await.map_err(|e| Error::cluster(format!("GET {}: {}", path, e)))
    }

    async fn write_json(&self, method: reqwest::Method, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path)?;
        let response = self
            .request(self.client.request(method.clone(), url))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::persist(path.to_string(), e.to_string()))?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(Error::persist(path.to_string(), "update conflict, will retry".to_string()));
        }
        if !status.is_success() {
            return Err(Error::persist(path.to_string(), format!("{} returned {}", method, status)));
        }
        response.json().await.map_err(|e| Error::persist(path.to_string(), e.to_string()))
    }

    fn route_path(namespace: &str, name: &str) -> String {
        format!("{}/namespaces/{}/ingresses/{}", ROUTES_API, namespace, name)
    }

    fn secret_path(namespace: &str, name: &str) -> String {
        format!("{}/namespaces/{}/secrets/{}", CORE_API, namespace, name)
    }
}

/// Map a routing-rule API object to the controller's view of it.
fn route_set_from_json(object: &Value) -> Result<RouteSet> {
    let metadata = &object["metadata"];
    let namespace = metadata["namespace"]
        .as_str()
        .ok_or_else(|| Error::cluster("routing rule object without metadata.namespace"))?
        .to_string();
    let name = metadata["name"]
        .as_str()
        .ok_or_else(|| Error::cluster("routing rule object without metadata.name"))?
        .to_string();

    let mut rules = Vec::new();
    if let Some(entries) = object["spec"]["rules"].as_array() {
        for entry in entries {
            if let Some(host) = entry["host"].as_str() {
                let backends =
                    entry["http"]["paths"].as_array().cloned().unwrap_or_default();
                rules.push(RoutingRule { host: host.to_string(), backends });
            }
        }
    }

    let tls = match object["spec"].get("tls") {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map_err(|e| Error::cluster(format!("malformed spec.tls: {}", e)))?,
        _ => Vec::new(),
    };

    Ok(RouteSet { namespace, name, rules, tls })
}

fn secret_from_json(object: &Value) -> Result<CertificateSecret> {
    let metadata = &object["metadata"];
    let mut secret = CertificateSecret::new(
        metadata["namespace"].as_str().unwrap_or_default(),
        metadata["name"]
            .as_str()
            .ok_or_else(|| Error::cluster("secret object without metadata.name"))?,
    );

    if let Some(annotations) = metadata["annotations"].as_object() {
        for (key, value) in annotations {
            if let Some(value) = value.as_str() {
                secret.annotations.insert(key.clone(), value.to_string());
            }
        }
    }

    if let Some(data) = object["data"].as_object() {
        for (key, value) in data {
            let encoded = value
                .as_str()
                .ok_or_else(|| Error::cluster(format!("secret data {} is not a string", key)))?;
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| Error::cluster(format!("secret data {} is not base64: {}", key, e)))?;
            secret.data.insert(key.clone(), bytes);
        }
    }

    Ok(secret)
}

fn secret_to_json(secret: &CertificateSecret) -> Value {
    let data: serde_json::Map<String, Value> = secret
        .data
        .iter()
        .map(|(key, bytes)| (key.clone(), Value::String(BASE64.encode(bytes))))
        .collect();

    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "kubernetes.io/tls",
        "metadata": {
            "namespace": secret.namespace,
            "name": secret.name,
            "annotations": secret.annotations,
        },
        "data": data,
    })
}

/// Parse one line of the streaming watch body. Returns `None` for lines
/// that should be skipped (blank lines, objects without a host spec).
fn parse_watch_line(line: &[u8]) -> Result<Option<WatchEvent>> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(line)
        .map_err(|e| Error::watch(format!("malformed watch event: {}", e)))?;

    let kind = match value["type"].as_str() {
        Some("ADDED") => WatchEventKind::Added,
        Some("MODIFIED") => WatchEventKind::Modified,
        Some("DELETED") => WatchEventKind::Deleted,
        _ => WatchEventKind::Other,
    };

    let route_set = route_set_from_json(&value["object"])?;
    Ok(Some(WatchEvent { kind, route_set }))
}

#[async_trait::async_trait]
impl ClusterClient for HttpClusterClient {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let body = self.get_json(&format!("{}/namespaces", CORE_API)).await?;
        let mut names = Vec::new();
        if let Some(items) = body["items"].as_array() {
            for item in items {
                if let Some(name) = item["metadata"]["name"].as_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn list_route_sets(&self, namespace: &str) -> Result<Vec<RouteSet>> {
        let body = self
            .get_json(&format!("{}/namespaces/{}/ingresses", ROUTES_API, namespace))
            .await?;
        let mut route_sets = Vec::new();
        if let Some(items) = body["items"].as_array() {
            for item in items {
                route_sets.push(route_set_from_json(item)?);
            }
        }
        Ok(route_sets)
    }

    async fn get_route_set(&self, namespace: &str, name: &str) -> Result<RouteSet> {
        let body = self.get_json(&Self::route_path(namespace, name)).await?;
        route_set_from_json(&body)
    }

    async fn update_tls_bindings(
        &self,
        namespace: &str,
        name: &str,
        bindings: Vec<TlsBinding>,
    ) -> Result<RouteSet> {
        let path = Self::route_path(namespace, name);

        // Read-modify-write keeps the server's concurrency token intact.
        let mut object = self
            .get_json(&path)
            .await
            .map_err(|e| Error::persist(format!("routing rule {}/{}", namespace, name), e.to_string()))?;
        object["spec"]["tls"] = serde_json::to_value(&bindings)
            .map_err(|e| Error::persist(path.clone(), e.to_string()))?;

        let updated = self.write_json(reqwest::Method::PUT, &path, &object).await?;
        route_set_from_json(&updated)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<CertificateSecret>> {
        let path = Self::secret_path(namespace, name);
        let url = self.url(&path)?;
        let response = self
            .request(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::cluster(format!("GET {}: {}", path, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| Error::cluster(format!("GET {}: {}", path, e)))?;
                Ok(Some(secret_from_json(&body)?))
            }
            status => Err(Error::cluster(format!("GET {} returned {}", path, status))),
        }
    }

    async fn create_secret(&self, secret: &CertificateSecret) -> Result<()> {
        let path = format!("{}/namespaces/{}/secrets", CORE_API, secret.namespace);
        self.write_json(reqwest::Method::POST, &path, &secret_to_json(secret)).await?;
        Ok(())
    }

    async fn update_secret(&self, secret: &CertificateSecret) -> Result<()> {
        let path = Self::secret_path(&secret.namespace, &secret.name);

        // Preserve fields the controller does not own.
        let mut object = self
            .get_json(&path)
            .await
            .map_err(|e| Error::persist(format!("secret {}", secret.name), e.to_string()))?;
        let desired = secret_to_json(secret);
        object["data"] = desired["data"].clone();
        object["metadata"]["annotations"] = desired["metadata"]["annotations"].clone();

        self.write_json(reqwest::Method::PUT, &path, &object).await?;
        Ok(())
    }

    async fn watch_route_sets(&self) -> Result<mpsc::Receiver<WatchEvent>> {
        let url = self.url(&format!("{}/ingresses?watch=true", ROUTES_API))?;
        let response = self
            .request(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::watch(format!("watch request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::watch(format!("watch request returned {}", status)));
        }

        let (tx, rx) = mpsc::channel(16);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "watch stream read failed");
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_watch_line(&line) {
                        Ok(Some(event)) => {
                            debug!(
                                namespace = %event.route_set.namespace,
                                name = %event.route_set.name,
                                kind = ?event.kind,
                                "watch event"
                            );
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "skipping undecodable watch event"),
                    }
                }
            }
            // Dropping tx closes the channel; the engine re-establishes.
        });

        Ok(rx)
    }
}
