//! API server client.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use terraformer_config::KubeSettings;
use url::Url;

use crate::error::{KubeError, Result, StatusResponse};
use crate::object::{ClusterObject, ObjectKind, ObjectMeta, ObjectRef};
use crate::store::ObjectStore;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the core/v1 ConfigMap and Secret endpoints.
#[derive(Clone)]
pub struct KubeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl KubeClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from configuration, reading the token and CA bundle
    /// from disk when configured.
    pub fn from_settings(settings: &KubeSettings) -> Result<Self> {
        let api_url = settings.effective_api_url().ok_or_else(|| {
            KubeError::Config(
                "no API server URL configured and KUBERNETES_SERVICE_HOST is not set".to_string(),
            )
        })?;

        let mut builder = Self::builder()
            .api_url(api_url)
            .insecure(settings.insecure)
            .timeout(Duration::from_secs(settings.timeout_secs));

        if let Some(path) = settings.token_path.as_deref().filter(|p| p.exists()) {
            builder = builder.token(read_trimmed(path)?);
        }
        if let Some(path) = settings.ca_path.as_deref().filter(|p| p.exists()) {
            let pem = std::fs::read(path).map_err(|e| KubeError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            builder = builder.ca_pem(pem);
        }

        builder.build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn object_url(&self, object: &ObjectRef) -> Result<Url> {
        self.inner
            .base_url
            .join(&format!(
                "api/v1/namespaces/{}/{}/{}",
                object.namespace,
                object.kind.resource(),
                object.name
            ))
            .map_err(KubeError::from)
    }

    fn collection_url(&self, kind: ObjectKind, namespace: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(&format!("api/v1/namespaces/{}/{}", namespace, kind.resource()))
            .map_err(KubeError::from)
    }

    async fn handle_response(
        &self,
        object: &ObjectRef,
        response: reqwest::Response,
    ) -> Result<ClusterObject> {
        if response.status().is_success() {
            let wire: WireObject = response.json().await?;
            decode(object.kind, wire)
        } else {
            Err(extract_error(object, response).await)
        }
    }
}

#[async_trait]
impl ObjectStore for KubeClient {
    async fn get(&self, object: &ObjectRef) -> Result<ClusterObject> {
        let url = self.object_url(object)?;
        tracing::debug!(object = %object, "fetching object");
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(object, response).await
    }

    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject> {
        let target = object.object_ref();
        let url = self.collection_url(target.kind, &target.namespace)?;
        tracing::debug!(object = %target, "creating object");
        let response = self
            .inner
            .http
            .post(url)
            .json(&encode(object))
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(&target, response).await
    }

    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject> {
        let target = object.object_ref();
        let url = self.object_url(&target)?;
        tracing::debug!(object = %target, "updating object");
        let response = self
            .inner
            .http
            .put(url)
            .json(&encode(object))
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(&target, response).await
    }
}

/// Map a failed response to a [`KubeError`].
async fn extract_error(object: &ObjectRef, response: reqwest::Response) -> KubeError {
    let status = response.status().as_u16();
    let body = response.json::<StatusResponse>().await.ok();
    let (reason, message) = match body {
        Some(s) => (s.reason, s.message),
        None => ("Unknown".to_string(), format!("HTTP {}", status)),
    };
    let resource = object.kind.resource().to_string();
    let name = object.name.clone();

    match status {
        404 => KubeError::NotFound { resource, name },
        409 if reason == "AlreadyExists" => KubeError::AlreadyExists { resource, name },
        409 => KubeError::Conflict {
            resource,
            name,
            message,
        },
        _ => KubeError::Api {
            status,
            reason,
            message,
        },
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| KubeError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeta {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireObject {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    metadata: WireMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn decode(kind: ObjectKind, wire: WireObject) -> Result<ClusterObject> {
    let raw = wire.data.unwrap_or_default();
    let data: BTreeMap<String, String> = match kind {
        ObjectKind::ConfigMap => raw,
        ObjectKind::Secret => raw
            .into_iter()
            .map(|(key, value)| {
                let bytes = STANDARD
                    .decode(value.as_bytes())
                    .map_err(|e| KubeError::Decode {
                        key: key.clone(),
                        source: e,
                    })?;
                Ok((key, String::from_utf8_lossy(&bytes).into_owned()))
            })
            .collect::<Result<BTreeMap<_, _>>>()?,
    };

    Ok(ClusterObject {
        kind,
        metadata: ObjectMeta {
            name: wire.metadata.name,
            namespace: wire.metadata.namespace,
            finalizers: wire.metadata.finalizers,
            resource_version: wire.metadata.resource_version,
            extra: wire.metadata.extra,
        },
        data,
        extra: wire.extra,
    })
}

fn encode(object: &ClusterObject) -> WireObject {
    let data = match object.kind {
        ObjectKind::ConfigMap => object.data.clone(),
        ObjectKind::Secret => object
            .data
            .iter()
            .map(|(k, v)| (k.clone(), STANDARD.encode(v.as_bytes())))
            .collect(),
    };

    WireObject {
        api_version: "v1".to_string(),
        kind: object.kind.as_str().to_string(),
        metadata: WireMeta {
            name: object.metadata.name.clone(),
            namespace: object.metadata.namespace.clone(),
            finalizers: object.metadata.finalizers.clone(),
            resource_version: object.metadata.resource_version.clone(),
            extra: object.metadata.extra.clone(),
        },
        data: (!data.is_empty()).then_some(data),
        extra: object.extra.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a [`KubeClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    api_url: Option<String>,
    token: Option<String>,
    ca_pem: Option<Vec<u8>>,
    insecure: bool,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API server URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set the bearer token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Trust an additional PEM-encoded CA certificate.
    pub fn ca_pem(mut self, pem: Vec<u8>) -> Self {
        self.ca_pem = Some(pem);
        self
    }

    /// Disable TLS certificate verification.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<KubeClient> {
        let api_url = self
            .api_url
            .ok_or_else(|| KubeError::Config("api_url is required".to_string()))?;

        let mut base_url = Url::parse(&api_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| KubeError::Config("invalid bearer token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("terraformer/{}", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(self.insecure);
        if let Some(pem) = &self.ca_pem {
            http = http.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }

        Ok(KubeClient {
            inner: Arc::new(ClientInner {
                http: http.build()?,
                base_url,
                timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            }),
        })
    }
}
