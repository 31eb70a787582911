//! REST client with retry/backoff and the OpenSearch client built on it.
//!
//! Metadata creation follows a GET-then-PUT idempotency protocol: an item
//! that already exists is an outcome, never an error. Transient failures
//! are retried with capped exponential backoff; a 400 from the target is
//! terminal because re-sending the same body cannot succeed.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};

use reshard_core::version::{Flavor, Version};
use reshard_core::{defaults, Error, Result};

use crate::connection::ConnectionContext;

/// A completed HTTP exchange, body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(Into::into)
    }
}

/// Backoff schedule for retried requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn metadata() -> Self {
        Self {
            max_retries: defaults::REQUEST_MAX_RETRIES,
            backoff: Duration::from_millis(defaults::REQUEST_BACKOFF_MS),
            max_backoff: Duration::from_millis(defaults::REQUEST_MAX_BACKOFF_MS),
        }
    }

    pub fn bulk() -> Self {
        Self {
            max_retries: defaults::BULK_MAX_RETRIES,
            backoff: Duration::from_millis(defaults::BULK_BACKOFF_MS),
            max_backoff: Duration::from_millis(defaults::BULK_MAX_BACKOFF_MS),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_backoff)
    }
}

/// Whether an error is worth retrying: transport failures and
/// overload/server-side statuses only.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Request(_) => true,
        Error::Target { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Run `op` under `policy`, sleeping between retryable failures.
pub(crate) async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Thin request/response client for one cluster endpoint.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    ctx: ConnectionContext,
}

impl RestClient {
    pub fn new(ctx: ConnectionContext) -> Result<Self> {
        let client = ctx.build_client()?;
        Ok(Self { client, ctx })
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn put(&self, path: &str, body: Option<String>) -> Result<HttpResponse> {
        self.send(Method::PUT, path, body).await
    }

    pub async fn post(&self, path: &str, body: Option<String>) -> Result<HttpResponse> {
        self.send(Method::POST, path, body).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<HttpResponse> {
        let url = self.ctx.url_for(path);
        let mut request = self.client.request(method, &url);
        if let (Some(user), Some(pass)) = (&self.ctx.username, &self.ctx.password) {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url, status, "Request completed");
        Ok(HttpResponse { status, body })
    }
}

/// Outcome of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// The seam the metadata creators use to reach a target cluster, so tests
/// substitute an in-memory implementation.
#[async_trait]
pub trait MetadataTarget: Send + Sync {
    async fn create_legacy_template(&self, name: &str, body: &Value) -> Result<CreateOutcome>;
    async fn create_component_template(&self, name: &str, body: &Value) -> Result<CreateOutcome>;
    async fn create_index_template(&self, name: &str, body: &Value) -> Result<CreateOutcome>;
    async fn create_index(&self, name: &str, body: &Value) -> Result<CreateOutcome>;
}

/// Client for an Elasticsearch/OpenSearch cluster's REST API.
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    rest: RestClient,
}

impl OpenSearchClient {
    pub fn new(ctx: ConnectionContext) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(ctx)?,
        })
    }

    /// The underlying REST client, for callers with bespoke request shapes
    /// (work coordination, remote metadata reads).
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Detect the cluster's version from `GET /`.
    pub async fn cluster_version(&self) -> Result<Version> {
        let response = with_retry(RetryPolicy::metadata(), || async move {
            let resp = self.rest.get("/").await?;
            if resp.status != 200 {
                return Err(Error::Target {
                    status: resp.status,
                    body: resp.body,
                });
            }
            Ok(resp)
        })
        .await?;
        version_from_root_body(&response.json()?)
    }

    /// GET a JSON document, retrying transient failures; non-200 is a
    /// target failure.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let response = with_retry(RetryPolicy::metadata(), || async move {
            let resp = self.rest.get(path).await?;
            if resp.status != 200 {
                return Err(Error::Target {
                    status: resp.status,
                    body: resp.body,
                });
            }
            Ok(resp)
        })
        .await?;
        response.json()
    }

    /// POST with an empty JSON body, used for `_refresh`-style calls.
    pub async fn post_empty(&self, path: &str) -> Result<Value> {
        let response = with_retry(RetryPolicy::metadata(), || async move {
            let resp = self.rest.post(path, Some("{}".to_string())).await?;
            if resp.status != 200 {
                return Err(Error::Target {
                    status: resp.status,
                    body: resp.body,
                });
            }
            Ok(resp)
        })
        .await?;
        response.json()
    }

    /// Create an object if it does not already exist.
    ///
    /// GET first: 200 means it exists, 404 means it can be created, any
    /// other status is a target failure. The PUT treats 400 as terminal.
    async fn create_object_idempotent(&self, path: &str, body: &Value) -> Result<CreateOutcome> {
        let existing = with_retry(RetryPolicy::metadata(), || async move {
            let resp = self.rest.get(path).await?;
            match resp.status {
                200 | 404 => Ok(resp),
                status => Err(Error::Target {
                    status,
                    body: resp.body,
                }),
            }
        })
        .await?;

        if existing.status == 200 {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let payload = serde_json::to_string(body)?;
        with_retry(RetryPolicy::metadata(), || {
            let payload = payload.clone();
            async move {
                let resp = self.rest.put(path, Some(payload)).await?;
                match resp.status {
                    200 | 201 => Ok(()),
                    status => Err(Error::Target {
                        status,
                        body: resp.body,
                    }),
                }
            }
        })
        .await?;
        Ok(CreateOutcome::Created)
    }
}

#[async_trait]
impl MetadataTarget for OpenSearchClient {
    async fn create_legacy_template(&self, name: &str, body: &Value) -> Result<CreateOutcome> {
        self.create_object_idempotent(&format!("_template/{name}"), body)
            .await
    }

    async fn create_component_template(&self, name: &str, body: &Value) -> Result<CreateOutcome> {
        self.create_object_idempotent(&format!("_component_template/{name}"), body)
            .await
    }

    async fn create_index_template(&self, name: &str, body: &Value) -> Result<CreateOutcome> {
        self.create_object_idempotent(&format!("_index_template/{name}"), body)
            .await
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<CreateOutcome> {
        self.create_object_idempotent(name, body).await
    }
}

/// Parse a `GET /` response body into a [`Version`].
///
/// OpenSearch advertises `version.distribution: "opensearch"`; its absence
/// means Elasticsearch.
pub fn version_from_root_body(body: &Value) -> Result<Version> {
    let version_node = body
        .get("version")
        .ok_or_else(|| Error::VersionParse("response has no 'version' object".into()))?;
    let number = version_node
        .get("number")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::VersionParse("response has no 'version.number'".into()))?;

    let mut parts = number.split('.');
    let mut next_part = |name: &str| -> Result<u32> {
        parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::VersionParse(format!("bad {name} in version '{number}'")))
    };
    let major = next_part("major")?;
    let minor = next_part("minor")?;
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    let flavor = match version_node.get("distribution").and_then(Value::as_str) {
        Some(d) if d.eq_ignore_ascii_case("opensearch") => Flavor::OpenSearch,
        _ => Flavor::Elasticsearch,
    };
    Ok(Version::new(flavor, major, minor, patch))
}
