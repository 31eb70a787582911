//! Connection configuration for a cluster endpoint.

use std::time::Duration;

use reqwest::Client;

use reshard_core::{Error, Result};

/// Request timeout for individual cluster calls.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Host, credentials, and TLS posture for one cluster endpoint.
///
/// The same shape serves source clusters (remote reads), target clusters
/// (metadata creation, bulk indexing), and the coordination store.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept invalid TLS certificates (self-signed dev clusters).
    pub insecure: bool,
}

impl ConnectionContext {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: None,
            insecure: false,
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Build the underlying HTTP client. Missing host is a configuration
    /// error surfaced before any work begins.
    pub fn build_client(&self) -> Result<Client> {
        if self.host.is_empty() {
            return Err(Error::Config("cluster host must not be empty".into()));
        }
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(self.insecure)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
    }

    /// Join a path onto the configured host.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let ctx = ConnectionContext::new("http://localhost:9200/");
        assert_eq!(
            ctx.url_for("/_index_template"),
            "http://localhost:9200/_index_template"
        );
        assert_eq!(ctx.url_for("logs/_bulk"), "http://localhost:9200/logs/_bulk");
    }

    #[test]
    fn test_empty_host_is_config_error() {
        let ctx = ConnectionContext::new("");
        assert!(matches!(
            ctx.build_client(),
            Err(reshard_core::Error::Config(_))
        ));
    }

    #[test]
    fn test_basic_auth_builder() {
        let ctx = ConnectionContext::new("https://example:9200")
            .with_basic_auth("admin", "admin")
            .with_insecure(true);
        assert_eq!(ctx.username.as_deref(), Some("admin"));
        assert!(ctx.insecure);
    }
}
