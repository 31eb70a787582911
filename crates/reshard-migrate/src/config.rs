//! Runtime knobs for a migration worker.
//!
//! Everything has a sensible default; deployments override through the
//! builder or through `RESHARD_*` environment variables.

use uuid::Uuid;

use reshard_core::{defaults, Error, Result};

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Identifies this worker in coordination lease records.
    pub worker_id: String,
    pub lease_duration_secs: u64,
    pub max_shard_size_bytes: u64,
    pub max_docs_per_bulk_request: usize,
    pub max_bytes_per_bulk_request: usize,
    pub max_concurrent_bulk_requests: usize,
    /// How long a worker sleeps when no work item is claimable.
    pub poll_interval_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            lease_duration_secs: defaults::LEASE_DURATION_SECS,
            max_shard_size_bytes: defaults::MAX_SHARD_SIZE_BYTES,
            max_docs_per_bulk_request: defaults::MAX_DOCS_PER_BULK_REQUEST,
            max_bytes_per_bulk_request: defaults::MAX_BYTES_PER_BULK_REQUEST,
            max_concurrent_bulk_requests: defaults::MAX_CONCURRENT_BULK_REQUESTS,
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
        }
    }
}

impl MigrationConfig {
    /// Defaults overlaid with any `RESHARD_*` variables present.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(id) = read_env("RESHARD_WORKER_ID") {
            config.worker_id = id;
        }
        if let Some(raw) = read_env("RESHARD_LEASE_SECS") {
            config.lease_duration_secs = parse_env("RESHARD_LEASE_SECS", &raw)?;
        }
        if let Some(raw) = read_env("RESHARD_MAX_SHARD_SIZE_BYTES") {
            config.max_shard_size_bytes = parse_env("RESHARD_MAX_SHARD_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = read_env("RESHARD_MAX_DOCS_PER_BULK_REQUEST") {
            config.max_docs_per_bulk_request = parse_env("RESHARD_MAX_DOCS_PER_BULK_REQUEST", &raw)?;
        }
        if let Some(raw) = read_env("RESHARD_MAX_BYTES_PER_BULK_REQUEST") {
            config.max_bytes_per_bulk_request =
                parse_env("RESHARD_MAX_BYTES_PER_BULK_REQUEST", &raw)?;
        }
        if let Some(raw) = read_env("RESHARD_MAX_CONCURRENT_BULK_REQUESTS") {
            config.max_concurrent_bulk_requests =
                parse_env("RESHARD_MAX_CONCURRENT_BULK_REQUESTS", &raw)?;
        }
        if let Some(raw) = read_env("RESHARD_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_env("RESHARD_POLL_INTERVAL_MS", &raw)?;
        }
        Ok(config)
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_lease_duration_secs(mut self, secs: u64) -> Self {
        self.lease_duration_secs = secs;
        self
    }

    pub fn with_max_shard_size_bytes(mut self, bytes: u64) -> Self {
        self.max_shard_size_bytes = bytes;
        self
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("invalid value '{raw}' for {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.lease_duration_secs, defaults::LEASE_DURATION_SECS);
        assert_eq!(config.max_shard_size_bytes, defaults::MAX_SHARD_SIZE_BYTES);
    }

    #[test]
    fn test_distinct_default_worker_ids() {
        assert_ne!(
            MigrationConfig::default().worker_id,
            MigrationConfig::default().worker_id
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = MigrationConfig::default()
            .with_worker_id("w1")
            .with_lease_duration_secs(30)
            .with_max_shard_size_bytes(1024);
        assert_eq!(config.worker_id, "w1");
        assert_eq!(config.lease_duration_secs, 30);
        assert_eq!(config.max_shard_size_bytes, 1024);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        assert!(parse_env::<u64>("RESHARD_LEASE_SECS", "ten").is_err());
        assert_eq!(parse_env::<u64>("RESHARD_LEASE_SECS", "10").unwrap(), 10);
    }
}
