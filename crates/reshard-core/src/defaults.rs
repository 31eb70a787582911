//! Centralized default constants for the reshard system.
//!
//! **This module is the single source of truth** for shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// WORK COORDINATION
// =============================================================================

/// Default exclusive lease on a work item. Must exceed the expected p99
/// shard-migration time; a crashed worker's item becomes reclaimable only
/// after this elapses.
pub const LEASE_DURATION_SECS: u64 = 600;

/// Dedicated index holding work-item state on the coordination cluster.
pub const COORDINATION_INDEX: &str = ".migrations_working_state";

/// Cap on the per-item lease doubling exponent. A repeatedly failing item
/// keeps its lease bounded instead of growing past a work day.
pub const MAX_LEASE_EXPONENT: u32 = 7;

/// How many expired/unclaimed candidates to fetch per acquisition attempt.
pub const ACQUIRE_CANDIDATE_WINDOW: usize = 10;

/// Worker loop sleep between polls when acquisition loses every candidate
/// to a concurrent worker.
pub const WORKER_POLL_INTERVAL_MS: u64 = 1_000;

// =============================================================================
// DOCUMENT REINDEXING
// =============================================================================

/// Maximum documents per bulk request.
pub const MAX_DOCS_PER_BULK_REQUEST: usize = 1_000;

/// Maximum serialized bytes per bulk request.
pub const MAX_BYTES_PER_BULK_REQUEST: usize = 10 * 1024 * 1024;

/// Maximum bulk requests in flight per shard; this cap is the
/// backpressure mechanism for document production.
pub const MAX_CONCURRENT_BULK_REQUESTS: usize = 5;

// =============================================================================
// SHARD UNPACKING
// =============================================================================

/// Shards above this size fail before any unpack I/O is spent.
pub const MAX_SHARD_SIZE_BYTES: u64 = 80 * 1024 * 1024 * 1024;

/// Copy buffer for streaming blob parts into segment files.
pub const UNPACK_BUFFER_BYTES: usize = 128 * 1024;

// =============================================================================
// TARGET REQUESTS
// =============================================================================

/// Retry attempts for metadata-level requests.
pub const REQUEST_MAX_RETRIES: u32 = 3;

/// Initial backoff for metadata-level requests (doubles per attempt).
pub const REQUEST_BACKOFF_MS: u64 = 1_000;

/// Backoff ceiling for metadata-level requests.
pub const REQUEST_MAX_BACKOFF_MS: u64 = 10_000;

/// Retry attempts for bulk indexing requests (retries for ~10 minutes).
pub const BULK_MAX_RETRIES: u32 = 15;

/// Initial backoff for bulk indexing requests.
pub const BULK_BACKOFF_MS: u64 = 2_000;

/// Backoff ceiling for bulk indexing requests.
pub const BULK_MAX_BACKOFF_MS: u64 = 60_000;

// =============================================================================
// METADATA
// =============================================================================

/// Indices whose names start with this prefix are system indices and are
/// never migrated.
pub const SYSTEM_INDEX_PREFIX: &str = ".";

/// Field ES 7+ uses to mark soft-deleted documents.
pub const SOFT_DELETES_FIELD: &str = "__soft_deletes";
