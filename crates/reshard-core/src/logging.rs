//! Structured logging schema and field name constants for reshard.
//!
//! All crates use these constants for consistent structured logging
//! fields, so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Failed work item or phase, requires operator attention |
//! | WARN  | Recoverable issue (retry scheduled, item skipped) |
//! | INFO  | Lifecycle events, phase completions |
//! | DEBUG | Decision points, per-item outcomes |
//! | TRACE | Per-document iteration, bulk body assembly |

use tracing_subscriber::EnvFilter;

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "snapshot", "transform", "cluster", "coordination", "migrate"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "acquire_next", "unpack", "reindex", "create_index"
pub const OPERATION: &str = "op";

/// Worker process identity in the coordination store.
pub const WORKER_ID: &str = "worker_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Snapshot name being migrated.
pub const SNAPSHOT: &str = "snapshot";

/// Index name being operated on.
pub const INDEX: &str = "index";

/// Shard number within an index.
pub const SHARD: &str = "shard";

/// Work item id (`index__shard`).
pub const WORK_ITEM_ID: &str = "work_item_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Documents processed by an operation.
pub const DOC_COUNT: &str = "doc_count";

/// Documents in one bulk request.
pub const BATCH_SIZE: &str = "batch_size";

/// Shard size in bytes.
pub const SHARD_SIZE_BYTES: &str = "shard_size_bytes";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Initialize the global subscriber from `RUST_LOG`, defaulting to `info`.
///
/// Front-ends (CLI, console) normally install their own subscriber; this
/// helper exists for tests and embedded use.
pub fn init_from_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
