//! # reshard-migrate
//!
//! The document-moving half of a migration: unpack a shard's snapshot
//! blobs into real segment files, read the live documents out of them,
//! and push the documents into the target's bulk API under bounded
//! concurrency. Runners tie the phases together and produce the final
//! migration summary.

pub mod config;
pub mod lucene;
pub mod reindexer;
pub mod runner;
pub mod summary;
pub mod unpacker;

pub use config::MigrationConfig;
pub use lucene::{reader_for_version, LuceneIndexReader};
pub use reindexer::{DocumentReindexer, ReindexSummary};
pub use runner::{DocumentsRunner, IndexRunner, MetadataRunner};
pub use summary::{DocumentTotals, MigrationSummary, ShardFailure};
pub use unpacker::{ShardUnpacker, SnapshotShardUnpacker, UnpackedShard};
