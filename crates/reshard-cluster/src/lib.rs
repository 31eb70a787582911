//! # reshard-cluster
//!
//! HTTP access to source, target, and coordination clusters: connection
//! configuration, a thin REST client with capped exponential backoff, the
//! OpenSearch client (idempotent metadata creates, bulk indexing), and the
//! metadata creators that aggregate per-item [`CreationResult`]s.

pub mod bulk;
pub mod client;
pub mod connection;
pub mod creator;

pub use bulk::{BulkClient, BulkDocSection, BulkReport, FailedDoc};
pub use client::{CreateOutcome, HttpResponse, MetadataTarget, OpenSearchClient, RestClient};
pub use connection::ConnectionContext;
pub use creator::{
    AllowLists, CreationFailure, CreationResult, GlobalMetadataCreator, IndexCreator, ItemKind,
    Items,
};
