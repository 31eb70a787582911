//! # reshard-snapshot
//!
//! Read side of a migration: resolves the snapshot repository's file
//! layout, decodes its checksummed Smile metadata blobs, and exposes
//! version-specific factories producing the shared metadata models. A
//! remote provider yields the same shapes from a live source cluster so
//! downstream stages never care where metadata came from.

pub mod blob_format;
pub mod factory;
pub mod remote;
pub mod repo;
pub mod repo_data;
mod version_es_6_8;
mod version_es_7_10;

pub use factory::{
    snapshot_factories, GlobalMetadataFactory, IndexMetadataFactory, ShardMetadataFactory,
    SnapshotContext, SourceFactories,
};
pub use remote::RemoteMetadataSource;
pub use repo::{FileSystemRepo, SourceRepo};
pub use repo_data::SnapshotRepoData;
