//! Snapshot repository path layout.
//!
//! A filesystem repository looks like:
//!
//! ```text
//! index.latest                          8-byte BE repo-data generation
//! index-N                               repo data (JSON)
//! meta-{snapshot-uuid}.dat              global metadata blob
//! snap-{snapshot-uuid}.dat              snapshot info blob
//! indices/{index-id}/meta-{blob-id}.dat per-index metadata blob
//! indices/{index-id}/{shard}/snap-{snapshot-uuid}.dat  shard manifest
//! indices/{index-id}/{shard}/__N[.partM]               segment blobs
//! ```
//!
//! The repository is strictly read-only.

use std::fs;
use std::path::{Path, PathBuf};

use reshard_core::{Error, Result};

/// Resolves repository-relative names to readable files.
pub trait SourceRepo: Send + Sync {
    /// The raw `index-N` repo-data document for the latest generation.
    fn repo_data_bytes(&self) -> Result<Vec<u8>>;

    fn global_metadata_path(&self, snapshot_uuid: &str) -> PathBuf;

    fn snapshot_info_path(&self, snapshot_uuid: &str) -> PathBuf;

    fn index_metadata_path(&self, index_id: &str, blob_id: &str) -> PathBuf;

    fn shard_manifest_path(&self, index_id: &str, shard: u32, snapshot_uuid: &str) -> PathBuf;

    fn blob_path(&self, index_id: &str, shard: u32, blob_name: &str) -> PathBuf;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Production repository rooted at a local directory (or a mount of one).
#[derive(Debug, Clone)]
pub struct FileSystemRepo {
    root: PathBuf,
}

impl FileSystemRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Latest repo-data generation, from `index.latest` when present, else
    /// the highest `index-N` found (older repositories omit the pointer).
    fn latest_generation(&self) -> Result<u64> {
        let pointer = self.root.join("index.latest");
        if pointer.exists() {
            let bytes = fs::read(&pointer)?;
            let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                Error::Snapshot(format!(
                    "index.latest must be 8 bytes, found {}",
                    bytes.len()
                ))
            })?;
            return Ok(u64::from_be_bytes(arr));
        }
        let mut best: Option<u64> = None;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(generation) = name
                .to_str()
                .and_then(|n| n.strip_prefix("index-"))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            best = Some(best.map_or(generation, |b| b.max(generation)));
        }
        best.ok_or_else(|| {
            Error::Snapshot(format!(
                "no repo data found under {}",
                self.root.display()
            ))
        })
    }
}

impl SourceRepo for FileSystemRepo {
    fn repo_data_bytes(&self) -> Result<Vec<u8>> {
        let generation = self.latest_generation()?;
        self.read_file(&self.root.join(format!("index-{generation}")))
    }

    fn global_metadata_path(&self, snapshot_uuid: &str) -> PathBuf {
        self.root.join(format!("meta-{snapshot_uuid}.dat"))
    }

    fn snapshot_info_path(&self, snapshot_uuid: &str) -> PathBuf {
        self.root.join(format!("snap-{snapshot_uuid}.dat"))
    }

    fn index_metadata_path(&self, index_id: &str, blob_id: &str) -> PathBuf {
        self.root
            .join("indices")
            .join(index_id)
            .join(format!("meta-{blob_id}.dat"))
    }

    fn shard_manifest_path(&self, index_id: &str, shard: u32, snapshot_uuid: &str) -> PathBuf {
        self.root
            .join("indices")
            .join(index_id)
            .join(shard.to_string())
            .join(format!("snap-{snapshot_uuid}.dat"))
    }

    fn blob_path(&self, index_id: &str, shard: u32, blob_name: &str) -> PathBuf {
        self.root
            .join("indices")
            .join(index_id)
            .join(shard.to_string())
            .join(blob_name)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            Error::Snapshot(format!("failed to read {}: {e}", path.display()))
        })
    }
}
