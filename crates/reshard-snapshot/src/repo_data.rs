//! The repo-data index (`index-N`): which snapshots exist and which
//! indices each one contains.

use std::collections::BTreeMap;

use serde::Deserialize;

use reshard_core::{Error, Result};

use crate::repo::SourceRepo;

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub uuid: String,
    /// Index id → metadata identifier, present since ES 7.6 repositories.
    #[serde(default)]
    pub index_metadata_lookup: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    id: String,
    /// Uuids of the snapshots containing this index.
    #[serde(default)]
    snapshots: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRepoData {
    #[serde(default)]
    snapshots: Vec<SnapshotEntry>,
    #[serde(default)]
    indices: BTreeMap<String, IndexEntry>,
    /// Metadata identifier → blob id, newer repositories only.
    #[serde(default)]
    index_metadata_identifiers: BTreeMap<String, String>,
}

/// Parsed repo data with name/id resolution. Missing names resolve to
/// `Error::Snapshot` so callers fail with the offending name attached.
#[derive(Debug, Clone)]
pub struct SnapshotRepoData {
    raw: RawRepoData,
}

impl SnapshotRepoData {
    pub fn from_repo(repo: &dyn SourceRepo) -> Result<Self> {
        let bytes = repo.repo_data_bytes()?;
        let raw: RawRepoData = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Snapshot(format!("malformed repo data: {e}")))?;
        Ok(Self { raw })
    }

    pub fn list_snapshots(&self) -> Vec<&str> {
        self.raw.snapshots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn resolve_snapshot(&self, name: &str) -> Result<&SnapshotEntry> {
        self.raw
            .snapshots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::Snapshot(format!("snapshot '{name}' not found in repository")))
    }

    /// Index names captured by the named snapshot.
    pub fn list_indices(&self, snapshot_name: &str) -> Result<Vec<String>> {
        let snapshot = self.resolve_snapshot(snapshot_name)?;
        Ok(self
            .raw
            .indices
            .iter()
            .filter(|(_, entry)| entry.snapshots.contains(&snapshot.uuid))
            .map(|(name, _)| name.clone())
            .collect())
    }

    pub fn resolve_index_id(&self, index_name: &str) -> Result<&str> {
        self.raw
            .indices
            .get(index_name)
            .map(|e| e.id.as_str())
            .ok_or_else(|| {
                Error::Snapshot(format!("index '{index_name}' not found in repository"))
            })
    }

    /// Blob id of the per-index metadata file. Newer repositories map it
    /// through the snapshot's metadata lookup; older ones name the blob
    /// after the snapshot uuid itself.
    pub fn index_metadata_blob_id(&self, snapshot_name: &str, index_name: &str) -> Result<String> {
        let snapshot = self.resolve_snapshot(snapshot_name)?;
        let index_id = self.resolve_index_id(index_name)?;
        if let Some(identifier) = snapshot.index_metadata_lookup.get(index_id) {
            if let Some(blob_id) = self.raw.index_metadata_identifiers.get(identifier) {
                return Ok(blob_id.clone());
            }
            return Ok(identifier.clone());
        }
        Ok(snapshot.uuid.clone())
    }
}
