//! Metadata source traits and the version-keyed factory registry.
//!
//! The registry is consulted once at startup with the declared source
//! version; after that, every read goes through the selected factories and
//! no version checks happen on the hot path.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use reshard_core::version::matchers;
use reshard_core::{
    Error, GlobalMetadata, IndexMetadata, Result, ShardFileInfo, ShardMetadata, Version,
};

use crate::blob_format::{parse_blob, SNAPSHOT_CODEC};
use crate::repo::SourceRepo;
use crate::repo_data::SnapshotRepoData;
use crate::version_es_6_8;
use crate::version_es_7_10;

/// Produces the source cluster's templates.
#[async_trait]
pub trait GlobalMetadataFactory: Send + Sync {
    async fn global_metadata(&self) -> Result<GlobalMetadata>;
}

/// Produces per-index metadata and the index listing.
#[async_trait]
pub trait IndexMetadataFactory: Send + Sync {
    async fn list_index_names(&self) -> Result<Vec<String>>;

    async fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata>;
}

/// Produces the shard manifest locating one shard's segment blobs.
#[async_trait]
pub trait ShardMetadataFactory: Send + Sync {
    async fn shard_metadata(&self, index_name: &str, shard: u32) -> Result<ShardMetadata>;
}

/// Everything a snapshot-backed factory needs: the repository, its parsed
/// repo data, and which snapshot this run reads.
#[derive(Clone)]
pub struct SnapshotContext {
    pub repo: Arc<dyn SourceRepo>,
    pub repo_data: Arc<SnapshotRepoData>,
    pub snapshot_name: String,
}

impl SnapshotContext {
    pub fn new(repo: Arc<dyn SourceRepo>, snapshot_name: impl Into<String>) -> Result<Self> {
        let repo_data = Arc::new(SnapshotRepoData::from_repo(repo.as_ref())?);
        let snapshot_name = snapshot_name.into();
        // Fail now if the snapshot is unknown, not on first read.
        repo_data.resolve_snapshot(&snapshot_name)?;
        Ok(Self {
            repo,
            repo_data,
            snapshot_name,
        })
    }

    pub fn snapshot_uuid(&self) -> Result<String> {
        Ok(self
            .repo_data
            .resolve_snapshot(&self.snapshot_name)?
            .uuid
            .clone())
    }
}

/// The factory set selected for one source version.
pub struct SourceFactories {
    pub global: Arc<dyn GlobalMetadataFactory>,
    pub index: Arc<dyn IndexMetadataFactory>,
    pub shard: Arc<dyn ShardMetadataFactory>,
}

type FamilyConstructor = fn(SnapshotContext) -> SourceFactories;

/// Version predicate → factory family. Most specific first.
const REGISTRY: &[(fn(&Version) -> bool, FamilyConstructor)] = &[
    (matchers::is_es_6_8, version_es_6_8::factories),
    (matchers::is_es_7_x, version_es_7_10::factories),
    // OS 1.x repositories use the same layout and blob shapes as ES 7.10.
    (matchers::is_os_1_x, version_es_7_10::factories),
];

/// Select snapshot-backed factories for the declared source version.
pub fn snapshot_factories(
    source_version: &Version,
    context: SnapshotContext,
) -> Result<SourceFactories> {
    for (predicate, constructor) in REGISTRY {
        if predicate(source_version) {
            info!(
                version = %source_version,
                snapshot = context.snapshot_name,
                "Selected snapshot metadata factories"
            );
            return Ok(constructor(context));
        }
    }
    Err(Error::Config(format!(
        "unsupported source version {source_version}"
    )))
}

#[derive(Debug, Deserialize)]
struct RawShardManifest {
    #[serde(default)]
    files: Vec<RawShardFile>,
}

#[derive(Debug, Deserialize)]
struct RawShardFile {
    name: String,
    physical_name: String,
    length: u64,
    #[serde(default)]
    part_size: Option<u64>,
    #[serde(default, with = "serde_bytes")]
    meta_hash: Option<Vec<u8>>,
}

/// Shard manifests share one shape across all supported source versions.
pub(crate) struct SnapshotShardMetadataFactory {
    pub(crate) context: SnapshotContext,
}

#[async_trait]
impl ShardMetadataFactory for SnapshotShardMetadataFactory {
    async fn shard_metadata(&self, index_name: &str, shard: u32) -> Result<ShardMetadata> {
        let index_id = self.context.repo_data.resolve_index_id(index_name)?;
        let snapshot_uuid = self.context.snapshot_uuid()?;
        let path = self
            .context
            .repo
            .shard_manifest_path(index_id, shard, &snapshot_uuid);
        let bytes = self.context.repo.read_file(&path)?;
        let raw: RawShardManifest = parse_blob(SNAPSHOT_CODEC, &bytes)?;

        let files: Vec<ShardFileInfo> = raw
            .files
            .into_iter()
            .map(|f| ShardFileInfo {
                name: f.name,
                physical_name: f.physical_name,
                length: f.length,
                part_size: f.part_size,
                meta_hash: f.meta_hash,
            })
            .collect();
        let total_size_bytes = files.iter().map(|f| f.length).sum();
        Ok(ShardMetadata {
            snapshot_name: self.context.snapshot_name.clone(),
            index_name: index_name.to_string(),
            index_id: index_id.to_string(),
            shard_id: shard,
            total_size_bytes,
            files,
        })
    }
}

/// Parse `index.number_of_shards` from either settings representation.
pub(crate) fn shard_count_from_settings(settings: &serde_json::Value) -> Result<u32> {
    let raw = settings
        .get("index.number_of_shards")
        .or_else(|| settings.get("index").and_then(|i| i.get("number_of_shards")))
        .ok_or_else(|| Error::Snapshot("settings missing index.number_of_shards".into()))?;
    match raw {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Snapshot(format!("unparseable index.number_of_shards: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_format::testutil::write_blob;
    use crate::repo::FileSystemRepo;
    use reshard_core::Flavor;
    use serde_json::json;
    use std::fs;

    fn seed_repo(dir: &std::path::Path) {
        let repo_data = json!({
            "snapshots": [{"name": "s1", "uuid": "u1"}],
            "indices": {"logs": {"id": "id1", "snapshots": ["u1"]}}
        });
        fs::write(dir.join("index-0"), repo_data.to_string()).unwrap();
    }

    #[test]
    fn test_registry_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        seed_repo(dir.path());
        let context = SnapshotContext::new(
            Arc::new(FileSystemRepo::new(dir.path())),
            "s1",
        )
        .unwrap();
        let es5 = Version::new(Flavor::Elasticsearch, 5, 6, 0);
        assert!(matches!(
            snapshot_factories(&es5, context),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_context_rejects_unknown_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        seed_repo(dir.path());
        let result =
            SnapshotContext::new(Arc::new(FileSystemRepo::new(dir.path())), "absent");
        assert!(matches!(result, Err(Error::Snapshot(_))));
    }

    #[tokio::test]
    async fn test_shard_manifest_decoding() {
        let dir = tempfile::tempdir().unwrap();
        seed_repo(dir.path());
        let shard_dir = dir.path().join("indices/id1/0");
        fs::create_dir_all(&shard_dir).unwrap();
        let manifest = json!({
            "name": "s1",
            "files": [
                {"name": "__0", "physical_name": "_0.fdt", "length": 2048,
                 "part_size": 1024},
                {"name": "v__1", "physical_name": "segments_2", "length": 4,
                 "meta_hash": serde_json::Value::from(vec![1u8, 2, 3, 4])}
            ]
        });
        fs::write(shard_dir.join("snap-u1.dat"), write_blob(SNAPSHOT_CODEC, &manifest)).unwrap();

        let context = SnapshotContext::new(
            Arc::new(FileSystemRepo::new(dir.path())),
            "s1",
        )
        .unwrap();
        let factory = SnapshotShardMetadataFactory { context };
        let shard = factory.shard_metadata("logs", 0).await.unwrap();
        assert_eq!(shard.total_size_bytes, 2052);
        assert_eq!(shard.files.len(), 2);
        assert_eq!(shard.files[0].number_of_parts(), 2);
        assert_eq!(shard.files[1].meta_hash.as_deref(), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn test_shard_count_parsing() {
        assert_eq!(
            shard_count_from_settings(&json!({"index.number_of_shards": "3"})).unwrap(),
            3
        );
        assert_eq!(
            shard_count_from_settings(&json!({"index": {"number_of_shards": 2}})).unwrap(),
            2
        );
        assert!(shard_count_from_settings(&json!({})).is_err());
    }
}
