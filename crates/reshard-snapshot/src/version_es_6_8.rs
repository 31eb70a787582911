//! Metadata factories for ES 6.8 snapshot repositories.
//!
//! The 6.8 family has only legacy templates, and index mappings keep their
//! named type exactly as written (the transformation engine hoists them
//! later). The per-index metadata blob is named after the snapshot uuid.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use reshard_core::{Error, GlobalMetadata, IndexMetadata, Result};

use crate::blob_format::{parse_blob, GLOBAL_METADATA_CODEC, INDEX_METADATA_CODEC};
use crate::factory::{
    shard_count_from_settings, GlobalMetadataFactory, IndexMetadataFactory, SnapshotContext,
    SnapshotShardMetadataFactory, SourceFactories,
};

pub(crate) fn factories(context: SnapshotContext) -> SourceFactories {
    SourceFactories {
        global: Arc::new(GlobalFactory {
            context: context.clone(),
        }),
        index: Arc::new(IndexFactory {
            context: context.clone(),
        }),
        shard: Arc::new(SnapshotShardMetadataFactory { context }),
    }
}

struct GlobalFactory {
    context: SnapshotContext,
}

#[async_trait]
impl GlobalMetadataFactory for GlobalFactory {
    async fn global_metadata(&self) -> Result<GlobalMetadata> {
        let root = read_metadata_root(&self.context).await?;
        Ok(GlobalMetadata {
            templates: root
                .get("templates")
                .cloned()
                .unwrap_or_else(empty_object),
            index_templates: empty_object(),
            component_templates: empty_object(),
        })
    }
}

struct IndexFactory {
    context: SnapshotContext,
}

#[async_trait]
impl IndexMetadataFactory for IndexFactory {
    async fn list_index_names(&self) -> Result<Vec<String>> {
        self.context
            .repo_data
            .list_indices(&self.context.snapshot_name)
    }

    async fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata> {
        let body = read_index_body(&self.context, index_name).await?;
        let settings = body.get("settings").cloned().unwrap_or_else(empty_object);
        Ok(IndexMetadata {
            name: index_name.to_string(),
            id: self
                .context
                .repo_data
                .resolve_index_id(index_name)?
                .to_string(),
            number_of_shards: shard_count_from_settings(&settings)?,
            settings,
            // Typed mappings are kept as written; hoisting is the
            // transformation engine's job.
            mappings: body.get("mappings").cloned().unwrap_or_else(empty_object),
            aliases: body.get("aliases").cloned().unwrap_or_else(empty_object),
        })
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Global metadata blobs wrap everything in a `meta-data` object.
pub(crate) async fn read_metadata_root(context: &SnapshotContext) -> Result<Value> {
    let uuid = context.snapshot_uuid()?;
    let path = context.repo.global_metadata_path(&uuid);
    let bytes = context.repo.read_file(&path)?;
    let parsed: Value = parse_blob(GLOBAL_METADATA_CODEC, &bytes)?;
    parsed
        .get("meta-data")
        .cloned()
        .ok_or_else(|| Error::Snapshot("global metadata blob missing 'meta-data' root".into()))
}

/// Per-index metadata blobs have a single root key, the index name.
pub(crate) async fn read_index_body(
    context: &SnapshotContext,
    index_name: &str,
) -> Result<Value> {
    let index_id = context.repo_data.resolve_index_id(index_name)?;
    let blob_id = context
        .repo_data
        .index_metadata_blob_id(&context.snapshot_name, index_name)?;
    let path = context.repo.index_metadata_path(index_id, &blob_id);
    let bytes = context.repo.read_file(&path)?;
    let parsed: Value = parse_blob(INDEX_METADATA_CODEC, &bytes)?;
    parsed
        .as_object()
        .and_then(|m| m.values().next())
        .cloned()
        .ok_or_else(|| {
            Error::Snapshot(format!(
                "index metadata blob for '{index_name}' has no root object"
            ))
        })
}
