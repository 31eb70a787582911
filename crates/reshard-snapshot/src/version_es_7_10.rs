//! Metadata factories for ES 7.x and OS 1.x snapshot repositories.
//!
//! Differences from the 6.8 family: composable index templates and
//! component templates exist in global metadata, index mappings are
//! untyped (a residual `_doc` wrapper is unwrapped here), and per-index
//! metadata blobs are resolved through the repo data's metadata
//! identifier lookup.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use reshard_core::{GlobalMetadata, IndexMetadata, Result};

use crate::factory::{
    shard_count_from_settings, GlobalMetadataFactory, IndexMetadataFactory, SnapshotContext,
    SnapshotShardMetadataFactory, SourceFactories,
};
use crate::version_es_6_8::{empty_object, read_index_body, read_metadata_root};

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
            // Both composable kinds nest one level under their own name.
            index_templates: doubly_nested(&root, "index_template"),
            component_templates: doubly_nested(&root, "component_template"),
        })
    }
}

fn doubly_nested(root: &Value, key: &str) -> Value {
    root.get(key)
        .and_then(|outer| outer.get(key))
        .cloned()
        .unwrap_or_else(empty_object)
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
        let mappings = untype(body.get("mappings").cloned().unwrap_or_else(empty_object));
        Ok(IndexMetadata {
            name: index_name.to_string(),
            id: self
                .context
                .repo_data
                .resolve_index_id(index_name)?
                .to_string(),
            number_of_shards: shard_count_from_settings(&settings)?,
            settings,
            mappings,
            aliases: body.get("aliases").cloned().unwrap_or_else(empty_object),
        })
    }
}

/// Indices upgraded from 6.x carry their mapping body under a residual
/// `_doc` wrapper (sometimes in one-element array form); 7.x-native
/// indices are already untyped.
fn untype(mappings: Value) -> Value {
    let inner = match &mappings {
        Value::Array(elems) if elems.len() == 1 => &elems[0],
        other => other,
    };
    if let Some(body) = inner.get("_doc") {
        if body.is_object() {
            return body.clone();
        }
    }
    inner.clone()
}
