//! Live-cluster metadata provider.
//!
//! Implements the same factory traits as the snapshot-backed readers over
//! the source cluster's REST API, so a migration can run without any
//! snapshot at all. List-shaped responses (`_index_template`,
//! `_component_template`) are rekeyed into name-keyed objects to match the
//! snapshot factories' output byte for byte.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use reshard_core::version::matchers;
use reshard_core::{Error, GlobalMetadata, IndexMetadata, Result, Version};
use reshard_cluster::OpenSearchClient;

use crate::factory::{shard_count_from_settings, GlobalMetadataFactory, IndexMetadataFactory};

/// Reads global and index metadata from a live source cluster.
pub struct RemoteMetadataSource {
    client: OpenSearchClient,
    source_version: Version,
}

impl RemoteMetadataSource {
    pub fn new(client: OpenSearchClient, source_version: Version) -> Self {
        Self {
            client,
            source_version,
        }
    }

    /// Composable templates only exist on 7.x-family sources.
    fn has_composable_templates(&self) -> bool {
        !matchers::is_es_6_8(&self.source_version)
    }
}

/// Rekey `{"<plural>": [{"name": n, "<singular>": body}]}` into
/// `{n: body}`.
fn dearray(response: &Value, plural: &str, singular: &str) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(items) = response.get(plural).and_then(Value::as_array) {
        for item in items {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(body) = item.get(singular) else {
                continue;
            };
            out.insert(name.to_string(), body.clone());
        }
    }
    Value::Object(out)
}

#[async_trait]
impl GlobalMetadataFactory for RemoteMetadataSource {
    async fn global_metadata(&self) -> Result<GlobalMetadata> {
        let templates = self.client.get_json("_template").await?;
        if !self.has_composable_templates() {
            debug!(version = %self.source_version, "Source predates composable templates");
            return Ok(GlobalMetadata {
                templates,
                index_templates: Value::Object(serde_json::Map::new()),
                component_templates: Value::Object(serde_json::Map::new()),
            });
        }
        let index_templates = self.client.get_json("_index_template").await?;
        let component_templates = self.client.get_json("_component_template").await?;
        Ok(GlobalMetadata {
            templates,
            index_templates: dearray(&index_templates, "index_templates", "index_template"),
            component_templates: dearray(
                &component_templates,
                "component_templates",
                "component_template",
            ),
        })
    }
}

#[async_trait]
impl IndexMetadataFactory for RemoteMetadataSource {
    async fn list_index_names(&self) -> Result<Vec<String>> {
        let all = self.client.get_json("_all").await?;
        Ok(all
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata> {
        let response = self.client.get_json(index_name).await?;
        let body = response.get(index_name).ok_or_else(|| {
            Error::Snapshot(format!("source cluster returned no body for '{index_name}'"))
        })?;
        let empty = Value::Object(serde_json::Map::new());
        let settings = body.get("settings").cloned().unwrap_or_else(|| empty.clone());
        Ok(IndexMetadata {
            name: index_name.to_string(),
            id: index_name.to_string(),
            number_of_shards: shard_count_from_settings(&settings)?,
            settings,
            mappings: body.get("mappings").cloned().unwrap_or_else(|| empty.clone()),
            aliases: body.get("aliases").cloned().unwrap_or(empty),
        })
    }
}
