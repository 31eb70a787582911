//! Shared metadata and document models.
//!
//! These are the common tree shapes every source (snapshot-backed or
//! remote) decodes into and every downstream stage (transformation,
//! creation, reindexing) consumes. The transformation engine is agnostic
//! of which transport produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The source cluster's templates and cluster-level settings.
///
/// One instance per snapshot (or per live-cluster read). Each field is an
/// object keyed by item name; sources that lack a template kind produce an
/// empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    /// Legacy (v1) templates, `_template` namespace.
    pub templates: Value,
    /// Composable index templates, `_index_template` namespace.
    pub index_templates: Value,
    /// Component templates, `_component_template` namespace.
    pub component_templates: Value,
}

impl GlobalMetadata {
    /// Names of items of one template kind, for filtering and reporting.
    pub fn names(kind: &Value) -> Vec<String> {
        kind.as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// One index's settings, mappings, aliases, and shard count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    /// Repository-internal index id (equals `name` for remote sources).
    pub id: String,
    pub number_of_shards: u32,
    pub settings: Value,
    pub mappings: Value,
    pub aliases: Value,
}

impl IndexMetadata {
    /// The request body used to create this index on a target cluster.
    pub fn creation_body(&self) -> Value {
        serde_json::json!({
            "settings": self.settings,
            "mappings": self.mappings,
            "aliases": self.aliases,
        })
    }
}

/// One file inside a shard's snapshot manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardFileInfo {
    /// Blob name inside the repository (e.g. `__3`, or `v__abc` for
    /// virtual files stored entirely in the manifest).
    pub name: String,
    /// Lucene file name the blob materializes to (e.g. `_0.fdt`).
    pub physical_name: String,
    pub length: u64,
    /// Slice size when the blob is split into `name.part{N}` pieces.
    pub part_size: Option<u64>,
    /// Inline content for `v__` virtual files.
    #[serde(default)]
    pub meta_hash: Option<Vec<u8>>,
}

impl ShardFileInfo {
    /// Number of part blobs this file is sliced into.
    pub fn number_of_parts(&self) -> u64 {
        match self.part_size {
            Some(part_size) if part_size > 0 && self.length > part_size => {
                self.length.div_ceil(part_size)
            }
            _ => 1,
        }
    }

    /// Blob name of part `n`, matching the repository's slicing scheme.
    pub fn part_name(&self, part: u64) -> String {
        if self.number_of_parts() == 1 {
            self.name.clone()
        } else {
            format!("{}.part{}", self.name, part)
        }
    }
}

/// Locates the Lucene segment files for one (index, shard) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub snapshot_name: String,
    pub index_name: String,
    pub index_id: String,
    pub shard_id: u32,
    pub total_size_bytes: u64,
    pub files: Vec<ShardFileInfo>,
}

/// One document read from a shard: id plus JSON source body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub source: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_metadata_names() {
        let templates = json!({"logs": {"order": 0}, "metrics": {"order": 1}});
        let mut names = GlobalMetadata::names(&templates);
        names.sort();
        assert_eq!(names, vec!["logs", "metrics"]);
        assert!(GlobalMetadata::names(&Value::Null).is_empty());
    }

    #[test]
    fn test_index_creation_body() {
        let index = IndexMetadata {
            name: "logs-1".into(),
            id: "uuid-1".into(),
            number_of_shards: 2,
            settings: json!({"index": {"number_of_replicas": "1"}}),
            mappings: json!({"properties": {"f": {"type": "text"}}}),
            aliases: json!({}),
        };
        let body = index.creation_body();
        assert_eq!(body["settings"]["index"]["number_of_replicas"], "1");
        assert_eq!(body["mappings"]["properties"]["f"]["type"], "text");
    }

    #[test]
    fn test_file_parts_unsliced() {
        let file = ShardFileInfo {
            name: "__0".into(),
            physical_name: "_0.cfs".into(),
            length: 100,
            part_size: None,
            meta_hash: None,
        };
        assert_eq!(file.number_of_parts(), 1);
        assert_eq!(file.part_name(0), "__0");
    }

    #[test]
    fn test_file_parts_sliced() {
        let file = ShardFileInfo {
            name: "__1".into(),
            physical_name: "_0.fdt".into(),
            length: 2_500,
            part_size: Some(1_000),
            meta_hash: None,
        };
        assert_eq!(file.number_of_parts(), 3);
        assert_eq!(file.part_name(0), "__1.part0");
        assert_eq!(file.part_name(2), "__1.part2");
    }

    #[test]
    fn test_file_parts_exact_fit() {
        let file = ShardFileInfo {
            name: "__2".into(),
            physical_name: "_0.fdx".into(),
            length: 1_000,
            part_size: Some(1_000),
            meta_hash: None,
        };
        assert_eq!(file.number_of_parts(), 1);
    }
}
