//! Idempotent creation of templates and indices on the target cluster.
//!
//! Every candidate item produces a [`CreationResult`]; expected conflicts
//! (`AlreadyExists`) and deliberate skips (`SkippedByFilter`) are data, not
//! errors, so re-running against a partially migrated target is safe.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use reshard_core::{defaults, Error, GlobalMetadata, IndexMetadata};

use crate::client::{CreateOutcome, MetadataTarget};

/// The category an item belongs to, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    LegacyTemplate,
    ComponentTemplate,
    IndexTemplate,
    Index,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemKind::LegacyTemplate => "legacy template",
            ItemKind::ComponentTemplate => "component template",
            ItemKind::IndexTemplate => "index template",
            ItemKind::Index => "index",
        };
        f.write_str(s)
    }
}

/// Why an item was not created.
#[derive(Debug, Clone, PartialEq)]
pub enum CreationFailure {
    /// Target already has the item; expected on re-runs.
    AlreadyExists,
    /// Transformation reported the item unsupported.
    TransformFailure(String),
    /// Target rejected the creation request.
    TargetFailure { status: u16, message: String },
    /// Requested replica count cannot satisfy the awareness policy.
    IncompatibleReplicaCount,
    /// Excluded by the caller's allow-lists.
    SkippedByFilter,
}

impl CreationFailure {
    /// Whether this failure counts toward the run's issue total.
    /// `AlreadyExists` and filter skips are normal outcomes.
    pub fn is_issue(&self) -> bool {
        matches!(
            self,
            CreationFailure::TransformFailure(_)
                | CreationFailure::TargetFailure { .. }
                | CreationFailure::IncompatibleReplicaCount
        )
    }
}

impl fmt::Display for CreationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreationFailure::AlreadyExists => f.write_str("already exists"),
            CreationFailure::TransformFailure(reason) => {
                write!(f, "transform failure: {reason}")
            }
            CreationFailure::TargetFailure { status, message } => {
                write!(f, "target failure (status {status}): {message}")
            }
            CreationFailure::IncompatibleReplicaCount => {
                f.write_str("incompatible replica count for awareness policy")
            }
            CreationFailure::SkippedByFilter => f.write_str("skipped by filter"),
        }
    }
}

/// Outcome of creating one named item on the target.
#[derive(Debug, Clone, PartialEq)]
pub struct CreationResult {
    pub name: String,
    pub kind: ItemKind,
    pub failure: Option<CreationFailure>,
}

impl CreationResult {
    pub fn created(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            kind,
            failure: None,
        }
    }

    pub fn failed(name: impl Into<String>, kind: ItemKind, failure: CreationFailure) -> Self {
        Self {
            name: name.into(),
            kind,
            failure: Some(failure),
        }
    }

    pub fn was_created(&self) -> bool {
        self.failure.is_none()
    }

    pub fn is_issue(&self) -> bool {
        self.failure.as_ref().is_some_and(CreationFailure::is_issue)
    }
}

/// Aggregated creation results across all item kinds.
#[derive(Debug, Clone, Default)]
pub struct Items {
    results: Vec<CreationResult>,
}

impl Items {
    pub fn push(&mut self, result: CreationResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = CreationResult>) {
        self.results.extend(results);
    }

    pub fn results(&self) -> &[CreationResult] {
        &self.results
    }

    pub fn created_names(&self, kind: ItemKind) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.kind == kind && r.was_created())
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn issue_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_issue()).count()
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_issue())
            .filter_map(|r| {
                r.failure
                    .as_ref()
                    .map(|f| format!("{} '{}': {}", r.kind, r.name, f))
            })
            .collect()
    }
}

/// Caller-supplied allow-lists controlling what is migrated.
///
/// Template kinds are opt-in: an item absent from its list is skipped.
/// Indices are opt-out: an empty list means "all non-system indices".
/// Legacy and composable index templates share the index-template list.
#[derive(Debug, Clone, Default)]
pub struct AllowLists {
    pub indices: Vec<String>,
    pub index_templates: Vec<String>,
    pub component_templates: Vec<String>,
}

impl AllowLists {
    pub fn allows_index(&self, name: &str) -> bool {
        if name.starts_with(defaults::SYSTEM_INDEX_PREFIX) {
            return false;
        }
        self.indices.is_empty() || self.indices.iter().any(|n| n == name)
    }

    pub fn allows_index_template(&self, name: &str) -> bool {
        self.index_templates.iter().any(|n| n == name)
    }

    pub fn allows_component_template(&self, name: &str) -> bool {
        self.component_templates.iter().any(|n| n == name)
    }
}

fn failure_from_error(error: Error) -> CreationFailure {
    match error {
        Error::Target { status, body } => CreationFailure::TargetFailure {
            status,
            message: body,
        },
        other => CreationFailure::TargetFailure {
            status: 0,
            message: other.to_string(),
        },
    }
}

fn result_from_outcome(
    name: &str,
    kind: ItemKind,
    outcome: reshard_core::Result<CreateOutcome>,
) -> CreationResult {
    match outcome {
        Ok(CreateOutcome::Created) => CreationResult::created(name, kind),
        Ok(CreateOutcome::AlreadyExists) => {
            CreationResult::failed(name, kind, CreationFailure::AlreadyExists)
        }
        Err(e) => CreationResult::failed(name, kind, failure_from_error(e)),
    }
}

/// Creates templates from transformed global metadata, one
/// [`CreationResult`] per candidate item.
pub struct GlobalMetadataCreator {
    target: Arc<dyn MetadataTarget>,
    allow: AllowLists,
}

impl GlobalMetadataCreator {
    pub fn new(target: Arc<dyn MetadataTarget>, allow: AllowLists) -> Self {
        Self { target, allow }
    }

    /// Create legacy templates, component templates, then index templates.
    /// Ordering matters: component templates must exist before composable
    /// index templates referencing them.
    pub async fn create(&self, metadata: &GlobalMetadata) -> Vec<CreationResult> {
        let mut results = Vec::new();

        for (name, body) in entries(&metadata.templates) {
            if !self.allow.allows_index_template(&name) {
                debug!(name, "Legacy template not in allow-list, skipping");
                results.push(CreationResult::failed(
                    &name,
                    ItemKind::LegacyTemplate,
                    CreationFailure::SkippedByFilter,
                ));
                continue;
            }
            let outcome = self.target.create_legacy_template(&name, &body).await;
            results.push(result_from_outcome(&name, ItemKind::LegacyTemplate, outcome));
        }

        for (name, body) in entries(&metadata.component_templates) {
            if !self.allow.allows_component_template(&name) {
                debug!(name, "Component template not in allow-list, skipping");
                results.push(CreationResult::failed(
                    &name,
                    ItemKind::ComponentTemplate,
                    CreationFailure::SkippedByFilter,
                ));
                continue;
            }
            let outcome = self.target.create_component_template(&name, &body).await;
            results.push(result_from_outcome(
                &name,
                ItemKind::ComponentTemplate,
                outcome,
            ));
        }

        for (name, body) in entries(&metadata.index_templates) {
            if !self.allow.allows_index_template(&name) {
                debug!(name, "Index template not in allow-list, skipping");
                results.push(CreationResult::failed(
                    &name,
                    ItemKind::IndexTemplate,
                    CreationFailure::SkippedByFilter,
                ));
                continue;
            }
            let outcome = self.target.create_index_template(&name, &body).await;
            results.push(result_from_outcome(&name, ItemKind::IndexTemplate, outcome));
        }

        info!(
            total = results.len(),
            issues = results.iter().filter(|r| r.is_issue()).count(),
            "Global metadata creation complete"
        );
        results
    }
}

/// Creates one index on the target from transformed index metadata.
pub struct IndexCreator {
    target: Arc<dyn MetadataTarget>,
    allow: AllowLists,
}

impl IndexCreator {
    pub fn new(target: Arc<dyn MetadataTarget>, allow: AllowLists) -> Self {
        Self { target, allow }
    }

    pub async fn create(&self, index: &IndexMetadata) -> CreationResult {
        if !self.allow.allows_index(&index.name) {
            debug!(index = index.name, "Index filtered out, skipping");
            return CreationResult::failed(
                &index.name,
                ItemKind::Index,
                CreationFailure::SkippedByFilter,
            );
        }
        let body = index.creation_body();
        let outcome = self.target.create_index(&index.name, &body).await;
        result_from_outcome(&index.name, ItemKind::Index, outcome)
    }
}

fn entries(kind: &Value) -> Vec<(String, Value)> {
    kind.as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
