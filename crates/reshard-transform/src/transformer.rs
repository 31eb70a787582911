//! Version-pair rule selection and best-effort rule evaluation.

use tracing::{info, warn};

use reshard_core::version::matchers;
use reshard_core::{Error, GlobalMetadata, IndexMetadata, Result, Version};

use crate::mapping_type::{IndexMappingTypeRemoval, TemplateMappingTypeRemoval};
use crate::replica::{ReplicaAwarenessRule, ReplicaPolicy};
use crate::rule::{CanApplyResult, GlobalTransformation, IndexTransformation, TransformIssue};
use crate::settings::IndexSettingsCleanup;

/// An ordered rule list for one source/target version pair.
///
/// Rules run most-specific first. A rule answering `No` is skipped; one
/// answering `Unsupported` records an issue and evaluation continues, so
/// every problem with an entity surfaces in a single pass.
pub struct Transformer {
    index_rules: Vec<Box<dyn IndexTransformation>>,
    global_rules: Vec<Box<dyn GlobalTransformation>>,
}

impl Transformer {
    /// Select the rule list for migrating `source` metadata onto `target`.
    /// An unrecognized pair is a configuration error, raised before any
    /// work begins.
    pub fn for_versions(
        source: Version,
        target: Version,
        awareness_dimensionality: u32,
    ) -> Result<Self> {
        Self::with_replica_policy(source, target, awareness_dimensionality, ReplicaPolicy::Lift)
    }

    pub fn with_replica_policy(
        source: Version,
        target: Version,
        awareness_dimensionality: u32,
        policy: ReplicaPolicy,
    ) -> Result<Self> {
        if !matchers::is_os_2_x(&target) {
            return Err(Error::Config(format!(
                "no transformation path onto target {target}"
            )));
        }

        let mut index_rules: Vec<Box<dyn IndexTransformation>> = Vec::new();
        let mut global_rules: Vec<Box<dyn GlobalTransformation>> = Vec::new();

        if matchers::is_es_6_8(&source) || matchers::is_es_7_x(&source) {
            // ES 7.x snapshots can still carry a stray type wrapper from
            // upgraded 6.x indices; the rule answers No when untyped.
            index_rules.push(Box::new(IndexMappingTypeRemoval));
            global_rules.push(Box::new(TemplateMappingTypeRemoval));
        } else if !matchers::is_os_1_x(&source) {
            return Err(Error::Config(format!(
                "no transformation path from source {source}"
            )));
        }

        index_rules.push(Box::new(IndexSettingsCleanup));
        index_rules.push(Box::new(ReplicaAwarenessRule::new(
            awareness_dimensionality,
            policy,
        )));

        info!(
            %source,
            %target,
            index_rules = index_rules.len(),
            global_rules = global_rules.len(),
            "Selected transformation rules"
        );
        Ok(Self {
            index_rules,
            global_rules,
        })
    }

    pub fn transform_index_metadata(
        &self,
        index: &IndexMetadata,
    ) -> (IndexMetadata, Vec<TransformIssue>) {
        let mut transformed = index.clone();
        let mut issues = Vec::new();
        for rule in &self.index_rules {
            match rule.can_apply(&transformed) {
                CanApplyResult::Yes => rule.apply(&mut transformed),
                CanApplyResult::No => {}
                CanApplyResult::Unsupported(reason) => {
                    warn!(index = index.name, rule = rule.name(), reason, "Rule cannot apply");
                    issues.push(TransformIssue {
                        rule: rule.name(),
                        reason,
                        code: rule.issue_code(),
                    });
                }
            }
        }
        (transformed, issues)
    }

    pub fn transform_global_metadata(
        &self,
        metadata: &GlobalMetadata,
    ) -> (GlobalMetadata, Vec<TransformIssue>) {
        let mut transformed = metadata.clone();
        let mut issues = Vec::new();
        for rule in &self.global_rules {
            match rule.can_apply(&transformed) {
                CanApplyResult::Yes => rule.apply(&mut transformed),
                CanApplyResult::No => {}
                CanApplyResult::Unsupported(reason) => {
                    warn!(rule = rule.name(), reason, "Rule cannot apply");
                    issues.push(TransformIssue {
                        rule: rule.name(),
                        reason,
                        code: rule.issue_code(),
                    });
                }
            }
        }
        (transformed, issues)
    }
}
