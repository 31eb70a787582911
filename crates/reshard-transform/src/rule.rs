//! Transformation rule traits and their shared result types.

use std::fmt;

use reshard_core::{GlobalMetadata, IndexMetadata};

/// Whether a rule applies to a given entity. `Unsupported` is a returned
/// verdict, never an error: the caller records it and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanApplyResult {
    Yes,
    No,
    Unsupported(String),
}

/// Classifies a recorded issue so downstream reporting can distinguish
/// replica-policy conflicts from generally unsupported shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    Unsupported,
    IncompatibleReplicaCount,
}

/// One issue recorded while transforming an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformIssue {
    /// Name of the rule that raised the issue.
    pub rule: &'static str,
    pub reason: String,
    pub code: IssueCode,
}

impl fmt::Display for TransformIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.reason)
    }
}

/// A rewrite applied to one index's metadata. Rules are pure functions of
/// the JSON tree; no I/O.
pub trait IndexTransformation: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_apply(&self, index: &IndexMetadata) -> CanApplyResult;

    /// Only called after `can_apply` returned `Yes`.
    fn apply(&self, index: &mut IndexMetadata);

    fn issue_code(&self) -> IssueCode {
        IssueCode::Unsupported
    }
}

/// A rewrite applied to cluster-global metadata (templates).
pub trait GlobalTransformation: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_apply(&self, metadata: &GlobalMetadata) -> CanApplyResult;

    fn apply(&self, metadata: &mut GlobalMetadata);

    fn issue_code(&self) -> IssueCode {
        IssueCode::Unsupported
    }
}
