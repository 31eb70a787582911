//! # reshard-transform
//!
//! Pure metadata rewrites that make source-cluster index and template
//! definitions acceptable to the target cluster. Rules are selected per
//! source/target version pair and run in order; a rule that cannot apply
//! records an issue instead of aborting, so one bad index never stops a
//! migration.

pub mod mapping_type;
pub mod replica;
pub mod rule;
pub mod settings;
pub mod transformer;

pub use mapping_type::{IndexMappingTypeRemoval, TemplateMappingTypeRemoval};
pub use replica::{ReplicaAwarenessRule, ReplicaPolicy};
pub use rule::{
    CanApplyResult, GlobalTransformation, IndexTransformation, IssueCode, TransformIssue,
};
pub use settings::IndexSettingsCleanup;
pub use transformer::Transformer;
