//! Whole-run accounting and the process exit code derived from it.

use std::fmt;

use reshard_cluster::creator::Items;

use crate::reindexer::ReindexSummary;

/// A shard whose work item completed without migrating its documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardFailure {
    /// Work item id, `index__shard`.
    pub work_item: String,
    pub reason: String,
}

/// Document counts accumulated across every shard this worker processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTotals {
    pub shards: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub malformed: usize,
    pub failed_shards: Vec<ShardFailure>,
}

impl DocumentTotals {
    pub fn absorb(&mut self, summary: &ReindexSummary) {
        self.shards += 1;
        self.attempted += summary.attempted;
        self.succeeded += summary.succeeded;
        self.failed += summary.failed.len();
        self.malformed += summary.malformed;
    }

    pub fn record_failed_shard(&mut self, work_item: &str, reason: &str) {
        self.failed_shards.push(ShardFailure {
            work_item: work_item.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.malformed > 0 || !self.failed_shards.is_empty()
    }
}

/// Everything a run did, for reporting and for the exit code.
#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    /// Template creation results.
    pub metadata: Items,
    /// Index creation results.
    pub indices: Items,
    pub documents: DocumentTotals,
}

impl MigrationSummary {
    pub fn metadata_issues(&self) -> usize {
        self.metadata.issue_count() + self.indices.issue_count()
    }

    /// Exit code: bit 0 set for metadata or index issues, bit 1 set for
    /// document-level failures. Zero means a clean run.
    pub fn exit_code(&self) -> i32 {
        let mut code = 0;
        if self.metadata_issues() > 0 {
            code |= 1;
        }
        if self.documents.has_failures() {
            code |= 2;
        }
        code
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "templates/indices: {} issues across {} items",
            self.metadata_issues(),
            self.metadata.results().len() + self.indices.results().len()
        )?;
        for message in self
            .metadata
            .issue_messages()
            .iter()
            .chain(self.indices.issue_messages().iter())
        {
            writeln!(f, "  - {message}")?;
        }
        write!(
            f,
            "documents: {} succeeded / {} attempted across {} shards ({} rejected, {} undecodable)",
            self.documents.succeeded,
            self.documents.attempted,
            self.documents.shards,
            self.documents.failed,
            self.documents.malformed
        )?;
        for shard in &self.documents.failed_shards {
            write!(f, "\n  - shard {} not migrated: {}", shard.work_item, shard.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reshard_cluster::bulk::FailedDoc;
    use reshard_cluster::creator::{CreationFailure, CreationResult, ItemKind};

    fn clean_reindex(n: usize) -> ReindexSummary {
        ReindexSummary {
            attempted: n,
            succeeded: n,
            failed: Vec::new(),
            malformed: 0,
        }
    }

    #[test]
    fn test_clean_run_exits_zero() {
        let mut summary = MigrationSummary::default();
        summary.indices.push(CreationResult::created("logs", ItemKind::Index));
        summary.documents.absorb(&clean_reindex(100));
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_metadata_issue_sets_bit_zero() {
        let mut summary = MigrationSummary::default();
        summary.metadata.push(CreationResult::failed(
            "tmpl",
            ItemKind::IndexTemplate,
            CreationFailure::TransformFailure("unsupported".into()),
        ));
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_document_failures_set_bit_one() {
        let mut summary = MigrationSummary::default();
        let mut shard = clean_reindex(10);
        shard.failed.push(FailedDoc {
            id: "d1".into(),
            reason: "rejected".into(),
        });
        summary.documents.absorb(&shard);
        assert_eq!(summary.exit_code(), 2);
        assert_eq!(summary.documents.shards, 1);
    }

    #[test]
    fn test_both_failure_classes_combine() {
        let mut summary = MigrationSummary::default();
        summary.indices.push(CreationResult::failed(
            "idx",
            ItemKind::Index,
            CreationFailure::IncompatibleReplicaCount,
        ));
        let mut shard = clean_reindex(5);
        shard.malformed = 2;
        summary.documents.absorb(&shard);
        assert_eq!(summary.exit_code(), 3);
    }

    #[test]
    fn test_failed_shard_sets_bit_one() {
        let mut summary = MigrationSummary::default();
        summary.documents.absorb(&clean_reindex(4));
        summary
            .documents
            .record_failed_shard("logs__2", "Could not unpack shard: missing blob");
        assert!(summary.documents.has_failures());
        assert_eq!(summary.exit_code(), 2);
        assert!(summary.to_string().contains("logs__2 not migrated"));
    }

    #[test]
    fn test_already_exists_is_not_an_issue() {
        let mut summary = MigrationSummary::default();
        summary.indices.push(CreationResult::failed(
            "idx",
            ItemKind::Index,
            CreationFailure::AlreadyExists,
        ));
        assert_eq!(summary.exit_code(), 0);
    }
}
