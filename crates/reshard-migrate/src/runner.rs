//! Phase runners tying the crates together.
//!
//! A migration runs in three phases: global metadata (templates), index
//! metadata, then documents. The first two run once; the documents phase
//! is driven through the work coordinator so any number of workers can
//! participate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use reshard_cluster::bulk::BulkClient;
use reshard_cluster::client::MetadataTarget;
use reshard_cluster::creator::{
    AllowLists, CreationFailure, CreationResult, GlobalMetadataCreator, IndexCreator, ItemKind,
    Items,
};
use reshard_coordination::{
    ensure_phase_completion, WorkCoordinator, WorkItemId, WorkItemVisitor,
};
use reshard_core::logging::{INDEX, SHARD, WORK_ITEM_ID};
use reshard_core::{Error, IndexMetadata, Result, Version};
use reshard_snapshot::{GlobalMetadataFactory, IndexMetadataFactory, ShardMetadataFactory};
use reshard_transform::{IssueCode, Transformer};

use crate::config::MigrationConfig;
use crate::lucene::reader_for_version;
use crate::reindexer::{DocumentReindexer, ReindexSummary};
use crate::summary::DocumentTotals;
use crate::unpacker::ShardUnpacker;

/// Phase one: source templates onto the target.
pub struct MetadataRunner {
    source: Arc<dyn GlobalMetadataFactory>,
    transformer: Transformer,
    creator: GlobalMetadataCreator,
}

impl MetadataRunner {
    pub fn new(
        source: Arc<dyn GlobalMetadataFactory>,
        transformer: Transformer,
        target: Arc<dyn MetadataTarget>,
        allow: AllowLists,
    ) -> Self {
        Self {
            source,
            transformer,
            creator: GlobalMetadataCreator::new(target, allow),
        }
    }

    pub async fn run(&self) -> Result<Items> {
        let metadata = self.source.global_metadata().await?;
        let (transformed, issues) = self.transformer.transform_global_metadata(&metadata);

        let mut items = Items::default();
        for issue in issues {
            items.push(CreationResult::failed(
                issue.rule,
                ItemKind::LegacyTemplate,
                CreationFailure::TransformFailure(issue.to_string()),
            ));
        }
        items.extend(self.creator.create(&transformed).await);
        info!(
            total = items.results().len(),
            issues = items.issue_count(),
            "Global metadata phase finished"
        );
        Ok(items)
    }
}

/// Phase two: per-index metadata onto the target. Returns the creation
/// results plus the indices whose documents should migrate; an index that
/// already exists on the target still gets its documents.
pub struct IndexRunner {
    source: Arc<dyn IndexMetadataFactory>,
    transformer: Transformer,
    creator: IndexCreator,
    allow: AllowLists,
}

impl IndexRunner {
    pub fn new(
        source: Arc<dyn IndexMetadataFactory>,
        transformer: Transformer,
        target: Arc<dyn MetadataTarget>,
        allow: AllowLists,
    ) -> Self {
        Self {
            source,
            transformer,
            creator: IndexCreator::new(target, allow.clone()),
            allow,
        }
    }

    pub async fn run(&self) -> Result<(Items, Vec<IndexMetadata>)> {
        let mut items = Items::default();
        let mut migratable = Vec::new();

        for name in self.source.list_index_names().await? {
            // Filter before fetching; system indices never leave the source.
            if !self.allow.allows_index(&name) {
                items.push(CreationResult::failed(
                    &name,
                    ItemKind::Index,
                    CreationFailure::SkippedByFilter,
                ));
                continue;
            }
            let metadata = self.source.index_metadata(&name).await?;
            let (transformed, issues) = self.transformer.transform_index_metadata(&metadata);
            if !issues.is_empty() {
                let failure = if issues
                    .iter()
                    .any(|i| i.code == IssueCode::IncompatibleReplicaCount)
                {
                    CreationFailure::IncompatibleReplicaCount
                } else {
                    let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
                    CreationFailure::TransformFailure(reasons.join("; "))
                };
                warn!({ INDEX } = name, "Index cannot be transformed");
                items.push(CreationResult::failed(&name, ItemKind::Index, failure));
                continue;
            }

            let result = self.creator.create(&transformed).await;
            let carry_documents = result.was_created()
                || result.failure == Some(CreationFailure::AlreadyExists);
            items.push(result);
            if carry_documents {
                migratable.push(transformed);
            }
        }

        info!(
            total = items.results().len(),
            issues = items.issue_count(),
            migratable = migratable.len(),
            "Index metadata phase finished"
        );
        Ok((items, migratable))
    }
}

/// Phase three: shard documents onto the target, one coordinated work
/// item per (index, shard).
pub struct DocumentsRunner {
    coordinator: Arc<dyn WorkCoordinator>,
    shards: Arc<dyn ShardMetadataFactory>,
    unpacker: Arc<dyn ShardUnpacker>,
    reindexer: DocumentReindexer,
    source_version: Version,
    lease: Duration,
    poll_interval: Duration,
    totals: Mutex<DocumentTotals>,
}

impl DocumentsRunner {
    pub fn new(
        coordinator: Arc<dyn WorkCoordinator>,
        shards: Arc<dyn ShardMetadataFactory>,
        unpacker: Arc<dyn ShardUnpacker>,
        bulk: Arc<dyn BulkClient>,
        source_version: Version,
        config: &MigrationConfig,
    ) -> Self {
        let reindexer = DocumentReindexer::new(bulk).with_limits(
            config.max_docs_per_bulk_request,
            config.max_bytes_per_bulk_request,
            config.max_concurrent_bulk_requests,
        );
        Self {
            coordinator,
            shards,
            unpacker,
            reindexer,
            source_version,
            lease: Duration::from_secs(config.lease_duration_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            totals: Mutex::new(DocumentTotals::default()),
        }
    }

    /// Register one work item per shard. Idempotent, so every worker runs
    /// it; items another worker already completed stay completed.
    pub async fn setup_work_items(&self, indices: &[IndexMetadata]) -> Result<()> {
        self.coordinator.setup().await?;
        let mut registered = 0u32;
        for index in indices {
            for shard in 0..index.number_of_shards {
                self.coordinator
                    .create_unassigned_work_item(&WorkItemId::new(&index.name, shard))
                    .await?;
                registered += 1;
            }
        }
        info!(registered, "Work items registered");
        Ok(())
    }

    /// One acquire-migrate-complete step. Returns whether work remains
    /// anywhere in the phase.
    pub async fn migrate_next_shard(&self) -> Result<bool> {
        let visitor = ShardVisitor { runner: self };
        ensure_phase_completion(self.coordinator.as_ref(), self.lease, &visitor).await
    }

    /// Pull work items until the phase is complete everywhere. Document
    /// rejections and per-shard failures are recorded in the totals rather
    /// than failing the item; the bulk client has already spent its
    /// per-document retry budget, and an oversized or unreadable shard
    /// stays that way across retries.
    pub async fn migrate_documents(&self) -> Result<DocumentTotals> {
        while self.migrate_next_shard().await? {}
        Ok(self.totals.lock().expect("totals lock").clone())
    }
}

/// Failure classes confined to one shard. Anything else (configuration,
/// target connectivity, coordination store) still stops the worker.
fn is_shard_scoped(error: &Error) -> bool {
    matches!(
        error,
        Error::ShardTooLarge { .. } | Error::CouldNotUnpackShard(_) | Error::CorruptSegment(_)
    )
}

struct ShardVisitor<'a> {
    runner: &'a DocumentsRunner,
}

impl ShardVisitor<'_> {
    async fn migrate_shard(&self, item: &WorkItemId) -> Result<ReindexSummary> {
        let shard = self
            .runner
            .shards
            .shard_metadata(&item.index_name, item.shard)
            .await?;
        let unpacked = self.runner.unpacker.unpack(&shard)?;
        let reader = reader_for_version(&self.runner.source_version, unpacked.path())?;
        let docs = reader.read_documents()?;
        self.runner.reindexer.reindex(&item.index_name, docs).await
    }
}

#[async_trait]
impl WorkItemVisitor for ShardVisitor<'_> {
    async fn on_acquired_work(&self, item: &WorkItemId) -> Result<()> {
        info!(
            { WORK_ITEM_ID } = %item,
            { INDEX } = item.index_name,
            { SHARD } = item.shard,
            "Migrating shard"
        );
        let summary = match self.migrate_shard(item).await {
            Ok(summary) => summary,
            // Permanent for this shard; the item completes instead of
            // cycling through lease expirations.
            Err(e) if is_shard_scoped(&e) => {
                warn!({ WORK_ITEM_ID } = %item, error = %e, "Shard not migrated");
                self.runner
                    .totals
                    .lock()
                    .expect("totals lock")
                    .record_failed_shard(&item.to_string(), &e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !summary.is_clean() {
            warn!(
                { WORK_ITEM_ID } = %item,
                failed = summary.failed.len(),
                malformed = summary.malformed,
                "Shard migrated with document failures"
            );
        }
        self.runner
            .totals
            .lock()
            .expect("totals lock")
            .absorb(&summary);
        Ok(())
    }

    async fn on_no_available_work(&self) -> Result<()> {
        tokio::time::sleep(self.runner.poll_interval).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use serde_json::{json, Value};

    use reshard_cluster::bulk::{BulkDocSection, BulkReport};
    use reshard_cluster::client::CreateOutcome;
    use reshard_coordination::{InMemoryWorkCoordinator, ManualClock};
    use reshard_core::{Error, Flavor, GlobalMetadata, ShardMetadata};

    use crate::lucene::testfixtures::{build_segment, DocSpec};
    use crate::lucene::Generation;
    use crate::unpacker::UnpackedShard;

    fn os_1_3() -> Version {
        Version::new(Flavor::OpenSearch, 1, 3, 16)
    }

    fn os_2_11() -> Version {
        Version::new(Flavor::OpenSearch, 2, 11, 0)
    }

    fn transformer() -> Transformer {
        Transformer::for_versions(os_1_3(), os_2_11(), 1).unwrap()
    }

    fn index(name: &str, shards: u32) -> IndexMetadata {
        IndexMetadata {
            name: name.into(),
            id: format!("{name}-id"),
            number_of_shards: shards,
            settings: json!({"index": {"number_of_shards": shards.to_string()}}),
            mappings: json!({"properties": {"n": {"type": "long"}}}),
            aliases: json!({}),
        }
    }

    #[derive(Default)]
    struct FakeTarget {
        existing: Vec<String>,
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataTarget for FakeTarget {
        async fn create_legacy_template(&self, name: &str, _: &Value) -> Result<CreateOutcome> {
            self.respond(name)
        }
        async fn create_component_template(&self, name: &str, _: &Value) -> Result<CreateOutcome> {
            self.respond(name)
        }
        async fn create_index_template(&self, name: &str, _: &Value) -> Result<CreateOutcome> {
            self.respond(name)
        }
        async fn create_index(&self, name: &str, _: &Value) -> Result<CreateOutcome> {
            self.respond(name)
        }
    }

    impl FakeTarget {
        fn respond(&self, name: &str) -> Result<CreateOutcome> {
            if self.existing.iter().any(|n| n == name) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            self.created.lock().unwrap().push(name.to_string());
            Ok(CreateOutcome::Created)
        }
    }

    struct FakeGlobalSource(GlobalMetadata);

    #[async_trait]
    impl GlobalMetadataFactory for FakeGlobalSource {
        async fn global_metadata(&self) -> Result<GlobalMetadata> {
            Ok(self.0.clone())
        }
    }

    struct FakeIndexSource(Vec<IndexMetadata>);

    #[async_trait]
    impl IndexMetadataFactory for FakeIndexSource {
        async fn list_index_names(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|i| i.name.clone()).collect())
        }
        async fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata> {
            self.0
                .iter()
                .find(|i| i.name == index_name)
                .cloned()
                .ok_or_else(|| Error::Snapshot(format!("unknown index {index_name}")))
        }
    }

    struct FakeShardSource;

    #[async_trait]
    impl ShardMetadataFactory for FakeShardSource {
        async fn shard_metadata(&self, index_name: &str, shard: u32) -> Result<ShardMetadata> {
            Ok(ShardMetadata {
                snapshot_name: "snap".into(),
                index_name: index_name.into(),
                index_id: format!("{index_name}-id"),
                shard_id: shard,
                total_size_bytes: 0,
                files: Vec::new(),
            })
        }
    }

    /// Hands out a caller-owned fixture directory instead of unpacking.
    struct FixtureUnpacker {
        path: PathBuf,
    }

    impl ShardUnpacker for FixtureUnpacker {
        fn unpack(&self, _shard: &ShardMetadata) -> Result<UnpackedShard> {
            Ok(UnpackedShard::external(self.path.clone()))
        }
    }

    /// Refuses one index's shards at the size gate, unpacks the rest.
    struct SizeGatedUnpacker {
        path: PathBuf,
        oversized_index: String,
    }

    impl ShardUnpacker for SizeGatedUnpacker {
        fn unpack(&self, shard: &ShardMetadata) -> Result<UnpackedShard> {
            if shard.index_name == self.oversized_index {
                return Err(Error::ShardTooLarge {
                    shard_size_bytes: 99,
                    max_size_bytes: 1,
                });
            }
            Ok(UnpackedShard::external(self.path.clone()))
        }
    }

    #[derive(Default)]
    struct CollectingBulk {
        docs: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BulkClient for CollectingBulk {
        async fn send_bulk(&self, index: &str, docs: Vec<BulkDocSection>) -> Result<BulkReport> {
            let mut sink = self.docs.lock().unwrap();
            let attempted = docs.len();
            for doc in docs {
                sink.push((index.to_string(), doc.id));
            }
            Ok(BulkReport {
                attempted,
                succeeded: attempted,
                failed: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_metadata_runner_creates_allowed_templates() {
        let target = Arc::new(FakeTarget::default());
        let source = Arc::new(FakeGlobalSource(GlobalMetadata {
            templates: json!({"legacy-a": {"order": 0, "index_patterns": ["a-*"]}}),
            index_templates: json!({}),
            component_templates: json!({}),
        }));
        let allow = AllowLists {
            index_templates: vec!["legacy-a".into()],
            ..Default::default()
        };
        let runner = MetadataRunner::new(source, transformer(), target.clone(), allow);

        let items = runner.run().await.unwrap();
        assert_eq!(items.issue_count(), 0);
        assert_eq!(
            items.created_names(ItemKind::LegacyTemplate),
            vec!["legacy-a"]
        );
        assert_eq!(*target.created.lock().unwrap(), vec!["legacy-a"]);
    }

    #[tokio::test]
    async fn test_index_runner_existing_index_still_migrates_documents() {
        let target = Arc::new(FakeTarget {
            existing: vec!["logs".into()],
            ..Default::default()
        });
        let source = Arc::new(FakeIndexSource(vec![index("logs", 2), index("events", 1)]));
        let runner = IndexRunner::new(source, transformer(), target, AllowLists::default());

        let (items, migratable) = runner.run().await.unwrap();
        assert_eq!(items.issue_count(), 0);
        assert_eq!(items.created_names(ItemKind::Index), vec!["events"]);
        let names: Vec<&str> = migratable.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["logs", "events"]);
    }

    #[tokio::test]
    async fn test_index_runner_skips_system_indices_before_fetch() {
        let target = Arc::new(FakeTarget::default());
        // The fake source would error on fetch; listing alone must not.
        let source = Arc::new(FakeIndexSource(vec![index(".kibana", 1)]));
        let runner = IndexRunner::new(source, transformer(), target, AllowLists::default());

        let (items, migratable) = runner.run().await.unwrap();
        assert!(migratable.is_empty());
        assert_eq!(items.results().len(), 1);
        assert_eq!(
            items.results()[0].failure,
            Some(CreationFailure::SkippedByFilter)
        );
    }

    #[tokio::test]
    async fn test_index_runner_replica_conflict_blocks_index() {
        let target = Arc::new(FakeTarget::default());
        let mut bad = index("lopsided", 1);
        bad.settings = json!({"index": {"number_of_replicas": "2"}});
        let source = Arc::new(FakeIndexSource(vec![bad]));
        let strict = Transformer::with_replica_policy(
            os_1_3(),
            os_2_11(),
            2,
            reshard_transform::ReplicaPolicy::RequireExact,
        )
        .unwrap();
        let runner = IndexRunner::new(source, strict, target.clone(), AllowLists::default());

        let (items, migratable) = runner.run().await.unwrap();
        assert!(migratable.is_empty());
        assert_eq!(
            items.results()[0].failure,
            Some(CreationFailure::IncompatibleReplicaCount)
        );
        assert!(target.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_documents_phase_end_to_end() -> anyhow::Result<()> {
        let fixture = tempfile::tempdir()?;
        build_segment(
            fixture.path(),
            "_0",
            Generation::Gen9,
            &[
                DocSpec::new("d1", json!({"n": 1})),
                DocSpec::new("d2", json!({"n": 2})),
                DocSpec::new("d3", json!({"n": 3})),
            ],
            &[],
        );

        let clock = Arc::new(ManualClock::new(1_000));
        let coordinator = Arc::new(InMemoryWorkCoordinator::new("worker-1", clock));
        let bulk = Arc::new(CollectingBulk::default());
        let config = MigrationConfig::default().with_worker_id("worker-1");
        let runner = DocumentsRunner::new(
            coordinator.clone(),
            Arc::new(FakeShardSource),
            Arc::new(FixtureUnpacker {
                path: fixture.path().to_path_buf(),
            }),
            bulk.clone() as Arc<dyn BulkClient>,
            os_1_3(),
            &config,
        );

        runner.setup_work_items(&[index("logs", 1)]).await?;
        let totals = runner.migrate_documents().await?;

        assert_eq!(totals.shards, 1);
        assert_eq!(totals.attempted, 3);
        assert_eq!(totals.succeeded, 3);
        assert!(!totals.has_failures());
        assert_eq!(coordinator.num_incomplete().await?, 0);

        let docs = bulk.docs.lock().unwrap();
        let ids: Vec<&str> = docs.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
        assert!(docs.iter().all(|(index, _)| index == "logs"));
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_shard_completes_item_and_worker_continues() -> anyhow::Result<()> {
        let fixture = tempfile::tempdir()?;
        build_segment(
            fixture.path(),
            "_0",
            Generation::Gen9,
            &[DocSpec::new("d1", json!({"n": 1}))],
            &[],
        );

        let clock = Arc::new(ManualClock::new(1_000));
        let coordinator = Arc::new(InMemoryWorkCoordinator::new("worker-1", clock));
        let bulk = Arc::new(CollectingBulk::default());
        let config = MigrationConfig::default().with_worker_id("worker-1");
        let runner = DocumentsRunner::new(
            coordinator.clone(),
            Arc::new(FakeShardSource),
            Arc::new(SizeGatedUnpacker {
                path: fixture.path().to_path_buf(),
                oversized_index: "big".into(),
            }),
            bulk.clone() as Arc<dyn BulkClient>,
            os_1_3(),
            &config,
        );

        runner
            .setup_work_items(&[index("big", 1), index("logs", 1)])
            .await?;
        let totals = runner.migrate_documents().await?;

        // The oversized shard's item is done, not left leased for retry.
        assert_eq!(coordinator.num_incomplete().await?, 0);
        assert_eq!(totals.shards, 1);
        assert_eq!(totals.succeeded, 1);
        assert_eq!(totals.failed_shards.len(), 1);
        assert_eq!(totals.failed_shards[0].work_item, "big__0");
        assert!(totals.failed_shards[0].reason.contains("99 bytes"));
        assert!(totals.has_failures());

        let docs = bulk.docs.lock().unwrap();
        let ids: Vec<&str> = docs.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(ids, vec!["d1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_shard_recorded_without_stopping_worker() -> anyhow::Result<()> {
        // The unpacked path is not listable, so opening the shard fails
        // before any document is produced.
        let clock = Arc::new(ManualClock::new(1_000));
        let coordinator = Arc::new(InMemoryWorkCoordinator::new("worker-1", clock));
        let bulk = Arc::new(CollectingBulk::default());
        let config = MigrationConfig::default();
        let runner = DocumentsRunner::new(
            coordinator.clone(),
            Arc::new(FakeShardSource),
            Arc::new(FixtureUnpacker {
                path: PathBuf::from("/nonexistent/shard"),
            }),
            bulk.clone() as Arc<dyn BulkClient>,
            os_1_3(),
            &config,
        );

        runner.setup_work_items(&[index("logs", 1)]).await?;
        let totals = runner.migrate_documents().await?;

        assert_eq!(coordinator.num_incomplete().await?, 0);
        assert_eq!(totals.failed_shards.len(), 1);
        assert_eq!(totals.failed_shards[0].work_item, "logs__0");
        assert!(bulk.docs.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_setup_work_items_registers_every_shard() {
        let clock = Arc::new(ManualClock::new(0));
        let coordinator = Arc::new(InMemoryWorkCoordinator::new("w", clock));
        let config = MigrationConfig::default();
        let runner = DocumentsRunner::new(
            coordinator.clone(),
            Arc::new(FakeShardSource),
            Arc::new(FixtureUnpacker {
                path: PathBuf::from("/nonexistent"),
            }),
            Arc::new(CollectingBulk::default()) as Arc<dyn BulkClient>,
            os_1_3(),
            &config,
        );
        runner
            .setup_work_items(&[index("a", 3), index("b", 2)])
            .await
            .unwrap();
        assert_eq!(coordinator.num_incomplete().await.unwrap(), 5);
    }
}
