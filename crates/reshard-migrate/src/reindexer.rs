//! Pushes a shard's document stream into the target's bulk API.
//!
//! Documents are batched by count and by serialized size, and batches are
//! kept in flight under a concurrency cap. A document the source could not
//! decode is counted and skipped; it never aborts the shard.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use reshard_core::logging::INDEX;
use reshard_core::{defaults, RawDocument, Result};
use reshard_cluster::bulk::{BulkClient, BulkDocSection, BulkReport, FailedDoc};

/// What happened to one shard's worth of documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReindexSummary {
    /// Documents submitted to the bulk API.
    pub attempted: usize,
    /// Documents the target acknowledged.
    pub succeeded: usize,
    /// Documents the target rejected past the retry budget.
    pub failed: Vec<FailedDoc>,
    /// Documents the source could not decode.
    pub malformed: usize,
}

impl ReindexSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.malformed == 0
    }

    fn absorb(&mut self, report: BulkReport) {
        self.attempted += report.attempted;
        self.succeeded += report.succeeded;
        self.failed.extend(report.failed);
    }
}

type BatchFuture = Pin<Box<dyn Future<Output = BulkReport> + Send>>;

pub struct DocumentReindexer {
    bulk: Arc<dyn BulkClient>,
    max_docs_per_request: usize,
    max_bytes_per_request: usize,
    max_concurrent_requests: usize,
}

impl DocumentReindexer {
    pub fn new(bulk: Arc<dyn BulkClient>) -> Self {
        Self {
            bulk,
            max_docs_per_request: defaults::MAX_DOCS_PER_BULK_REQUEST,
            max_bytes_per_request: defaults::MAX_BYTES_PER_BULK_REQUEST,
            max_concurrent_requests: defaults::MAX_CONCURRENT_BULK_REQUESTS,
        }
    }

    pub fn with_limits(
        mut self,
        max_docs_per_request: usize,
        max_bytes_per_request: usize,
        max_concurrent_requests: usize,
    ) -> Self {
        self.max_docs_per_request = max_docs_per_request.max(1);
        self.max_bytes_per_request = max_bytes_per_request.max(1);
        self.max_concurrent_requests = max_concurrent_requests.max(1);
        self
    }

    /// Drain `docs` into `index`. Returns only once every batch has been
    /// acknowledged or given up on.
    pub async fn reindex(
        &self,
        index: &str,
        docs: impl Iterator<Item = Result<RawDocument>>,
    ) -> Result<ReindexSummary> {
        let mut summary = ReindexSummary::default();
        let mut in_flight: FuturesUnordered<BatchFuture> = FuturesUnordered::new();
        let mut batch: Vec<BulkDocSection> = Vec::new();
        let mut batch_bytes = 0usize;

        for item in docs {
            let doc = match item {
                Ok(doc) => doc,
                Err(e) => {
                    warn!({ INDEX } = index, error = %e, "Skipping undecodable document");
                    summary.malformed += 1;
                    continue;
                }
            };
            let section = BulkDocSection {
                id: doc.id,
                source: doc.source,
            };
            let size = section.size_bytes();
            let full = !batch.is_empty()
                && (batch.len() >= self.max_docs_per_request
                    || batch_bytes + size > self.max_bytes_per_request);
            if full {
                in_flight.push(self.submit(index, std::mem::take(&mut batch)));
                batch_bytes = 0;
                if in_flight.len() >= self.max_concurrent_requests {
                    if let Some(report) = in_flight.next().await {
                        summary.absorb(report);
                    }
                }
            }
            batch_bytes += size;
            batch.push(section);
        }
        if !batch.is_empty() {
            in_flight.push(self.submit(index, batch));
        }
        while let Some(report) = in_flight.next().await {
            summary.absorb(report);
        }

        debug!(
            { INDEX } = index,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            malformed = summary.malformed,
            "Reindex finished"
        );
        Ok(summary)
    }

    /// Transport-level exhaustion is folded into the report so one bad
    /// batch cannot hide the fate of the others.
    fn submit(&self, index: &str, batch: Vec<BulkDocSection>) -> BatchFuture {
        let bulk = Arc::clone(&self.bulk);
        let index = index.to_string();
        Box::pin(async move {
            let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();
            match bulk.send_bulk(&index, batch).await {
                Ok(report) => report,
                Err(e) => {
                    warn!({ INDEX } = index.as_str(), error = %e, "Bulk request failed");
                    let reason = e.to_string();
                    BulkReport {
                        attempted: ids.len(),
                        succeeded: 0,
                        failed: ids
                            .into_iter()
                            .map(|id| FailedDoc {
                                id,
                                reason: reason.clone(),
                            })
                            .collect(),
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use reshard_core::Error;

    struct RecordingBulk {
        batches: Mutex<Vec<Vec<String>>>,
        reject: Vec<String>,
        fail_transport: bool,
    }

    impl RecordingBulk {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                reject: Vec::new(),
                fail_transport: false,
            }
        }
    }

    #[async_trait]
    impl BulkClient for RecordingBulk {
        async fn send_bulk(&self, _index: &str, docs: Vec<BulkDocSection>) -> Result<BulkReport> {
            let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
            self.batches.lock().unwrap().push(ids.clone());
            if self.fail_transport {
                return Err(Error::Request("connection reset".into()));
            }
            let failed: Vec<FailedDoc> = ids
                .iter()
                .filter(|id| self.reject.contains(id))
                .map(|id| FailedDoc {
                    id: id.clone(),
                    reason: "mapper_parsing_exception".into(),
                })
                .collect();
            Ok(BulkReport {
                attempted: docs.len(),
                succeeded: docs.len() - failed.len(),
                failed,
            })
        }
    }

    fn doc(id: &str) -> Result<RawDocument> {
        Ok(RawDocument {
            id: id.to_string(),
            source: json!({"n": id}),
        })
    }

    #[tokio::test]
    async fn test_batches_by_doc_count() {
        let bulk = Arc::new(RecordingBulk::new());
        let reindexer =
            DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>).with_limits(2, 1 << 20, 1);
        let docs = vec![doc("a"), doc("b"), doc("c"), doc("d"), doc("e")];
        let summary = reindexer.reindex("idx", docs.into_iter()).await.unwrap();

        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.succeeded, 5);
        assert!(summary.is_clean());
        let batches = bulk.batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec!["a", "b"]);
        assert_eq!(batches[2], vec!["e"]);
    }

    #[tokio::test]
    async fn test_batches_by_byte_size() {
        let bulk = Arc::new(RecordingBulk::new());
        // Each doc section is well over 20 bytes, so every doc flushes.
        let reindexer =
            DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>).with_limits(100, 20, 1);
        let docs = vec![doc("a"), doc("b"), doc("c")];
        let summary = reindexer.reindex("idx", docs.into_iter()).await.unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(bulk.batches.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_docs_counted_not_fatal() {
        let bulk = Arc::new(RecordingBulk::new());
        let reindexer = DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>);
        let docs = vec![
            doc("a"),
            Err(Error::CorruptSegment("bad _source".into())),
            doc("b"),
        ];
        let summary = reindexer.reindex("idx", docs.into_iter()).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.malformed, 1);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_rejected_docs_reported() {
        let mut fake = RecordingBulk::new();
        fake.reject = vec!["bad".to_string()];
        let bulk = Arc::new(fake);
        let reindexer = DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>);
        let docs = vec![doc("ok"), doc("bad")];
        let summary = reindexer.reindex("idx", docs.into_iter()).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id, "bad");
    }

    #[tokio::test]
    async fn test_transport_failure_marks_whole_batch() {
        let mut fake = RecordingBulk::new();
        fake.fail_transport = true;
        let bulk = Arc::new(fake);
        let reindexer = DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>);
        let docs = vec![doc("a"), doc("b")];
        let summary = reindexer.reindex("idx", docs.into_iter()).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.failed[0].reason.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let bulk = Arc::new(RecordingBulk::new());
        let reindexer = DocumentReindexer::new(Arc::clone(&bulk) as Arc<dyn BulkClient>);
        let summary = reindexer
            .reindex("idx", std::iter::empty())
            .await
            .unwrap();
        assert_eq!(summary, ReindexSummary::default());
        assert!(bulk.batches.lock().unwrap().is_empty());
    }
}
