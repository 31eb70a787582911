//! Bulk API document sections, request bodies, and response handling.
//!
//! The bulk wire format is NDJSON: an action line then a source line per
//! document, with a trailing newline on the whole body. Partial failures
//! are retried with only the still-failing documents; documents that never
//! succeed within the retry budget are reported per-document, not as a
//! shard-level error.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{trace, warn};

use reshard_core::{Error, Result};

use crate::client::{with_retry, HttpResponse, OpenSearchClient, RetryPolicy};

/// One document destined for the bulk API.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocSection {
    pub id: String,
    pub source: Value,
}

impl BulkDocSection {
    /// The two NDJSON lines for this document.
    pub fn bulk_lines(&self) -> Result<String> {
        let action = serde_json::to_string(&serde_json::json!({"index": {"_id": self.id}}))?;
        let source = serde_json::to_string(&self.source)?;
        Ok(format!("{action}\n{source}"))
    }

    /// Assemble a full bulk request body; the trailing newline is part of
    /// the protocol.
    pub fn request_body<'a>(docs: impl IntoIterator<Item = &'a BulkDocSection>) -> Result<String> {
        let mut body = String::new();
        for doc in docs {
            body.push_str(&doc.bulk_lines()?);
            body.push('\n');
        }
        Ok(body)
    }

    /// Approximate serialized size, used for batch sizing.
    pub fn size_bytes(&self) -> usize {
        self.bulk_lines().map(|l| l.len() + 1).unwrap_or(0)
    }
}

/// A document that never succeeded within the retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDoc {
    pub id: String,
    pub reason: String,
}

/// Outcome of submitting one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDoc>,
}

/// The seam the document reindexer uses to reach the target's bulk API.
#[async_trait]
pub trait BulkClient: Send + Sync {
    async fn send_bulk(&self, index: &str, docs: Vec<BulkDocSection>) -> Result<BulkReport>;
}

#[derive(Debug, Deserialize)]
struct BulkResponseBody {
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItemDetail>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemDetail {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    error: Option<Value>,
}

fn errors_probe() -> &'static Regex {
    static PROBE: OnceLock<Regex> = OnceLock::new();
    // Cheap check before marshalling the whole response body.
    PROBE.get_or_init(|| Regex::new(r#""errors"\s*:\s*true"#).expect("static regex"))
}

fn has_failed_operations(body: &str) -> bool {
    errors_probe().is_match(body)
}

fn bad_status(status: u16) -> bool {
    !(status == 200 || status == 201)
}

/// Split a bulk response into (succeeded ids, failed id → reason).
fn partition_response(body: &str) -> Result<(Vec<String>, BTreeMap<String, String>)> {
    let parsed: BulkResponseBody = serde_json::from_str(body)?;
    let mut succeeded = Vec::new();
    let mut failed = BTreeMap::new();
    for item in parsed.items {
        // Each item has a single op key ("index" or "create").
        for detail in item.into_values() {
            let Some(id) = detail.id else { continue };
            match detail.error {
                Some(error) => {
                    failed.insert(id, format!("status {}: {}", detail.status, error));
                }
                None => succeeded.push(id),
            }
        }
    }
    Ok((succeeded, failed))
}

#[async_trait]
impl BulkClient for OpenSearchClient {
    /// Submit one batch, retrying only the documents that have not yet
    /// been acknowledged. Transport-level exhaustion surfaces as an error;
    /// per-document rejections that outlive the retry budget land in the
    /// report's `failed` list.
    async fn send_bulk(&self, index: &str, docs: Vec<BulkDocSection>) -> Result<BulkReport> {
        let attempted = docs.len();
        let mut pending: BTreeMap<String, BulkDocSection> =
            docs.into_iter().map(|d| (d.id.clone(), d)).collect();
        let path = format!("{index}/_bulk");
        let policy = RetryPolicy::bulk();
        let mut last_failures: BTreeMap<String, String> = BTreeMap::new();

        let mut attempt = 0;
        while !pending.is_empty() {
            trace!(index, pending = pending.len(), attempt, "Sending bulk request");
            let body = BulkDocSection::request_body(pending.values())?;

            let response: HttpResponse = with_retry(policy, || {
                let body = body.clone();
                let path = path.clone();
                async move {
                    let resp = self.rest().post(&path, Some(body)).await?;
                    if bad_status(resp.status) {
                        return Err(Error::Target {
                            status: resp.status,
                            body: resp.body,
                        });
                    }
                    Ok(resp)
                }
            })
            .await?;

            if !has_failed_operations(&response.body) {
                pending.clear();
                last_failures.clear();
                break;
            }

            let (succeeded, failed) = partition_response(&response.body)?;
            for id in &succeeded {
                pending.remove(id);
            }
            warn!(
                index,
                succeeded = succeeded.len(),
                remaining = pending.len(),
                "Bulk request partially failed"
            );
            last_failures = failed;

            if attempt >= policy.max_retries {
                break;
            }
            attempt += 1;
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        let failed: Vec<FailedDoc> = pending
            .keys()
            .map(|id| FailedDoc {
                id: id.clone(),
                reason: last_failures
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| "rejected by bulk request".to_string()),
            })
            .collect();
        Ok(BulkReport {
            attempted,
            succeeded: attempted - failed.len(),
            failed,
        })
    }
}
