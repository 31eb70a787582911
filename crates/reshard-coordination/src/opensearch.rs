//! Work coordination over an OpenSearch index.
//!
//! Every mutation is a conditional update guarded by the document's
//! `_seq_no`/`_primary_term`, so two workers racing for the same item see
//! exactly one winner; the loser gets a 409 and moves to the next
//! candidate. Acquisition contention is expected traffic, not an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use reshard_core::logging::WORK_ITEM_ID;
use reshard_core::{defaults, Error, Result};
use reshard_cluster::OpenSearchClient;

use crate::clock::Clock;
use crate::coordinator::WorkCoordinator;
use crate::work_item::{WorkAcquisitionOutcome, WorkItem, WorkItemId};

/// How many times completion re-reads after losing a conditional update.
const COMPLETION_ATTEMPTS: u32 = 3;

pub struct OpenSearchWorkCoordinator {
    client: OpenSearchClient,
    index: String,
    worker_id: String,
    clock: Arc<dyn Clock>,
}

impl OpenSearchWorkCoordinator {
    pub fn new(client: OpenSearchClient, worker_id: impl Into<String>) -> Self {
        Self::with_clock(client, worker_id, Arc::new(crate::clock::SystemClock))
    }

    pub fn with_clock(
        client: OpenSearchClient,
        worker_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            index: defaults::COORDINATION_INDEX.to_string(),
            worker_id: worker_id.into(),
            clock,
        }
    }

    async fn fetch(&self, id: &WorkItemId) -> Result<(WorkItem, u64, u64)> {
        let response = self
            .client
            .rest()
            .get(&format!("{}/_doc/{id}", self.index))
            .await?;
        if response.status == 404 {
            return Err(Error::Coordination(format!("unknown work item '{id}'")));
        }
        if response.status != 200 {
            return Err(Error::Target {
                status: response.status,
                body: response.body,
            });
        }
        let doc: FetchedDoc = serde_json::from_str(&response.body)?;
        Ok((doc.source, doc.seq_no, doc.primary_term))
    }

    /// Conditional write; `Ok(true)` on success, `Ok(false)` on a lost
    /// race (409).
    async fn cas_put(
        &self,
        id: &WorkItemId,
        item: &WorkItem,
        seq_no: u64,
        primary_term: u64,
    ) -> Result<bool> {
        let path = format!(
            "{}/_doc/{id}?if_seq_no={seq_no}&if_primary_term={primary_term}",
            self.index
        );
        let response = self
            .client
            .rest()
            .put(&path, Some(serde_json::to_string(item)?))
            .await?;
        match response.status {
            200 | 201 => Ok(true),
            409 => Ok(false),
            status => Err(Error::Target {
                status,
                body: response.body,
            }),
        }
    }

    /// Searches must see items other workers just created.
    async fn refresh(&self) {
        let path = format!("{}/_refresh", self.index);
        if let Err(e) = self.client.rest().post(&path, None).await {
            warn!(error = %e, "Coordination index refresh failed");
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchedDoc {
    #[serde(rename = "_source")]
    source: WorkItem,
    #[serde(rename = "_seq_no")]
    seq_no: u64,
    #[serde(rename = "_primary_term")]
    primary_term: u64,
}

/// Query for items with no completion and an expired (or never-set) lease.
fn acquisition_query(now: u64, size: usize) -> Value {
    json!({
        "size": size,
        "seq_no_primary_term": true,
        "query": {
            "bool": {
                "must_not": [{"exists": {"field": "completed_at"}}],
                "filter": [{"range": {"expiration": {"lte": now}}}]
            }
        },
        "sort": [{"expiration": "asc"}]
    })
}

fn incomplete_query() -> Value {
    json!({
        "query": {
            "bool": {"must_not": [{"exists": {"field": "completed_at"}}]}
        }
    })
}

#[derive(Debug)]
struct Candidate {
    id: WorkItemId,
    item: WorkItem,
    seq_no: u64,
    primary_term: u64,
}

fn parse_candidates(response: &Value) -> Result<Vec<Candidate>> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Coordination("search response missing hits".into()))?;
    let mut candidates = Vec::with_capacity(hits.len());
    for hit in hits {
        let doc: FetchedDoc = serde_json::from_value(hit.clone())?;
        let id = hit
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Coordination("search hit missing _id".into()))?
            .parse::<WorkItemId>()?;
        candidates.push(Candidate {
            id,
            item: doc.source,
            seq_no: doc.seq_no,
            primary_term: doc.primary_term,
        });
    }
    Ok(candidates)
}

#[async_trait]
impl WorkCoordinator for OpenSearchWorkCoordinator {
    async fn setup(&self) -> Result<()> {
        let body = json!({
            "settings": {"index": {"number_of_shards": 1, "auto_expand_replicas": "0-2"}},
            "mappings": {
                "properties": {
                    "expiration": {"type": "long"},
                    "completed_at": {"type": "long"},
                    "lease_holder": {"type": "keyword"},
                    "lease_exponent": {"type": "integer"}
                }
            }
        });
        let response = self
            .client
            .rest()
            .put(&self.index, Some(body.to_string()))
            .await?;
        match response.status {
            200 | 201 => {
                info!(index = self.index, "Created coordination index");
                Ok(())
            }
            400 if response.body.contains("resource_already_exists_exception") => Ok(()),
            status => Err(Error::Target {
                status,
                body: response.body,
            }),
        }
    }

    async fn create_unassigned_work_item(&self, id: &WorkItemId) -> Result<()> {
        let path = format!("{}/_create/{id}", self.index);
        let body = serde_json::to_string(&WorkItem::unassigned())?;
        let response = self.client.rest().put(&path, Some(body)).await?;
        match response.status {
            200 | 201 => Ok(()),
            // Already registered, possibly by another worker.
            409 => Ok(()),
            status => Err(Error::Target {
                status,
                body: response.body,
            }),
        }
    }

    async fn acquire_next_work_item(
        &self,
        lease: Duration,
    ) -> Result<WorkAcquisitionOutcome> {
        self.refresh().await;
        let now = self.clock.epoch_secs();
        let query = acquisition_query(now, defaults::ACQUIRE_CANDIDATE_WINDOW);
        let response = self
            .client
            .rest()
            .post(&format!("{}/_search", self.index), Some(query.to_string()))
            .await?;
        if response.status != 200 {
            return Err(Error::Target {
                status: response.status,
                body: response.body,
            });
        }
        let mut candidates = parse_candidates(&response.json()?)?;
        // Workers polling at the same moment see the same window; a random
        // claim order keeps them off each other's first pick.
        candidates.shuffle(&mut rand::thread_rng());

        for candidate in candidates {
            let lease_expiration = now + candidate.item.effective_lease_secs(lease);
            let claimed = WorkItem {
                expiration: lease_expiration,
                lease_holder: Some(self.worker_id.clone()),
                completed_at: None,
                lease_exponent: candidate.item.lease_exponent + 1,
            };
            if self
                .cas_put(&candidate.id, &claimed, candidate.seq_no, candidate.primary_term)
                .await?
            {
                debug!(
                    { WORK_ITEM_ID } = %candidate.id,
                    lease_expiration,
                    "Claimed work item"
                );
                return Ok(WorkAcquisitionOutcome::Acquired {
                    item: candidate.id,
                    lease_expiration,
                });
            }
            debug!({ WORK_ITEM_ID } = %candidate.id, "Lost claim race, trying next candidate");
        }
        Ok(WorkAcquisitionOutcome::NoAvailableWork)
    }

    async fn complete_work_item(&self, id: &WorkItemId) -> Result<()> {
        for _ in 0..COMPLETION_ATTEMPTS {
            let (item, seq_no, primary_term) = self.fetch(id).await?;
            if item.is_completed() {
                return Ok(());
            }
            let completed = WorkItem {
                completed_at: Some(self.clock.epoch_secs()),
                ..item
            };
            if self.cas_put(id, &completed, seq_no, primary_term).await? {
                return Ok(());
            }
        }
        Err(Error::Coordination(format!(
            "repeatedly lost the completion race for '{id}'"
        )))
    }

    async fn num_incomplete(&self) -> Result<u64> {
        self.refresh().await;
        let response = self
            .client
            .rest()
            .post(
                &format!("{}/_count", self.index),
                Some(incomplete_query().to_string()),
            )
            .await?;
        if response.status != 200 {
            return Err(Error::Target {
                status: response.status,
                body: response.body,
            });
        }
        response
            .json()?
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Coordination("count response missing 'count'".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_query_shape() {
        let query = acquisition_query(1_700_000, 10);
        assert_eq!(query["size"], 10);
        assert_eq!(query["seq_no_primary_term"], true);
        assert_eq!(
            query["query"]["bool"]["filter"][0]["range"]["expiration"]["lte"],
            1_700_000
        );
        assert_eq!(
            query["query"]["bool"]["must_not"][0]["exists"]["field"],
            "completed_at"
        );
    }

    #[test]
    fn test_parse_candidates() {
        let response = json!({
            "hits": {"hits": [
                {"_id": "logs__0", "_seq_no": 4, "_primary_term": 1,
                 "_source": {"expiration": 0, "lease_exponent": 0}},
                {"_id": "logs__1", "_seq_no": 9, "_primary_term": 2,
                 "_source": {"expiration": 500, "lease_holder": "w2",
                              "lease_exponent": 2}}
            ]}
        });
        let candidates = parse_candidates(&response).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, WorkItemId::new("logs", 0));
        assert_eq!(candidates[0].seq_no, 4);
        assert_eq!(candidates[1].item.lease_exponent, 2);
        assert_eq!(candidates[1].primary_term, 2);
    }

    #[test]
    fn test_parse_candidates_rejects_malformed_hits() {
        let response = json!({"hits": {"hits": [{"_seq_no": 1}]}});
        assert!(parse_candidates(&response).is_err());
        assert!(parse_candidates(&json!({})).is_err());
    }
}
