//! In-memory coordinator.
//!
//! Same contract as the OpenSearch-backed implementation with a mutex
//! standing in for CAS. Used by end-to-end tests and single-process runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reshard_core::Result;

use crate::clock::Clock;
use crate::coordinator::WorkCoordinator;
use crate::work_item::{WorkAcquisitionOutcome, WorkItem, WorkItemId};

pub struct InMemoryWorkCoordinator {
    worker_id: String,
    clock: Arc<dyn Clock>,
    items: Mutex<BTreeMap<WorkItemId, WorkItem>>,
}

impl InMemoryWorkCoordinator {
    pub fn new(worker_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker_id: worker_id.into(),
            clock,
            items: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current state of one item, for assertions.
    pub fn snapshot(&self, id: &WorkItemId) -> Option<WorkItem> {
        self.items.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl WorkCoordinator for InMemoryWorkCoordinator {
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn create_unassigned_work_item(&self, id: &WorkItemId) -> Result<()> {
        self.items
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert_with(WorkItem::unassigned);
        Ok(())
    }

    async fn acquire_next_work_item(
        &self,
        lease: Duration,
    ) -> Result<WorkAcquisitionOutcome> {
        let now = self.clock.epoch_secs();
        let mut items = self.items.lock().unwrap();
        for (id, item) in items.iter_mut() {
            if !item.is_claimable(now) {
                continue;
            }
            let lease_expiration = now + item.effective_lease_secs(lease);
            item.lease_holder = Some(self.worker_id.clone());
            item.expiration = lease_expiration;
            item.lease_exponent += 1;
            return Ok(WorkAcquisitionOutcome::Acquired {
                item: id.clone(),
                lease_expiration,
            });
        }
        Ok(WorkAcquisitionOutcome::NoAvailableWork)
    }

    async fn complete_work_item(&self, id: &WorkItemId) -> Result<()> {
        let now = self.clock.epoch_secs();
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.get_mut(id) {
            if item.completed_at.is_none() {
                item.completed_at = Some(now);
            }
        }
        Ok(())
    }

    async fn num_incomplete(&self) -> Result<u64> {
        let items = self.items.lock().unwrap();
        Ok(items.values().filter(|i| !i.is_completed()).count() as u64)
    }
}
