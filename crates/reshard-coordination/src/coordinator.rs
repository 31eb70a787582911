//! The coordinator seam and the phase-completion driver.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use reshard_core::Result;

use crate::work_item::{WorkAcquisitionOutcome, WorkItemId};

/// Shared work-item store. All implementations must guarantee that two
/// workers can never both observe the same item as freshly acquired.
#[async_trait]
pub trait WorkCoordinator: Send + Sync {
    /// Prepare backing storage. Safe to call from every worker.
    async fn setup(&self) -> Result<()>;

    /// Register an item in the unassigned state. Idempotent: an existing
    /// item (in any state) is left untouched.
    async fn create_unassigned_work_item(&self, id: &WorkItemId) -> Result<()>;

    /// Claim one claimable item under an exclusive lease. Contention is
    /// not an error; losing every candidate yields `NoAvailableWork`.
    async fn acquire_next_work_item(&self, lease: Duration)
        -> Result<WorkAcquisitionOutcome>;

    /// Mark an item done. Completing an already-completed item succeeds.
    async fn complete_work_item(&self, id: &WorkItemId) -> Result<()>;

    async fn num_incomplete(&self) -> Result<u64>;
}

/// Callbacks for one `ensure_phase_completion` step.
#[async_trait]
pub trait WorkItemVisitor: Send + Sync {
    /// Every item in the phase is complete.
    async fn on_already_completed(&self) -> Result<()> {
        Ok(())
    }

    /// An item was acquired; do the work. Returning `Err` leaves the item
    /// leased, to be reclaimed after expiry.
    async fn on_acquired_work(&self, item: &WorkItemId) -> Result<()>;

    /// Work remains but every candidate is currently leased elsewhere.
    async fn on_no_available_work(&self) -> Result<()> {
        Ok(())
    }
}

/// Drive one step of a phase: acquire, visit, complete. Returns `true`
/// while work remains anywhere in the phase, so callers own the polling
/// loop and its pacing.
pub async fn ensure_phase_completion(
    coordinator: &dyn WorkCoordinator,
    lease: Duration,
    visitor: &dyn WorkItemVisitor,
) -> Result<bool> {
    match coordinator.acquire_next_work_item(lease).await? {
        WorkAcquisitionOutcome::Acquired {
            item,
            lease_expiration,
        } => {
            debug!(work_item_id = %item, lease_expiration, "Acquired work item");
            visitor.on_acquired_work(&item).await?;
            coordinator.complete_work_item(&item).await?;
            Ok(true)
        }
        WorkAcquisitionOutcome::NoAvailableWork => {
            let remaining = coordinator.num_incomplete().await?;
            if remaining == 0 {
                info!("Phase complete");
                visitor.on_already_completed().await?;
                Ok(false)
            } else {
                debug!(remaining, "No claimable work; items still leased elsewhere");
                visitor.on_no_available_work().await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mem::InMemoryWorkCoordinator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingVisitor {
        visited: AtomicUsize,
        completed_phases: AtomicUsize,
    }

    impl CountingVisitor {
        fn new() -> Self {
            Self {
                visited: AtomicUsize::new(0),
                completed_phases: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkItemVisitor for CountingVisitor {
        async fn on_already_completed(&self) -> Result<()> {
            self.completed_phases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_acquired_work(&self, _item: &WorkItemId) -> Result<()> {
            self.visited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_phase_runs_to_completion() {
        let clock = Arc::new(ManualClock::new(1_000));
        let coordinator = InMemoryWorkCoordinator::new("worker-1", clock);
        for shard in 0..3 {
            coordinator
                .create_unassigned_work_item(&WorkItemId::new("logs", shard))
                .await
                .unwrap();
        }
        let visitor = CountingVisitor::new();
        let lease = Duration::from_secs(600);

        let mut steps = 0;
        while ensure_phase_completion(&coordinator, lease, &visitor)
            .await
            .unwrap()
        {
            steps += 1;
            assert!(steps < 10, "phase failed to converge");
        }
        assert_eq!(visitor.visited.load(Ordering::SeqCst), 3);
        assert_eq!(visitor.completed_phases.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.num_incomplete().await.unwrap(), 0);
    }
}
