//! # reshard-coordination
//!
//! Distributes (index, shard) work items across competing workers with
//! nothing but a shared document store and compare-and-swap updates. A
//! worker holds an exclusive time lease on an item; lease expiry is the
//! only failure-recovery mechanism, so a crashed worker's item simply
//! becomes claimable again.

pub mod clock;
pub mod coordinator;
pub mod mem;
pub mod opensearch;
pub mod work_item;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{ensure_phase_completion, WorkCoordinator, WorkItemVisitor};
pub use mem::InMemoryWorkCoordinator;
pub use opensearch::OpenSearchWorkCoordinator;
pub use work_item::{WorkAcquisitionOutcome, WorkItem, WorkItemId};
