//! Work-item identity and state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use reshard_core::{defaults, Error};

/// One (index, shard) unit of document migration work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemId {
    pub index_name: String,
    pub shard: u32,
}

impl WorkItemId {
    pub fn new(index_name: impl Into<String>, shard: u32) -> Self {
        Self {
            index_name: index_name.into(),
            shard,
        }
    }
}

/// String form `index__shard`, used as the coordination document id.
impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.index_name, self.shard)
    }
}

impl FromStr for WorkItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Index names may themselves contain `__`; the shard is whatever
        // follows the last separator.
        let (index_name, shard) = s
            .rsplit_once("__")
            .ok_or_else(|| Error::Coordination(format!("malformed work item id '{s}'")))?;
        let shard = shard
            .parse::<u32>()
            .map_err(|_| Error::Coordination(format!("malformed work item id '{s}'")))?;
        if index_name.is_empty() {
            return Err(Error::Coordination(format!("malformed work item id '{s}'")));
        }
        Ok(Self::new(index_name, shard))
    }
}

/// Persisted state of one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Epoch seconds the current lease expires; 0 means never assigned.
    #[serde(default)]
    pub expiration: u64,
    #[serde(default)]
    pub lease_holder: Option<String>,
    /// Epoch seconds of completion; set once, never cleared.
    #[serde(default)]
    pub completed_at: Option<u64>,
    /// Doubles the effective lease on each re-acquisition.
    #[serde(default)]
    pub lease_exponent: u32,
}

impl WorkItem {
    pub fn unassigned() -> Self {
        Self {
            expiration: 0,
            lease_holder: None,
            completed_at: None,
            lease_exponent: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Whether the item can be claimed at `now`.
    pub fn is_claimable(&self, now: u64) -> bool {
        !self.is_completed() && self.expiration <= now
    }

    /// Lease length for the next acquisition of this item.
    pub fn effective_lease_secs(&self, base: Duration) -> u64 {
        let exponent = self.lease_exponent.min(defaults::MAX_LEASE_EXPONENT);
        base.as_secs().saturating_mul(1 << exponent)
    }
}

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkAcquisitionOutcome {
    Acquired {
        item: WorkItemId,
        lease_expiration: u64,
    },
    NoAvailableWork,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_string_round_trip() {
        let id = WorkItemId::new("logs-2024", 3);
        assert_eq!(id.to_string(), "logs-2024__3");
        assert_eq!("logs-2024__3".parse::<WorkItemId>().unwrap(), id);
    }

    #[test]
    fn test_id_with_separator_in_index_name() {
        let id = "my__index__7".parse::<WorkItemId>().unwrap();
        assert_eq!(id.index_name, "my__index");
        assert_eq!(id.shard, 7);
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert!("noseparator".parse::<WorkItemId>().is_err());
        assert!("index__notanumber".parse::<WorkItemId>().is_err());
        assert!("__3".parse::<WorkItemId>().is_err());
    }

    #[test]
    fn test_claimability() {
        let mut item = WorkItem::unassigned();
        assert!(item.is_claimable(0));
        item.expiration = 100;
        assert!(!item.is_claimable(99));
        assert!(item.is_claimable(100));
        item.completed_at = Some(50);
        assert!(!item.is_claimable(200));
    }

    #[test]
    fn test_lease_doubles_and_caps() {
        let base = Duration::from_secs(600);
        let mut item = WorkItem::unassigned();
        assert_eq!(item.effective_lease_secs(base), 600);
        item.lease_exponent = 1;
        assert_eq!(item.effective_lease_secs(base), 1_200);
        item.lease_exponent = 99;
        assert_eq!(
            item.effective_lease_secs(base),
            600 << reshard_core::defaults::MAX_LEASE_EXPONENT
        );
    }
}
