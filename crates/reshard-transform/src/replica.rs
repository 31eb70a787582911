//! Replica-count adjustment for zone-aware targets.
//!
//! With awareness dimensionality `d` (zones, or minimum replicas + 1),
//! every copy set must divide evenly across zones: `(replicas + 1) % d`
//! must be zero. The default policy lifts the requested count to the
//! smallest satisfying value; a strict policy flags the mismatch instead
//! of silently rewriting it.

use serde_json::Value;
use tracing::debug;

use reshard_core::IndexMetadata;

use crate::rule::{CanApplyResult, IndexTransformation, IssueCode};

const REPLICAS_FLAT: &str = "index.number_of_replicas";

/// What to do when the requested replica count does not satisfy the
/// awareness dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaPolicy {
    /// Raise the count to the smallest satisfying value.
    Lift,
    /// Leave the count alone and record an issue.
    RequireExact,
}

pub struct ReplicaAwarenessRule {
    dimensionality: u32,
    policy: ReplicaPolicy,
}

impl ReplicaAwarenessRule {
    pub fn new(dimensionality: u32, policy: ReplicaPolicy) -> Self {
        Self {
            dimensionality,
            policy,
        }
    }

    /// Smallest count >= `replicas` with `(count + 1) % d == 0`.
    fn lifted(&self, replicas: u64) -> u64 {
        let d = u64::from(self.dimensionality);
        let rem = (replicas + 1) % d;
        if rem == 0 {
            replicas
        } else {
            replicas + (d - rem)
        }
    }

    /// Reads `number_of_replicas` from either the flat dotted form
    /// (snapshot metadata) or the nested form (live-cluster settings).
    fn current_replicas(settings: &Value) -> Option<Result<u64, String>> {
        let raw = settings
            .get(REPLICAS_FLAT)
            .or_else(|| settings.get("index").and_then(|i| i.get("number_of_replicas")))?;
        let parsed = match raw {
            Value::Number(n) => n.as_u64().ok_or_else(|| raw.to_string()),
            Value::String(s) => s.parse::<u64>().map_err(|_| s.clone()),
            other => Err(other.to_string()),
        };
        Some(parsed)
    }

    fn write_replicas(settings: &mut Value, count: u64) {
        // Settings values are strings on the wire; keep that shape.
        let as_string = Value::String(count.to_string());
        if let Some(slot) = settings.get_mut(REPLICAS_FLAT) {
            *slot = as_string;
        } else if let Some(slot) = settings
            .get_mut("index")
            .and_then(|i| i.get_mut("number_of_replicas"))
        {
            *slot = as_string;
        }
    }
}

impl IndexTransformation for ReplicaAwarenessRule {
    fn name(&self) -> &'static str {
        "replica-awareness"
    }

    fn can_apply(&self, index: &IndexMetadata) -> CanApplyResult {
        if self.dimensionality <= 1 {
            return CanApplyResult::No;
        }
        let replicas = match Self::current_replicas(&index.settings) {
            None => return CanApplyResult::No,
            Some(Err(raw)) => {
                return CanApplyResult::Unsupported(format!(
                    "unparseable number_of_replicas: {raw}"
                ))
            }
            Some(Ok(n)) => n,
        };
        if self.lifted(replicas) == replicas {
            return CanApplyResult::No;
        }
        match self.policy {
            ReplicaPolicy::Lift => CanApplyResult::Yes,
            ReplicaPolicy::RequireExact => CanApplyResult::Unsupported(format!(
                "replica count {replicas} does not fit awareness dimensionality {}",
                self.dimensionality
            )),
        }
    }

    fn apply(&self, index: &mut IndexMetadata) {
        if let Some(Ok(replicas)) = Self::current_replicas(&index.settings) {
            let lifted = self.lifted(replicas);
            debug!(
                index = index.name,
                replicas, lifted, "Lifting replica count for awareness"
            );
            Self::write_replicas(&mut index.settings, lifted);
        }
    }

    fn issue_code(&self) -> IssueCode {
        IssueCode::IncompatibleReplicaCount
    }
}
