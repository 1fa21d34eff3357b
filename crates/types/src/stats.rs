//! Per-round traffic counter snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a node's traffic counters.
///
/// Carried in the traffic summary a node uploads to the registry at the end
/// of a run. The live counters themselves are atomics owned by the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Tasks created locally.
    pub generated: u64,
    /// Tasks migrated out to neighbors.
    pub pushed: u64,
    /// Tasks migrated in from neighbors.
    pub pulled: u64,
    /// Tasks whose proof-of-work finished here.
    pub completed: u64,
}

impl StatsSnapshot {
    /// Tasks this node was responsible for executing:
    /// everything generated or pulled, minus what was pushed away.
    pub fn retained(&self) -> u64 {
        (self.generated + self.pulled).saturating_sub(self.pushed)
    }
}
