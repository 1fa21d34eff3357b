//! Compute node configuration.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Default leading-zero-bit difficulty for the proof-of-work miner.
pub const DEFAULT_POW_DIFFICULTY_BITS: u32 = 14;

/// Upper bound on tasks generated per round.
pub const MAX_TASKS_PER_ROUND: u64 = 1000;

/// Compute node configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Registry address (`host:port`).
    pub registry_addr: String,
    /// Leading zero bits required of a proof-of-work hash.
    pub pow_difficulty_bits: u32,
    /// Tasks generated per round, drawn uniformly from this range.
    pub tasks_per_round: RangeInclusive<u64>,
    /// Pause between balancing-loop evaluations (default: 10ms).
    pub balance_interval: Duration,
    /// Address for the Prometheus endpoint, if any.
    pub metrics_addr: Option<SocketAddr>,
}

impl NodeConfig {
    /// Create a configuration with defaults for everything but the registry.
    pub fn new(registry_addr: impl Into<String>) -> Self {
        Self {
            registry_addr: registry_addr.into(),
            pow_difficulty_bits: DEFAULT_POW_DIFFICULTY_BITS,
            tasks_per_round: 1..=MAX_TASKS_PER_ROUND,
            balance_interval: Duration::from_millis(10),
            metrics_addr: None,
        }
    }

    /// Set the proof-of-work difficulty in leading zero bits.
    pub fn with_pow_difficulty_bits(mut self, bits: u32) -> Self {
        self.pow_difficulty_bits = bits;
        self
    }

    /// Set the per-round task generation range.
    pub fn with_tasks_per_round(mut self, range: RangeInclusive<u64>) -> Self {
        self.tasks_per_round = range;
        self
    }

    /// Set the balancing-loop evaluation interval.
    pub fn with_balance_interval(mut self, interval: Duration) -> Self {
        self.balance_interval = interval;
        self
    }

    /// Serve Prometheus metrics on the given address.
    pub fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }
}
