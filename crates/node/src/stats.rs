//! Per-node traffic counters.

use ringmine_types::StatsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live traffic counters for one node.
///
/// Incremented from the round controller, the message handlers, and the
/// worker threads, so every counter is atomic. `completed` is bumped
/// per-task by the workers; the rest by whichever handler moved the tasks.
#[derive(Debug, Default)]
pub struct TaskStatistics {
    generated: AtomicU64,
    pushed: AtomicU64,
    pulled: AtomicU64,
    completed: AtomicU64,
}

impl TaskStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_generated(&self, n: u64) {
        self.generated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_pushed(&self, n: u64) {
        self.pushed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_pulled(&self, n: u64) {
        self.pulled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_completed(&self, n: u64) {
        self.completed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all four counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            pulled: self.pulled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters, as required after a traffic summary upload.
    pub fn reset(&self) {
        self.generated.store(0, Ordering::Relaxed);
        self.pushed.store(0, Ordering::Relaxed);
        self.pulled.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = TaskStatistics::new();
        stats.add_generated(100);
        stats.add_pushed(20);
        stats.add_pulled(5);
        stats.add_completed(85);

        let snap = stats.snapshot();
        assert_eq!(snap.generated, 100);
        assert_eq!(snap.pushed, 20);
        assert_eq!(snap.pulled, 5);
        assert_eq!(snap.completed, 85);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = TaskStatistics::new();
        stats.add_generated(7);
        stats.add_completed(7);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
