//! Balancing protocol math.
//!
//! The round controller drives the migration loop; the arithmetic that
//! decides *whether*, *where*, and *how much* to migrate lives here so it can
//! be tested without a ring.

use ringmine_types::{PeerAddr, Task};
use std::collections::HashMap;

/// Maximum tasks moved per migration. Amortizes migration overhead while
/// keeping the balancing loop responsive.
pub const BATCH_SIZE: usize = 10;

/// Fraction of known peers that must sit within tolerance of the mean before
/// a node considers the ring balanced.
pub const BALANCED_PEER_RATIO: f64 = 0.70;

/// Fair-share task count: ceil of the overlay-wide total over the ring size.
pub fn balanced_count(
    local_count: usize,
    peer_counts: &HashMap<PeerAddr, u64>,
    overlay_size: usize,
) -> usize {
    let total = local_count as u64 + peer_counts.values().sum::<u64>();
    (total as usize).div_ceil(overlay_size.max(1))
}

/// Balance tolerance: `max(1, ceil(0.1 * mean))`.
pub fn tolerance(balanced: usize) -> usize {
    balanced.div_ceil(10).max(1)
}

fn within_band(count: u64, balanced: usize, tol: u64) -> bool {
    count.abs_diff(balanced as u64) <= tol
}

/// Whether balancing has converged from this node's point of view.
///
/// Two conditions: at least [`BALANCED_PEER_RATIO`] of the known peers last
/// reported a count inside the tolerance band, and this node's own total is
/// inside the band too. The second condition keeps a node from freezing an
/// out-of-band count into the ring by starting execution early; the peers a
/// node stops serving once it executes are exactly the ones still counting
/// its frozen value. An empty peer view (single-node ring) is balanced.
pub fn is_globally_balanced(
    peer_counts: &HashMap<PeerAddr, u64>,
    own_total: usize,
    balanced: usize,
) -> bool {
    let tol = tolerance(balanced) as u64;
    if !within_band(own_total as u64, balanced, tol) {
        return false;
    }
    if peer_counts.is_empty() {
        return true;
    }
    let within = peer_counts
        .values()
        .filter(|&&count| within_band(count, balanced, tol))
        .count();
    within as f64 / peer_counts.len() as f64 >= BALANCED_PEER_RATIO
}

/// What the balancing loop should do this iteration, from the node's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceAction {
    /// Overloaded: offer tasks to neighbors at or below the mean.
    Push { total: u64 },
    /// At or below the mean: ask neighbors at or above it for tasks.
    Pull { deficit: u64 },
}

/// Classify this node against the mean.
pub fn classify(total: usize, balanced: usize) -> BalanceAction {
    if total > balanced {
        BalanceAction::Push {
            total: total as u64,
        }
    } else {
        BalanceAction::Pull {
            deficit: (balanced - total) as u64,
        }
    }
}

/// How many tasks to hand a requester that reported the given deficit.
///
/// Never more than [`BATCH_SIZE`], never more than we hold, and never more
/// than the requester is short: capping at the deficit stops a small
/// imbalance from overshooting into an oscillation the tolerance band is too
/// narrow to absorb.
pub fn migration_quota(available: usize, requester_deficit: u64) -> usize {
    BATCH_SIZE
        .min(available)
        .min(requester_deficit.min(usize::MAX as u64) as usize)
}

/// Extract a migration batch of `quota` tasks from the front of the sequence.
///
/// The caller removes tasks atomically with the send, so a task is never on
/// two nodes at once.
pub fn extract_batch(tasks: &mut Vec<Task>, quota: usize) -> Vec<Task> {
    let take = tasks.len().min(quota);
    tasks.drain(..take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> HashMap<PeerAddr, u64> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (host, count))| (PeerAddr::new(*host, 7000 + i as u16), *count))
            .collect()
    }

    #[test]
    fn test_balanced_count_two_node_skew() {
        // A generates 1000, B reports 10: mean = ceil(1010 / 2) = 505
        let peers = counts(&[("host-b", 10)]);
        assert_eq!(balanced_count(1000, &peers, 2), 505);
    }

    #[test]
    fn test_balanced_count_rounds_up() {
        let peers = counts(&[("host-b", 5), ("host-c", 5)]);
        // 11 / 3 -> 4
        assert_eq!(balanced_count(1, &peers, 3), 4);
    }

    #[test]
    fn test_tolerance_is_at_least_one() {
        assert_eq!(tolerance(0), 1);
        assert_eq!(tolerance(5), 1);
        assert_eq!(tolerance(10), 1);
        assert_eq!(tolerance(258), 26);
        assert_eq!(tolerance(505), 51);
    }

    #[test]
    fn test_empty_view_is_balanced_when_own_count_fits() {
        assert!(is_globally_balanced(&HashMap::new(), 100, 100));
        assert!(!is_globally_balanced(&HashMap::new(), 500, 100));
    }

    #[test]
    fn test_seventy_percent_rule() {
        // mean 100, tolerance 10: three of four peers inside the band = 75%
        let peers = counts(&[
            ("host-b", 95),
            ("host-c", 105),
            ("host-d", 110),
            ("host-e", 300),
        ]);
        assert!(is_globally_balanced(&peers, 100, 100));

        // two of four inside = 50%
        let peers = counts(&[
            ("host-b", 95),
            ("host-c", 105),
            ("host-d", 250),
            ("host-e", 300),
        ]);
        assert!(!is_globally_balanced(&peers, 100, 100));
    }

    #[test]
    fn test_own_count_outside_band_blocks_convergence() {
        let peers = counts(&[("host-b", 100), ("host-c", 100), ("host-d", 100)]);
        assert!(is_globally_balanced(&peers, 100, 100));
        assert!(!is_globally_balanced(&peers, 300, 100));
    }

    #[test]
    fn test_uniform_ring_is_balanced_immediately() {
        let peers = counts(&[("host-b", 250), ("host-c", 250), ("host-d", 250)]);
        let mean = balanced_count(250, &peers, 4);
        assert_eq!(mean, 250);
        assert!(is_globally_balanced(&peers, 250, mean));
    }

    #[test]
    fn test_classify_overloaded() {
        assert_eq!(classify(900, 505), BalanceAction::Push { total: 900 });
    }

    #[test]
    fn test_classify_underloaded_reports_deficit() {
        assert_eq!(classify(10, 505), BalanceAction::Pull { deficit: 495 });
        // exactly at the mean is not overloaded
        assert_eq!(classify(505, 505), BalanceAction::Pull { deficit: 0 });
    }

    #[test]
    fn test_migration_quota_caps() {
        // plenty available, large deficit: full batch
        assert_eq!(migration_quota(900, 495), BATCH_SIZE);
        // short on tasks
        assert_eq!(migration_quota(3, 495), 3);
        // small deficit: only what the requester is missing
        assert_eq!(migration_quota(900, 4), 4);
        // balanced requester gets nothing
        assert_eq!(migration_quota(900, 0), 0);
    }

    #[test]
    fn test_extract_batch_takes_from_front() {
        let origin = PeerAddr::new("host-a", 7001);
        let mut tasks: Vec<Task> = (0..25).map(|i| Task::new(origin.clone(), 1, i)).collect();

        let batch = extract_batch(&mut tasks, BATCH_SIZE);
        assert_eq!(batch.len(), BATCH_SIZE);
        assert_eq!(tasks.len(), 15);
        // batch comes from the front, remainder keeps order
        assert_eq!(batch[0].payload, 0);
        assert_eq!(tasks[0].payload, 10);
    }

    #[test]
    fn test_extract_batch_takes_fewer_when_short() {
        let origin = PeerAddr::new("host-a", 7001);
        let mut tasks: Vec<Task> = (0..3).map(|i| Task::new(origin.clone(), 1, i)).collect();

        let batch = extract_batch(&mut tasks, BATCH_SIZE);
        assert_eq!(batch.len(), 3);
        assert!(tasks.is_empty());

        assert!(extract_batch(&mut tasks, BATCH_SIZE).is_empty());
    }

    #[test]
    fn test_small_imbalance_settles_exactly() {
        // total 11 over 2 nodes: mean 6, band [5, 7]; a 9/2 split must not
        // oscillate: the overloaded side hands over exactly the deficit
        let quota = migration_quota(9, 4);
        assert_eq!(quota, 4);
        // 9 - 4 = 5 and 2 + 4 = 6, both inside the band
        let mean = 6;
        let tol = tolerance(mean) as u64;
        assert!((9 - quota as u64).abs_diff(mean as u64) <= tol);
        assert!((2 + quota as u64).abs_diff(mean as u64) <= tol);
    }
}
