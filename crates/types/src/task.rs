//! Unit-of-work type.

use crate::PeerAddr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of proof-of-work.
///
/// A task is created by its origin node during a round and never mutated
/// afterwards. Identity is the full tuple: two tasks are equal only if
/// origin, round, and payload all match. A task may migrate between nodes
/// during balancing but is never duplicated; the sender removes it from its
/// local sequence atomically with the send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    /// Node that created the task.
    pub origin: PeerAddr,
    /// Round the task belongs to.
    pub round: u32,
    /// Random payload nonce fixed at creation.
    pub payload: i32,
}

impl Task {
    /// Create a new task.
    pub fn new(origin: PeerAddr, round: u32, payload: i32) -> Self {
        Self {
            origin,
            round,
            payload,
        }
    }

    /// Stable byte form of the task identity, fed to the proof-of-work hash.
    pub fn preimage(&self) -> Vec<u8> {
        let host = self.origin.host().as_bytes();
        let mut bytes = Vec::with_capacity(host.len() + 10);
        bytes.extend_from_slice(host);
        bytes.extend_from_slice(&self.origin.port().to_be_bytes());
        bytes.extend_from_slice(&self.round.to_be_bytes());
        bytes.extend_from_slice(&self.payload.to_be_bytes());
        bytes
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/r{}/{}", self.origin, self.round, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_full_tuple() {
        let origin = PeerAddr::new("host-a", 7001);
        let a = Task::new(origin.clone(), 1, 42);
        let b = Task::new(origin.clone(), 1, 42);
        assert_eq!(a, b);

        assert_ne!(a, Task::new(origin.clone(), 2, 42));
        assert_ne!(a, Task::new(origin, 1, 43));
        assert_ne!(a, Task::new(PeerAddr::new("host-b", 7001), 1, 42));
    }

    #[test]
    fn test_preimage_distinguishes_fields() {
        let origin = PeerAddr::new("host-a", 7001);
        let a = Task::new(origin.clone(), 1, 42);
        let b = Task::new(origin, 1, 43);
        assert_ne!(a.preimage(), b.preimage());
    }
}
