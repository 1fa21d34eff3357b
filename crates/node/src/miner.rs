//! Proof-of-work inner loop.

use ringmine_types::Task;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A found proof-of-work solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    /// Smallest nonce meeting the difficulty target.
    pub nonce: u64,
    /// SHA-256 of the task preimage plus nonce.
    pub hash: [u8; 32],
}

/// Mining failure. The search is deterministic and expected to succeed;
/// exhausting the nonce space is a safety net, not a real outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MineError {
    #[error("nonce space exhausted at difficulty {difficulty_bits}")]
    NonceSpaceExhausted { difficulty_bits: u32 },
}

/// Finds the smallest nonce whose hash clears a leading-zero-bit target.
///
/// Pure function of the task fields: the same task always yields the same
/// solution at the same difficulty.
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    difficulty_bits: u32,
}

impl Miner {
    /// Create a miner for the given difficulty (leading zero bits, capped at 255).
    pub fn new(difficulty_bits: u32) -> Self {
        Self {
            difficulty_bits: difficulty_bits.min(255),
        }
    }

    /// Difficulty in leading zero bits.
    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// Search nonces in ascending order until the target is met.
    pub fn mine(&self, task: &Task) -> Result<Solution, MineError> {
        let preimage = task.preimage();
        let mut nonce: u64 = 0;
        loop {
            let mut hasher = Sha256::new();
            hasher.update(&preimage);
            hasher.update(nonce.to_be_bytes());
            let digest: [u8; 32] = hasher.finalize().into();

            if leading_zero_bits(&digest) >= self.difficulty_bits {
                return Ok(Solution {
                    nonce,
                    hash: digest,
                });
            }

            nonce = nonce.checked_add(1).ok_or(MineError::NonceSpaceExhausted {
                difficulty_bits: self.difficulty_bits,
            })?;
        }
    }
}

fn leading_zero_bits(bytes: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for byte in bytes {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringmine_types::PeerAddr;

    fn task(payload: i32) -> Task {
        Task::new(PeerAddr::new("host-a", 7001), 1, payload)
    }

    #[test]
    fn test_solution_meets_difficulty() {
        let miner = Miner::new(8);
        let solution = miner.mine(&task(42)).unwrap();
        assert!(leading_zero_bits(&solution.hash) >= 8);
    }

    #[test]
    fn test_mining_is_deterministic() {
        let miner = Miner::new(8);
        let a = miner.mine(&task(42)).unwrap();
        let b = miner.mine(&task(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_payloads_differ() {
        let miner = Miner::new(4);
        let a = miner.mine(&task(1)).unwrap();
        let b = miner.mine(&task(2)).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let miner = Miner::new(0);
        let solution = miner.mine(&task(7)).unwrap();
        assert_eq!(solution.nonce, 0);
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut bytes = [0u8; 32];
        assert_eq!(leading_zero_bits(&bytes), 256);
        bytes[0] = 0x01;
        assert_eq!(leading_zero_bits(&bytes), 7);
        bytes[0] = 0x80;
        assert_eq!(leading_zero_bits(&bytes), 0);
        bytes[0] = 0x00;
        bytes[1] = 0x10;
        assert_eq!(leading_zero_bits(&bytes), 11);
    }
}
