//! xorshift64* random number generator
//!
//! This is a fast, high-quality PRNG that is deterministic and suitable
//! for simulation purposes.
//!
//! # Algorithm
//!
//! xorshift64* is a variant of xorshift that passes TestU01's BigCrush
//! statistical tests. It uses 64-bit state and produces 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. Every replicate owns its own
//! generators, so the order in which units execute never changes what a
//! given unit draws.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use pdbench_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next_f64();
/// assert!((0.0..1.0).contains(&value));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is mapped to 1 (xorshift cannot leave the all-zero state).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Get current RNG state (for replaying a stream from a known point)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use pdbench_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let probability = rng.next_f64();
    /// assert!(probability >= 0.0 && probability < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Top 53 bits → [0.0, 1.0)
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Bernoulli draw: true with probability `prob`
    ///
    /// Always consumes exactly one value from the stream, so the number of
    /// draws per decision stays fixed regardless of `prob`.
    pub fn chance(&mut self, prob: f64) -> bool {
        self.next_f64() < prob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!(
                (0.0..1.0).contains(&val),
                "next_f64() produced value {} outside [0.0, 1.0)",
                val
            );
        }
    }

    #[test]
    fn test_next_f64_deterministic() {
        let mut rng1 = RngManager::new(99999);
        let mut rng2 = RngManager::new(99999);

        for _ in 0..100 {
            assert_eq!(rng1.next_f64(), rng2.next_f64(), "next_f64() not deterministic");
        }
    }

    #[test]
    fn test_chance_edges() {
        let mut rng = RngManager::new(7);
        for _ in 0..200 {
            assert!(!rng.chance(0.0));
            assert!(rng.chance(1.0));
        }
    }
}
