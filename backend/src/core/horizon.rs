//! Horizon Policy: decides, round by round, whether the game continues
//!
//! Two variants, both constructed with a seed:
//!
//! - **Fixed**: stops once `round_index >= n_rounds`.
//! - **Geometric**: after each completed round, one uniform draw from that
//!   round's dedicated stream; the game stops when the draw is below
//!   `stop_prob`. A safety cap (`max_rounds`) bounds the game; reaching it is
//!   reported through [`HorizonPolicy::cap_hit`], not as an error.
//!
//! # Determinism
//!
//! The draw for completed round `r` comes from a generator seeded with
//! `split_seed(seed, r)`, and draws are memoised. The same seed therefore
//! yields the same stop decisions for any sequence of queries, in any process.

use crate::config::HorizonConfig;
use crate::models::HorizonInfo;
use crate::rng::{split_seed, RngManager};

#[derive(Debug, Clone, PartialEq)]
enum HorizonKind {
    Fixed { n_rounds: usize },
    Geometric { stop_prob: f64, max_rounds: usize },
}

/// Seeded stop rule for one game
#[derive(Debug, Clone)]
pub struct HorizonPolicy {
    kind: HorizonKind,
    seed: u64,
    /// Completed rounds whose stop draw has been evaluated
    evaluated: usize,
    /// First round index that is not played
    stopped_at: Option<usize>,
    cap_hit: bool,
}

impl HorizonPolicy {
    /// Terminal after exactly `n_rounds` rounds
    pub fn fixed(n_rounds: usize, seed: u64) -> Self {
        Self::with_kind(HorizonKind::Fixed { n_rounds }, seed)
    }

    /// Stops after each round with probability `stop_prob`, capped at `max_rounds`
    pub fn geometric(stop_prob: f64, max_rounds: usize, seed: u64) -> Self {
        Self::with_kind(
            HorizonKind::Geometric {
                stop_prob,
                max_rounds,
            },
            seed,
        )
    }

    /// Build from (already validated) configuration
    pub fn from_config(config: &HorizonConfig, seed: u64) -> Self {
        match config {
            HorizonConfig::Fixed { n_rounds } => Self::fixed(*n_rounds, seed),
            HorizonConfig::Geometric {
                stop_prob,
                max_rounds,
            } => Self::geometric(*stop_prob, *max_rounds, seed),
        }
    }

    fn with_kind(kind: HorizonKind, seed: u64) -> Self {
        Self {
            kind,
            seed,
            evaluated: 0,
            stopped_at: None,
            cap_hit: false,
        }
    }

    /// Should the round with index `round_index` NOT be played?
    ///
    /// # Example
    /// ```
    /// use pdbench_core_rs::HorizonPolicy;
    ///
    /// let mut horizon = HorizonPolicy::fixed(3, 42);
    /// assert!(!horizon.should_stop(2));
    /// assert!(horizon.should_stop(3));
    /// ```
    pub fn should_stop(&mut self, round_index: usize) -> bool {
        let (stop_prob, max_rounds) = match self.kind {
            HorizonKind::Fixed { n_rounds } => return round_index >= n_rounds,
            HorizonKind::Geometric {
                stop_prob,
                max_rounds,
            } => (stop_prob, max_rounds),
        };

        if let Some(stopped_at) = self.stopped_at {
            return round_index >= stopped_at;
        }

        while self.evaluated < round_index && self.evaluated < max_rounds {
            let completed = self.evaluated;
            self.evaluated += 1;
            let mut rng = RngManager::new(split_seed(self.seed, completed as u64));
            if rng.chance(stop_prob) {
                self.stopped_at = Some(completed + 1);
                return true;
            }
        }

        if round_index >= max_rounds {
            self.stopped_at = Some(max_rounds);
            self.cap_hit = true;
            return true;
        }

        false
    }

    /// True when a geometric game ran into its safety cap
    /// ("never observed natural stop")
    pub fn cap_hit(&self) -> bool {
        self.cap_hit
    }

    /// Round index at which the game stopped, once known
    pub fn stopped_at(&self) -> Option<usize> {
        match self.kind {
            HorizonKind::Fixed { n_rounds } => Some(n_rounds),
            HorizonKind::Geometric { .. } => self.stopped_at,
        }
    }

    /// Metadata exposed to agents and written on every round record
    pub fn info(&self) -> HorizonInfo {
        match self.kind {
            HorizonKind::Fixed { n_rounds } => HorizonInfo::Fixed {
                total_rounds: n_rounds,
            },
            HorizonKind::Geometric { stop_prob, .. } => HorizonInfo::Geometric { stop_prob },
        }
    }
}
