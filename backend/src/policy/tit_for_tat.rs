//! TFT and GTFT
//!
//! Cooperate on the first round, then mirror the opponent's previous move.
//! The generous variant forgives: when the mirrored move would be Defect it
//! cooperates instead with probability `generous_prob`, drawn from the
//! agent's seeded stream.

use super::{Agent, Decision};
use crate::core::Action;
use crate::models::Observation;
use crate::rng::RngManager;

pub struct TitForTat {
    /// Forgiveness probability; None for plain TFT
    generous_prob: Option<f64>,
    rng: RngManager,
}

impl TitForTat {
    pub fn new() -> Self {
        Self {
            generous_prob: None,
            rng: RngManager::new(0),
        }
    }

    /// GTFT with the given forgiveness probability
    pub fn generous(generous_prob: f64) -> Self {
        Self {
            generous_prob: Some(generous_prob),
            rng: RngManager::new(0),
        }
    }

    pub fn is_generous(&self) -> bool {
        self.generous_prob.is_some()
    }
}

impl Default for TitForTat {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for TitForTat {
    fn name(&self) -> &str {
        if self.is_generous() {
            "GTFT"
        } else {
            "TFT"
        }
    }

    fn reset(&mut self, seed: u64) {
        self.rng = RngManager::new(seed);
    }

    fn act(&mut self, obs: &Observation<'_>) -> Decision {
        let mirrored = obs.last().map_or(Action::Cooperate, |h| h.opp_action);
        if let (Action::Defect, Some(prob)) = (mirrored, self.generous_prob) {
            if self.rng.chance(prob) {
                return Decision::plain(Action::Cooperate);
            }
        }
        Decision::plain(mirrored)
    }
}
