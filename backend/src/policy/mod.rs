//! Agent Module
//!
//! This module defines the decision-maker interface for both seats of a game.
//!
//! # Overview
//!
//! Each round, every agent receives an [`Observation`] built from the history
//! as of the end of the previous round and returns one [`Action`]. Agents never
//! see the opponent's current-round choice.
//!
//! # Agent Interface
//!
//! All agents implement the `Agent` trait:
//! ```rust
//! use pdbench_core_rs::policy::{Agent, Decision};
//! use pdbench_core_rs::models::Observation;
//! use pdbench_core_rs::Action;
//!
//! struct Contrarian;
//!
//! impl Agent for Contrarian {
//!     fn name(&self) -> &str {
//!         "contrarian"
//!     }
//!
//!     fn reset(&mut self, _seed: u64) {}
//!
//!     fn act(&mut self, obs: &Observation<'_>) -> Decision {
//!         let action = obs.last().map_or(Action::Cooperate, |h| h.opp_action.opposite());
//!         Decision::plain(action)
//!     }
//! }
//! ```
//!
//! # Available agents
//!
//! 1. **ALLC / ALLD**: constant output
//! 2. **TFT**: mirror the opponent's previous move
//! 3. **GTFT**: TFT that forgives a defection with probability `generous_prob`
//! 4. **GRIM**: cooperate until the opponent defects once, then defect forever
//! 5. **WSLS**: repeat after a win, switch after a loss
//! 6. **Provider-backed**: prompt → provider → Action Resolver
//!
//! Agents are built from configuration by [`create_agent`].

use crate::core::Action;
use crate::models::{DecisionTrace, Observation};
use crate::transcript::WindowSpec;

mod always;
mod factory;
mod grim;
mod llm;
mod tit_for_tat;
mod wsls;

pub use always::ConstantPolicy;
pub use factory::create_agent;
pub use grim::GrimTrigger;
pub use llm::LlmAgent;
pub use tit_for_tat::TitForTat;
pub use wsls::WinStayLoseShift;

/// One agent decision
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Prompts, raw replies and parse outcomes (provider-backed agents only)
    pub trace: Option<DecisionTrace>,
}

impl Decision {
    /// A decision with no provider trace
    pub fn plain(action: Action) -> Self {
        Self {
            action,
            trace: None,
        }
    }
}

/// Decision-maker for one seat
///
/// # Determinism
///
/// Any randomness must come from the seed passed to [`Agent::reset`]. The
/// engine calls `reset` once at the start of every game, so state is never
/// carried across replicates.
pub trait Agent: Send {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Clear internal state and reseed
    fn reset(&mut self, seed: u64);

    /// Choose an action for the round described by `obs`
    fn act(&mut self, obs: &Observation<'_>) -> Decision;

    /// Observation shape this agent wants
    fn window(&self) -> WindowSpec {
        WindowSpec::default()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::{Action, PayoffMatrix};
    use crate::models::{HorizonInfo, Observation, Round, Side};
    use chrono::{DateTime, Utc};

    /// Score a list of (a, b) actions into rounds
    pub fn rounds_from(actions: &[(Action, Action)]) -> Vec<Round> {
        let matrix = PayoffMatrix::standard();
        let (mut cum_a, mut cum_b) = (0.0, 0.0);
        actions
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| {
                let (pa, pb) = matrix.payoffs(a, b);
                cum_a += pa;
                cum_b += pb;
                Round {
                    round_index: i,
                    agent_a_action: a,
                    agent_b_action: b,
                    agent_a_payoff: pa,
                    agent_b_payoff: pb,
                    agent_a_cum_payoff: cum_a,
                    agent_b_cum_payoff: cum_b,
                    timestamp: DateTime::<Utc>::default(),
                    agent_a_trace: None,
                    agent_b_trace: None,
                }
            })
            .collect()
    }

    pub fn observation<'a>(rounds: &'a [Round], side: Side, matrix: &'a PayoffMatrix) -> Observation<'a> {
        crate::transcript::observe(
            rounds,
            side,
            10,
            matrix,
            HorizonInfo::Fixed { total_rounds: 100 },
            true,
        )
    }
}
