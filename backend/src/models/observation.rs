//! Agent-visible view of a game in progress
//!
//! An [`Observation`] lives for a single decision call. It borrows the
//! window of prior rounds and the payoff matrix; nothing is copied or mutated.

use super::round::{Round, Side};
use crate::core::{Action, PayoffMatrix};
use serde::{Deserialize, Serialize};

/// Horizon metadata shown to agents and written on round records
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HorizonInfo {
    Fixed { total_rounds: usize },
    Geometric { stop_prob: f64 },
}

impl HorizonInfo {
    pub fn horizon_type(&self) -> &'static str {
        match self {
            HorizonInfo::Fixed { .. } => "fixed",
            HorizonInfo::Geometric { .. } => "geometric",
        }
    }

    pub fn fixed_n(&self) -> Option<usize> {
        match self {
            HorizonInfo::Fixed { total_rounds } => Some(*total_rounds),
            HorizonInfo::Geometric { .. } => None,
        }
    }

    pub fn stop_prob(&self) -> Option<f64> {
        match self {
            HorizonInfo::Fixed { .. } => None,
            HorizonInfo::Geometric { stop_prob } => Some(*stop_prob),
        }
    }
}

/// One historical round relabelled from the observer's perspective
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub round_index: usize,
    pub my_action: Action,
    pub opp_action: Action,
    pub my_payoff: f64,
    pub opp_payoff: f64,
}

/// Per-agent, per-round view of the game
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    /// 0-based index of the round being decided
    pub round_index: usize,
    pub perspective: Side,
    /// Most recent prior rounds, oldest first
    pub window: &'a [Round],
    /// Cumulative payoffs through the previous round (None when hidden)
    pub my_cumulative: Option<f64>,
    pub opp_cumulative: Option<f64>,
    pub payoff_matrix: &'a PayoffMatrix,
    pub horizon: HorizonInfo,
}

impl<'a> Observation<'a> {
    /// 1-based round number, as shown to agents
    pub fn round_number(&self) -> usize {
        self.round_index + 1
    }

    pub fn is_first_round(&self) -> bool {
        self.window.is_empty()
    }

    /// The window relabelled as "mine" / "opponent's"
    pub fn history(&self) -> impl Iterator<Item = HistoryEntry> + 'a {
        let me = self.perspective;
        self.window.iter().map(move |round| entry(round, me))
    }

    /// The immediately preceding round, if any
    pub fn last(&self) -> Option<HistoryEntry> {
        self.window.last().map(|round| entry(round, self.perspective))
    }
}

fn entry(round: &Round, me: Side) -> HistoryEntry {
    HistoryEntry {
        round_index: round.round_index,
        my_action: round.action(me),
        opp_action: round.action(me.opponent()),
        my_payoff: round.payoff(me),
        opp_payoff: round.payoff(me.opponent()),
    }
}
