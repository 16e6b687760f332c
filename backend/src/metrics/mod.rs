//! Metrics Engine
//!
//! Pure functions of an ordered round sequence, plus per-replicate and
//! per-condition summaries. Everything here can be recomputed at any time
//! from persisted rounds; nothing depends on in-memory game state.
//!
//! # Edge cases
//!
//! - Empty sequence: cooperation rates are 0.0, time series empty, totals 0
//! - Conditional rates with an empty conditioning set are `None`
//! - `time_to_collapse` is `None` when no full window of `k` rounds
//!   reaches the threshold (including games shorter than `k`)

use crate::config::CollapseConfig;
use crate::core::Action;
use crate::models::{Round, Side};
use serde::{Deserialize, Serialize};

/// Read access to the parts of a round the metrics need
pub trait RoundView {
    fn action(&self, side: Side) -> Action;
    fn payoff(&self, side: Side) -> f64;
}

impl RoundView for Round {
    fn action(&self, side: Side) -> Action {
        Round::action(self, side)
    }

    fn payoff(&self, side: Side) -> f64 {
        Round::payoff(self, side)
    }
}

// ============================================================================
// Per-sequence metrics
// ============================================================================

fn cooperations<R: RoundView>(rounds: &[R], side: Side) -> usize {
    rounds
        .iter()
        .filter(|r| r.action(side).is_cooperate())
        .count()
}

/// Fraction of rounds in which `side` cooperated
pub fn cooperation_rate<R: RoundView>(rounds: &[R], side: Side) -> f64 {
    if rounds.is_empty() {
        return 0.0;
    }
    cooperations(rounds, side) as f64 / rounds.len() as f64
}

/// Fraction of all actions (both seats) that were Cooperate
pub fn pooled_cooperation_rate<R: RoundView>(rounds: &[R]) -> f64 {
    if rounds.is_empty() {
        return 0.0;
    }
    let total = cooperations(rounds, Side::A) + cooperations(rounds, Side::B);
    total as f64 / (2 * rounds.len()) as f64
}

/// Prefix-cumulative cooperation rate at each round index
///
/// `side = None` pools both seats.
pub fn cooperation_rate_over_time<R: RoundView>(rounds: &[R], side: Option<Side>) -> Vec<f64> {
    let mut cooperated = 0usize;
    rounds
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let (count, per_round) = match side {
                Some(s) => (r.action(s).is_cooperate() as usize, 1),
                None => (
                    r.action(Side::A).is_cooperate() as usize + r.action(Side::B).is_cooperate() as usize,
                    2,
                ),
            };
            cooperated += count;
            cooperated as f64 / ((i + 1) * per_round) as f64
        })
        .collect()
}

/// Among rounds t > 0 where the opponent defected at t-1: (responded with Defect, set size)
fn responses_to_defection<R: RoundView>(rounds: &[R], side: Side) -> (usize, usize) {
    let opponent = side.opponent();
    rounds
        .windows(2)
        .filter(|pair| pair[0].action(opponent) == Action::Defect)
        .fold((0, 0), |(retaliated, total), pair| {
            let defected = (pair[1].action(side) == Action::Defect) as usize;
            (retaliated + defected, total + 1)
        })
}

/// Share of opponent defections answered with Defect in the next round
pub fn retaliation_rate<R: RoundView>(rounds: &[R], side: Side) -> Option<f64> {
    match responses_to_defection(rounds, side) {
        (_, 0) => None,
        (retaliated, total) => Some(retaliated as f64 / total as f64),
    }
}

/// Share of opponent defections answered with Cooperate in the next round
pub fn forgiveness_rate<R: RoundView>(rounds: &[R], side: Side) -> Option<f64> {
    match responses_to_defection(rounds, side) {
        (_, 0) => None,
        (retaliated, total) => Some((total - retaliated) as f64 / total as f64),
    }
}

pub fn total_payoff<R: RoundView>(rounds: &[R], side: Side) -> f64 {
    rounds.iter().map(|r| r.payoff(side)).sum()
}

/// Opponent's total payoff minus `side`'s total payoff
pub fn exploitability_payoff_gap<R: RoundView>(rounds: &[R], side: Side) -> f64 {
    total_payoff(rounds, side.opponent()) - total_payoff(rounds, side)
}

/// First round index t where pooled cooperation over [t, t+k) is ≤ `threshold`
pub fn time_to_collapse<R: RoundView>(rounds: &[R], k: usize, threshold: f64) -> Option<usize> {
    if k == 0 || rounds.len() < k {
        return None;
    }
    rounds
        .windows(k)
        .position(|window| pooled_cooperation_rate(window) <= threshold)
}

// ============================================================================
// Replicate metrics
// ============================================================================

/// All metrics for one (condition, replicate) game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateMetrics {
    pub condition: String,
    pub replicate: usize,
    pub n_rounds: usize,
    pub cooperation_rate_a: f64,
    pub cooperation_rate_b: f64,
    pub cooperation_rate_pooled: f64,
    pub retaliation_rate_a: Option<f64>,
    pub retaliation_rate_b: Option<f64>,
    pub forgiveness_rate_a: Option<f64>,
    pub forgiveness_rate_b: Option<f64>,
    pub total_payoff_a: f64,
    pub total_payoff_b: f64,
    pub payoff_gap_a: f64,
    pub payoff_gap_b: f64,
    pub time_to_collapse: Option<usize>,
    /// Pooled prefix-cumulative cooperation rate
    pub cooperation_rate_over_time: Vec<f64>,
    pub cooperation_rate_over_time_a: Vec<f64>,
    pub cooperation_rate_over_time_b: Vec<f64>,
}

impl ReplicateMetrics {
    pub fn compute<R: RoundView>(
        condition: &str,
        replicate: usize,
        rounds: &[R],
        collapse: &CollapseConfig,
    ) -> Self {
        Self {
            condition: condition.to_string(),
            replicate,
            n_rounds: rounds.len(),
            cooperation_rate_a: cooperation_rate(rounds, Side::A),
            cooperation_rate_b: cooperation_rate(rounds, Side::B),
            cooperation_rate_pooled: pooled_cooperation_rate(rounds),
            retaliation_rate_a: retaliation_rate(rounds, Side::A),
            retaliation_rate_b: retaliation_rate(rounds, Side::B),
            forgiveness_rate_a: forgiveness_rate(rounds, Side::A),
            forgiveness_rate_b: forgiveness_rate(rounds, Side::B),
            total_payoff_a: total_payoff(rounds, Side::A),
            total_payoff_b: total_payoff(rounds, Side::B),
            payoff_gap_a: exploitability_payoff_gap(rounds, Side::A),
            payoff_gap_b: exploitability_payoff_gap(rounds, Side::B),
            time_to_collapse: time_to_collapse(rounds, collapse.k, collapse.threshold),
            cooperation_rate_over_time: cooperation_rate_over_time(rounds, None),
            cooperation_rate_over_time_a: cooperation_rate_over_time(rounds, Some(Side::A)),
            cooperation_rate_over_time_b: cooperation_rate_over_time(rounds, Some(Side::B)),
        }
    }
}

// ============================================================================
// Condition aggregates
// ============================================================================

/// Mean and sample standard deviation of one metric over replicates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    /// None with fewer than two values
    pub std: Option<f64>,
    pub n: usize,
}

impl Summary {
    /// Summarise the values; `None` when there are none
    pub fn of(values: &[f64]) -> Option<Summary> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(var.sqrt())
        } else {
            None
        };
        Some(Summary { mean, std, n })
    }

    fn of_defined(values: impl Iterator<Item = Option<f64>>) -> Option<Summary> {
        let defined: Vec<f64> = values.flatten().collect();
        Summary::of(&defined)
    }
}

/// Per-condition aggregate over its replicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionAggregate {
    pub condition: String,
    pub replicates: usize,
    pub n_rounds: Option<Summary>,
    pub cooperation_rate_a: Option<Summary>,
    pub cooperation_rate_b: Option<Summary>,
    pub cooperation_rate_pooled: Option<Summary>,
    pub retaliation_rate_a: Option<Summary>,
    pub retaliation_rate_b: Option<Summary>,
    pub forgiveness_rate_a: Option<Summary>,
    pub forgiveness_rate_b: Option<Summary>,
    pub total_payoff_a: Option<Summary>,
    pub total_payoff_b: Option<Summary>,
    pub payoff_gap_a: Option<Summary>,
    pub payoff_gap_b: Option<Summary>,
    /// Over replicates where collapse occurred
    pub time_to_collapse: Option<Summary>,
    pub collapsed_replicates: usize,
    /// Mean pooled cooperation rate per round index, over replicates that reached it
    pub cooperation_rate_over_time: Vec<f64>,
}

impl ConditionAggregate {
    pub fn from_replicates(condition: &str, replicates: &[ReplicateMetrics]) -> Self {
        let scalar = |f: fn(&ReplicateMetrics) -> f64| -> Option<Summary> {
            let values: Vec<f64> = replicates.iter().map(f).collect();
            Summary::of(&values)
        };
        let optional = |f: fn(&ReplicateMetrics) -> Option<f64>| -> Option<Summary> {
            Summary::of_defined(replicates.iter().map(f))
        };

        let longest = replicates.iter().map(|r| r.n_rounds).max().unwrap_or(0);
        let cooperation_rate_over_time = (0..longest)
            .map(|i| {
                let values: Vec<f64> = replicates
                    .iter()
                    .filter_map(|r| r.cooperation_rate_over_time.get(i).copied())
                    .collect();
                values.iter().sum::<f64>() / values.len() as f64
            })
            .collect();

        Self {
            condition: condition.to_string(),
            replicates: replicates.len(),
            n_rounds: scalar(|r| r.n_rounds as f64),
            cooperation_rate_a: scalar(|r| r.cooperation_rate_a),
            cooperation_rate_b: scalar(|r| r.cooperation_rate_b),
            cooperation_rate_pooled: scalar(|r| r.cooperation_rate_pooled),
            retaliation_rate_a: optional(|r| r.retaliation_rate_a),
            retaliation_rate_b: optional(|r| r.retaliation_rate_b),
            forgiveness_rate_a: optional(|r| r.forgiveness_rate_a),
            forgiveness_rate_b: optional(|r| r.forgiveness_rate_b),
            total_payoff_a: scalar(|r| r.total_payoff_a),
            total_payoff_b: scalar(|r| r.total_payoff_b),
            payoff_gap_a: scalar(|r| r.payoff_gap_a),
            payoff_gap_b: scalar(|r| r.payoff_gap_b),
            time_to_collapse: optional(|r| r.time_to_collapse.map(|t| t as f64)),
            collapsed_replicates: replicates
                .iter()
                .filter(|r| r.time_to_collapse.is_some())
                .count(),
            cooperation_rate_over_time,
        }
    }
}

/// The derived aggregate table of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    pub run_id: String,
    pub collapse: CollapseConfig,
    /// Keyed by (condition, replicate), in manifest order
    pub replicates: Vec<ReplicateMetrics>,
    /// Keyed by condition, in manifest order
    pub conditions: Vec<ConditionAggregate>,
}

impl AggregateTable {
    pub fn condition(&self, name: &str) -> Option<&ConditionAggregate> {
        self.conditions.iter().find(|c| c.condition == name)
    }

    pub fn replicate(&self, condition: &str, replicate: usize) -> Option<&ReplicateMetrics> {
        self.replicates
            .iter()
            .find(|r| r.condition == condition && r.replicate == replicate)
    }
}
