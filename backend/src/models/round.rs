//! Round records and per-decision traces

use crate::core::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seat at the table: `A` plays the payoff matrix row, `B` the column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub fn opponent(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Field prefix used in persisted records
    pub fn label(&self) -> &'static str {
        match self {
            Side::A => "agent_a",
            Side::B => "agent_b",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one provider attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Reply parsed to a valid action
    Parsed { action: Action },
    /// Reply did not match the output contract
    Invalid { reason: String },
    /// Provider failed before returning text
    ProviderError { message: String },
    /// Provider replied after the configured deadline
    Timeout { timeout_ms: u64 },
}

impl AttemptOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, AttemptOutcome::Parsed { .. })
    }
}

/// One prompt/reply exchange inside the retry protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 0 for the initial request, 1.. for retries
    pub attempt: usize,
    pub prompt: String,
    pub raw_response: Option<String>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Everything that produced one provider-backed decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub system_prompt: String,
    pub attempts: Vec<AttemptRecord>,
    pub resolved_by_fallback: bool,
}

impl DecisionTrace {
    /// Prompt of the first attempt (the rendered round prompt)
    pub fn round_prompt(&self) -> Option<&str> {
        self.attempts.first().map(|a| a.prompt.as_str())
    }

    /// Number of attempts that did not yield an action
    pub fn invalid_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| !a.outcome.is_valid()).count()
    }
}

/// The atomic unit of game history
///
/// Immutable once appended. Fixed-policy decisions carry no trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_index: usize,
    pub agent_a_action: Action,
    pub agent_b_action: Action,
    pub agent_a_payoff: f64,
    pub agent_b_payoff: f64,
    pub agent_a_cum_payoff: f64,
    pub agent_b_cum_payoff: f64,
    pub timestamp: DateTime<Utc>,
    pub agent_a_trace: Option<DecisionTrace>,
    pub agent_b_trace: Option<DecisionTrace>,
}

impl Round {
    pub fn action(&self, side: Side) -> Action {
        match side {
            Side::A => self.agent_a_action,
            Side::B => self.agent_b_action,
        }
    }

    pub fn payoff(&self, side: Side) -> f64 {
        match side {
            Side::A => self.agent_a_payoff,
            Side::B => self.agent_b_payoff,
        }
    }

    pub fn cum_payoff(&self, side: Side) -> f64 {
        match side {
            Side::A => self.agent_a_cum_payoff,
            Side::B => self.agent_b_cum_payoff,
        }
    }

    pub fn trace(&self, side: Side) -> Option<&DecisionTrace> {
        match side {
            Side::A => self.agent_a_trace.as_ref(),
            Side::B => self.agent_b_trace.as_ref(),
        }
    }

    /// Whether `side`'s action came from the fallback policy
    pub fn resolved_by_fallback(&self, side: Side) -> bool {
        self.trace(side).map_or(false, |t| t.resolved_by_fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> Round {
        Round {
            round_index: 0,
            agent_a_action: Action::Defect,
            agent_b_action: Action::Cooperate,
            agent_a_payoff: 5.0,
            agent_b_payoff: 0.0,
            agent_a_cum_payoff: 5.0,
            agent_b_cum_payoff: 0.0,
            timestamp: DateTime::<Utc>::default(),
            agent_a_trace: None,
            agent_b_trace: Some(DecisionTrace {
                system_prompt: "sys".to_string(),
                attempts: vec![
                    AttemptRecord {
                        attempt: 0,
                        prompt: "p".to_string(),
                        raw_response: Some("maybe".to_string()),
                        outcome: AttemptOutcome::Invalid {
                            reason: "unrecognised token".to_string(),
                        },
                    },
                    AttemptRecord {
                        attempt: 1,
                        prompt: "p2".to_string(),
                        raw_response: Some("C".to_string()),
                        outcome: AttemptOutcome::Parsed {
                            action: Action::Cooperate,
                        },
                    },
                ],
                resolved_by_fallback: false,
            }),
        }
    }

    #[test]
    fn test_accessors_by_side() {
        let r = round();
        assert_eq!(r.action(Side::A), Action::Defect);
        assert_eq!(r.payoff(Side::B), 0.0);
        assert_eq!(r.cum_payoff(Side::A), 5.0);
        assert!(r.trace(Side::A).is_none());
        assert!(!r.resolved_by_fallback(Side::B));
    }

    #[test]
    fn test_trace_helpers() {
        let r = round();
        let trace = r.trace(Side::B).unwrap();
        assert_eq!(trace.round_prompt(), Some("p"));
        assert_eq!(trace.invalid_attempts(), 1);
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::A.opponent(), Side::B);
        assert_eq!(Side::B.opponent(), Side::A);
        assert_eq!(Side::B.to_string(), "agent_b");
    }

    #[test]
    fn test_attempt_outcome_flattened() {
        let json = serde_json::to_value(&round().agent_b_trace.unwrap().attempts[0]).unwrap();
        assert_eq!(json["outcome"], "invalid");
        assert_eq!(json["reason"], "unrecognised token");
    }
}
