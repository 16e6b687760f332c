//! Persisted round schema

use crate::core::Action;
use crate::metrics::RoundView;
use crate::models::{AttemptOutcome, HorizonInfo, Round, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields every persisted round must carry
pub const REQUIRED_ROUND_FIELDS: &[&str] = &[
    "run_id",
    "condition",
    "replicate",
    "round_index",
    "agent_a_action",
    "agent_b_action",
    "agent_a_payoff",
    "agent_b_payoff",
    "agent_a_cum_payoff",
    "agent_b_cum_payoff",
    "horizon_type",
    "timestamp",
];

/// Fields every persisted manifest must carry
pub const REQUIRED_MANIFEST_FIELDS: &[&str] = &[
    "run_id",
    "seed",
    "config_hash",
    "config",
    "environment",
    "collapse",
    "started_at",
];

/// Fields every persisted unit outcome must carry
pub const REQUIRED_UNIT_FIELDS: &[&str] = &["condition", "replicate", "partition", "status"];

/// Per-seat pair of optional logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SeatLogs<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_a: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_b: Option<T>,
}

impl<T> SeatLogs<T> {
    fn from_round(round: &Round, f: impl Fn(&crate::models::DecisionTrace) -> T) -> Option<Self> {
        let agent_a = round.trace(Side::A).map(&f);
        let agent_b = round.trace(Side::B).map(&f);
        if agent_a.is_none() && agent_b.is_none() {
            None
        } else {
            Some(Self { agent_a, agent_b })
        }
    }
}

/// Prompts sent for one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptLog {
    pub system: String,
    /// One per attempt; index 0 is the round prompt
    pub attempts: Vec<String>,
}

/// One raw provider reply and how it was judged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLog {
    pub attempt: usize,
    pub raw_response: Option<String>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Identity and logging flags shared by every record of a unit
#[derive(Debug, Clone, PartialEq)]
pub struct RecordContext {
    pub run_id: String,
    pub condition: String,
    pub replicate: usize,
    pub horizon: HorizonInfo,
    pub store_prompts: bool,
    pub store_raw_responses: bool,
}

/// One round as persisted, keyed by (run, condition, replicate, round_index)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub run_id: String,
    pub condition: String,
    pub replicate: usize,
    pub round_index: usize,
    pub agent_a_action: Action,
    pub agent_b_action: Action,
    pub agent_a_payoff: f64,
    pub agent_b_payoff: f64,
    pub agent_a_cum_payoff: f64,
    pub agent_b_cum_payoff: f64,
    pub horizon_type: String,
    #[serde(default)]
    pub fixed_n: Option<usize>,
    #[serde(default)]
    pub stop_prob: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub agent_a_fallback: bool,
    #[serde(default)]
    pub agent_b_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<SeatLogs<PromptLog>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_responses: Option<SeatLogs<Vec<ResponseLog>>>,
}

impl RoundRecord {
    pub fn from_round(round: &Round, ctx: &RecordContext) -> Self {
        let prompts = if ctx.store_prompts {
            SeatLogs::from_round(round, |trace| PromptLog {
                system: trace.system_prompt.clone(),
                attempts: trace.attempts.iter().map(|a| a.prompt.clone()).collect(),
            })
        } else {
            None
        };
        let raw_responses = if ctx.store_raw_responses {
            SeatLogs::from_round(round, |trace| {
                trace
                    .attempts
                    .iter()
                    .map(|a| ResponseLog {
                        attempt: a.attempt,
                        raw_response: a.raw_response.clone(),
                        outcome: a.outcome.clone(),
                    })
                    .collect()
            })
        } else {
            None
        };

        Self {
            run_id: ctx.run_id.clone(),
            condition: ctx.condition.clone(),
            replicate: ctx.replicate,
            round_index: round.round_index,
            agent_a_action: round.agent_a_action,
            agent_b_action: round.agent_b_action,
            agent_a_payoff: round.agent_a_payoff,
            agent_b_payoff: round.agent_b_payoff,
            agent_a_cum_payoff: round.agent_a_cum_payoff,
            agent_b_cum_payoff: round.agent_b_cum_payoff,
            horizon_type: ctx.horizon.horizon_type().to_string(),
            fixed_n: ctx.horizon.fixed_n(),
            stop_prob: ctx.horizon.stop_prob(),
            timestamp: round.timestamp,
            agent_a_fallback: round.resolved_by_fallback(Side::A),
            agent_b_fallback: round.resolved_by_fallback(Side::B),
            prompts,
            raw_responses,
        }
    }

    /// Cross-field checks serde cannot express
    pub fn check(&self) -> Result<(), String> {
        match self.horizon_type.as_str() {
            "fixed" if self.fixed_n.is_none() => {
                Err("fixed horizon record without fixed_n".to_string())
            }
            "geometric" if self.stop_prob.is_none() => {
                Err("geometric horizon record without stop_prob".to_string())
            }
            "fixed" | "geometric" => Ok(()),
            other => Err(format!("unknown horizon_type {:?}", other)),
        }
    }
}

impl RoundView for RoundRecord {
    fn action(&self, side: Side) -> Action {
        match side {
            Side::A => self.agent_a_action,
            Side::B => self.agent_b_action,
        }
    }

    fn payoff(&self, side: Side) -> f64 {
        match side {
            Side::A => self.agent_a_payoff,
            Side::B => self.agent_b_payoff,
        }
    }
}

/// First required field missing from a JSON object, if any
pub fn missing_field<'f>(value: &serde_json::Value, required: &[&'f str]) -> Option<&'f str> {
    let object = value.as_object();
    required
        .iter()
        .copied()
        .find(|field| object.map_or(true, |o| !o.contains_key(*field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptRecord, DecisionTrace};

    fn round_with_trace() -> Round {
        Round {
            round_index: 3,
            agent_a_action: Action::Cooperate,
            agent_b_action: Action::Defect,
            agent_a_payoff: 0.0,
            agent_b_payoff: 5.0,
            agent_a_cum_payoff: 9.0,
            agent_b_cum_payoff: 14.0,
            timestamp: DateTime::<Utc>::default(),
            agent_a_trace: None,
            agent_b_trace: Some(DecisionTrace {
                system_prompt: "sys".to_string(),
                attempts: vec![AttemptRecord {
                    attempt: 0,
                    prompt: "round 4".to_string(),
                    raw_response: Some("D".to_string()),
                    outcome: AttemptOutcome::Parsed {
                        action: Action::Defect,
                    },
                }],
                resolved_by_fallback: false,
            }),
        }
    }

    fn ctx(store_prompts: bool, store_raw_responses: bool) -> RecordContext {
        RecordContext {
            run_id: "run".to_string(),
            condition: "c".to_string(),
            replicate: 1,
            horizon: HorizonInfo::Fixed { total_rounds: 10 },
            store_prompts,
            store_raw_responses,
        }
    }

    #[test]
    fn test_logging_flags_are_independent() {
        let round = round_with_trace();

        let both = RoundRecord::from_round(&round, &ctx(true, true));
        assert_eq!(both.prompts.as_ref().unwrap().agent_b.as_ref().unwrap().attempts, vec!["round 4"]);
        assert!(both.prompts.as_ref().unwrap().agent_a.is_none());
        assert_eq!(both.raw_responses.as_ref().unwrap().agent_b.as_ref().unwrap().len(), 1);

        let prompts_only = RoundRecord::from_round(&round, &ctx(true, false));
        assert!(prompts_only.prompts.is_some());
        assert!(prompts_only.raw_responses.is_none());

        let neither = RoundRecord::from_round(&round, &ctx(false, false));
        let json = serde_json::to_value(&neither).unwrap();
        assert!(json.get("prompts").is_none());
        assert!(json.get("raw_responses").is_none());
    }

    #[test]
    fn test_horizon_fields() {
        let record = RoundRecord::from_round(&round_with_trace(), &ctx(false, false));
        assert_eq!(record.horizon_type, "fixed");
        assert_eq!(record.fixed_n, Some(10));
        assert_eq!(record.stop_prob, None);
        assert!(record.check().is_ok());
    }

    #[test]
    fn test_missing_field_detection() {
        let record = RoundRecord::from_round(&round_with_trace(), &ctx(false, false));
        let mut json = serde_json::to_value(&record).unwrap();
        assert_eq!(missing_field(&json, REQUIRED_ROUND_FIELDS), None);

        json.as_object_mut().unwrap().remove("agent_b_payoff");
        assert_eq!(missing_field(&json, REQUIRED_ROUND_FIELDS), Some("agent_b_payoff"));
    }

    #[test]
    fn test_check_rejects_inconsistent_horizon() {
        let mut record = RoundRecord::from_round(&round_with_trace(), &ctx(false, false));
        record.horizon_type = "geometric".to_string();
        assert!(record.check().is_err());
        record.horizon_type = "spiral".to_string();
        assert!(record.check().is_err());
    }
}
