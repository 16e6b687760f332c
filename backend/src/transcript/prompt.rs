//! Prompt fragments for provider-backed agents
//!
//! Round templates use named placeholders:
//! `{persona_text}`, `{payoff_table_text}`, `{round_number}`, `{horizon_text}`,
//! `{cumulative_totals_text}` and `{history_text}`. Anything else in braces is
//! left untouched.

use crate::models::{HorizonInfo, Observation};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are playing a repeated game against another player. \
Each round, both players simultaneously choose to Cooperate (C) or Defect (D). \
Respond with exactly one character: C or D.";

pub const DEFAULT_ROUND_TEMPLATE: &str = "{persona_text}

Payoffs:
{payoff_table_text}

This is round {round_number}{horizon_text}.

Cumulative totals:
{cumulative_totals_text}

History:
{history_text}

What is your move? Answer with C or D.";

/// Appended (after a blank line) to the round prompt when a reply was invalid
pub const CORRECTION_INSTRUCTION: &str = "Your previous response was invalid. \
Please respond with ONLY a single character: C or D. \
No explanation, no punctuation, just C or D.";

const NO_HISTORY: &str = "No history yet (this is the first round).";
const TOTALS_HIDDEN: &str = "Not shown.";

/// Windowed history, one line per round, 1-based round numbers
pub fn format_history(obs: &Observation<'_>) -> String {
    if obs.is_first_round() {
        return NO_HISTORY.to_string();
    }
    obs.history()
        .map(|h| {
            format!(
                "Round {}: You played {}, Opponent played {} -> You got {}, Opponent got {}",
                h.round_index + 1,
                h.my_action,
                h.opp_action,
                h.my_payoff,
                h.opp_payoff
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_cumulative_totals(obs: &Observation<'_>) -> String {
    match (obs.my_cumulative, obs.opp_cumulative) {
        (Some(mine), Some(theirs)) => format!(
            "Your cumulative payoff: {}\nOpponent's cumulative payoff: {}",
            mine, theirs
        ),
        _ => TOTALS_HIDDEN.to_string(),
    }
}

pub fn format_horizon(horizon: &HorizonInfo) -> String {
    match horizon {
        HorizonInfo::Fixed { total_rounds } => format!(" of {}", total_rounds),
        HorizonInfo::Geometric { .. } => " (game continues until stopped)".to_string(),
    }
}

/// Fill a round template from an observation
pub fn render_round_prompt(template: &str, persona: &str, obs: &Observation<'_>) -> String {
    let fills = [
        ("{persona_text}", persona.to_string()),
        (
            "{payoff_table_text}",
            obs.payoff_matrix.format_table(obs.perspective),
        ),
        ("{round_number}", obs.round_number().to_string()),
        ("{horizon_text}", format_horizon(&obs.horizon)),
        ("{cumulative_totals_text}", format_cumulative_totals(obs)),
        ("{history_text}", format_history(obs)),
    ];

    let mut prompt = template.to_string();
    for (placeholder, value) in fills.iter() {
        prompt = prompt.replace(placeholder, value);
    }
    prompt
}

/// Retry prompt: the original round context plus the correction instruction
pub fn correction_prompt(round_prompt: &str) -> String {
    format!("{}\n\n{}", round_prompt, CORRECTION_INSTRUCTION)
}
