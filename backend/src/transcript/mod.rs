//! Transcript Window and prompt rendering
//!
//! [`observe`] builds the agent-visible [`Observation`](crate::models::Observation)
//! for one decision; the `prompt` helpers turn an observation into text for
//! provider-backed agents.

mod prompt;
mod window;

pub use prompt::{
    correction_prompt, format_cumulative_totals, format_history, format_horizon,
    render_round_prompt, CORRECTION_INSTRUCTION, DEFAULT_ROUND_TEMPLATE, DEFAULT_SYSTEM_PROMPT,
};
pub use window::{observe, WindowSpec};
