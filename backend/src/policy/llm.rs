//! Provider-backed agent
//!
//! Renders the system prompt and the round template (persona, payoff table,
//! round number, horizon, totals, windowed history), submits them through the
//! Action Resolver and returns the resolved action with its full trace.
//! Holds no game state of its own beyond what the observation carries.

use super::{Agent, Decision};
use crate::config::LlmAgentConfig;
use crate::models::Observation;
use crate::provider::Provider;
use crate::resolver::ActionResolver;
use crate::transcript::{render_round_prompt, WindowSpec};

pub struct LlmAgent {
    name: String,
    provider: Box<dyn Provider>,
    resolver: ActionResolver,
    system_prompt: String,
    round_template: String,
    persona: String,
    temperature: f64,
    max_tokens: u32,
    window: WindowSpec,
}

impl LlmAgent {
    pub fn new(config: &LlmAgentConfig, provider: Box<dyn Provider>) -> Self {
        Self {
            name: format!("llm:{}", config.model),
            provider,
            resolver: ActionResolver::from_config(&config.output),
            system_prompt: config.prompting.system_prompt.clone(),
            round_template: config.prompting.round_template.clone(),
            persona: config.prompting.persona.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            window: WindowSpec {
                size: config.prompting.history_window,
                include_totals: config.prompting.include_cumulative_totals,
            },
        }
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self, seed: u64) {
        self.provider.reset(seed);
    }

    fn act(&mut self, obs: &Observation<'_>) -> Decision {
        let round_prompt = render_round_prompt(&self.round_template, &self.persona, obs);
        let resolution = self.resolver.resolve(
            self.provider.as_mut(),
            &self.system_prompt,
            &round_prompt,
            self.temperature,
            self.max_tokens,
        );
        Decision {
            action: resolution.action,
            trace: Some(resolution.trace),
        }
    }

    fn window(&self) -> WindowSpec {
        self.window
    }
}
