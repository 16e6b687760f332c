//! Build agents from configuration

use super::{Agent, ConstantPolicy, GrimTrigger, LlmAgent, TitForTat, WinStayLoseShift};
use crate::config::{AgentSpec, LlmAgentConfig, PolicyKind, ProviderKind};
use crate::provider::{MockProvider, Provider, ProviderError};

/// Instantiate the agent described by `spec`
///
/// The agent still has to be [`reset`](Agent::reset) with its unit seed
/// before the first round.
///
/// # Errors
///
/// Only provider construction can fail (e.g. a missing API key, or a provider
/// not compiled into this build).
pub fn create_agent(spec: &AgentSpec) -> Result<Box<dyn Agent>, ProviderError> {
    let agent: Box<dyn Agent> = match spec {
        AgentSpec::Policy(config) => match config.policy {
            PolicyKind::AlwaysCooperate => Box::new(ConstantPolicy::always_cooperate()),
            PolicyKind::AlwaysDefect => Box::new(ConstantPolicy::always_defect()),
            PolicyKind::TitForTat => Box::new(TitForTat::new()),
            PolicyKind::GenerousTitForTat => {
                Box::new(TitForTat::generous(config.policy_params.generous_prob))
            }
            PolicyKind::GrimTrigger => Box::new(GrimTrigger::new()),
            PolicyKind::WinStayLoseShift => {
                Box::new(WinStayLoseShift::new(config.policy_params.wsls_win_threshold))
            }
        },
        AgentSpec::Llm(config) => Box::new(LlmAgent::new(config, create_provider(config)?)),
    };
    Ok(agent)
}

fn create_provider(config: &LlmAgentConfig) -> Result<Box<dyn Provider>, ProviderError> {
    match config.provider {
        ProviderKind::Mock => Ok(Box::new(MockProvider::new(config.mock.clone(), 0))),
        ProviderKind::Openai => openai_provider(config),
    }
}

#[cfg(feature = "openai")]
fn openai_provider(config: &LlmAgentConfig) -> Result<Box<dyn Provider>, ProviderError> {
    use crate::provider::OpenAiProvider;
    use std::time::Duration;

    let provider = OpenAiProvider::new(
        &config.openai,
        &config.model,
        Duration::from_millis(config.output.timeout_ms),
    )?;
    Ok(Box::new(provider))
}

#[cfg(not(feature = "openai"))]
fn openai_provider(_config: &LlmAgentConfig) -> Result<Box<dyn Provider>, ProviderError> {
    Err(ProviderError::Unavailable("openai".to_string()))
}
