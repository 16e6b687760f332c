//! Experiment configuration
//!
//! Typed, serde-deserialisable form of an experiment: run settings, payoff
//! matrix, horizon, the condition×replicate matrix and metric parameters.
//! Defaults follow the benchmark's published settings.
//!
//! [`ExperimentConfig::validate`] is the single fail-fast gate: every
//! configuration error is reported with the dotted path of the offending
//! field before any game executes.

use crate::core::{Action, PayoffMatrix};
use crate::provider::MockConfig;
use crate::resolver::OutputFormat;
use crate::transcript::{DEFAULT_ROUND_TEMPLATE, DEFAULT_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

/// Observation window used when an agent does not configure one
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Safety cap for geometric horizons
pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

// ============================================================================
// Errors
// ============================================================================

/// Configuration error, raised before any game executes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("duplicate condition name `{0}`")]
    DuplicateCondition(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field
    pub fn field(&self) -> &str {
        match self {
            ConfigError::InvalidField { field, .. } => field,
            ConfigError::MissingField(field) => field,
            ConfigError::DuplicateCondition(_) => "experiment.conditions",
        }
    }

    /// Prefix the field path with the enclosing section
    pub fn within(self, prefix: &str) -> Self {
        match self {
            ConfigError::InvalidField { field, reason } => ConfigError::InvalidField {
                field: format!("{}.{}", prefix, field),
                reason,
            },
            ConfigError::MissingField(field) => {
                ConfigError::MissingField(format!("{}.{}", prefix, field))
            }
            other => other,
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Complete experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub run: RunSettings,

    #[serde(default)]
    pub game: GameSettings,

    #[serde(default)]
    pub horizon: HorizonConfig,

    pub experiment: ExperimentMatrix,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Run-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Run identifier; a UUID is generated when absent
    #[serde(default)]
    pub run_id: Option<String>,

    /// Global seed every unit seed is derived from
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Directory the run's manifest, rounds and aggregates are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Persist rendered prompts on round records
    #[serde(default = "default_true")]
    pub store_prompts: bool,

    /// Persist raw provider replies (the attempt log) on round records
    #[serde(default = "default_true")]
    pub store_raw_responses: bool,

    /// Worker threads for concurrent units (None = one per core)
    #[serde(default)]
    pub parallelism: Option<usize>,
}

fn default_seed() -> u64 {
    1337
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/runs")
}

fn default_true() -> bool {
    true
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            run_id: None,
            seed: default_seed(),
            output_dir: default_output_dir(),
            store_prompts: true,
            store_raw_responses: true,
            parallelism: None,
        }
    }
}

/// Game definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default)]
    pub payoff_matrix: PayoffMatrixConfig,
}

/// Nested payoff table: `{row: {column: [row_payoff, column_payoff]}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoffMatrixConfig(pub BTreeMap<String, BTreeMap<String, Vec<f64>>>);

impl PayoffMatrixConfig {
    pub fn empty() -> Self {
        PayoffMatrixConfig(BTreeMap::new())
    }
}

impl Default for PayoffMatrixConfig {
    fn default() -> Self {
        let mut rows = BTreeMap::new();
        rows.insert(
            "C".to_string(),
            BTreeMap::from([
                ("C".to_string(), vec![3.0, 3.0]),
                ("D".to_string(), vec![0.0, 5.0]),
            ]),
        );
        rows.insert(
            "D".to_string(),
            BTreeMap::from([
                ("C".to_string(), vec![5.0, 0.0]),
                ("D".to_string(), vec![1.0, 1.0]),
            ]),
        );
        PayoffMatrixConfig(rows)
    }
}

/// Horizon selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HorizonConfig {
    /// Exactly `n_rounds` rounds
    Fixed { n_rounds: usize },

    /// Stop after each round with probability `stop_prob`
    Geometric {
        stop_prob: f64,
        #[serde(default = "default_max_rounds")]
        max_rounds: usize,
    },
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

impl Default for HorizonConfig {
    fn default() -> Self {
        HorizonConfig::Fixed { n_rounds: 100 }
    }
}

/// The condition×replicate matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMatrix {
    #[serde(default = "default_replicates")]
    pub replicates: usize,

    pub conditions: Vec<ConditionConfig>,
}

fn default_replicates() -> usize {
    5
}

/// A named matchup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub name: String,
    pub agent_a: AgentSpec,
    pub agent_b: AgentSpec,
}

/// Metric parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub collapse: CollapseConfig,
}

/// Collapse detection: first window of `k` rounds whose pooled cooperation
/// rate is at or below `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollapseConfig {
    #[serde(default = "default_collapse_k")]
    pub k: usize,

    #[serde(default = "default_collapse_threshold", alias = "cooperation_threshold")]
    pub threshold: f64,
}

fn default_collapse_k() -> usize {
    10
}

fn default_collapse_threshold() -> f64 {
    0.2
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            k: default_collapse_k(),
            threshold: default_collapse_threshold(),
        }
    }
}

// ============================================================================
// Agent specifications
// ============================================================================

/// Which agent sits in a seat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentSpec {
    /// Fixed policy (ALLC, ALLD, TFT, GRIM, GTFT, WSLS)
    Policy(PolicyAgentConfig),

    /// Provider-backed agent
    Llm(LlmAgentConfig),
}

impl AgentSpec {
    /// Short label used in logs
    pub fn label(&self) -> String {
        match self {
            AgentSpec::Policy(config) => config.policy.name().to_string(),
            AgentSpec::Llm(config) => format!("llm:{}", config.model),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAgentConfig {
    pub policy: PolicyKind,

    #[serde(default)]
    pub policy_params: PolicyParams,
}

/// Fixed policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "ALLC")]
    AlwaysCooperate,
    #[serde(rename = "ALLD")]
    AlwaysDefect,
    #[serde(rename = "TFT")]
    TitForTat,
    #[serde(rename = "GRIM")]
    GrimTrigger,
    #[serde(rename = "GTFT")]
    GenerousTitForTat,
    #[serde(rename = "WSLS")]
    WinStayLoseShift,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::AlwaysCooperate => "ALLC",
            PolicyKind::AlwaysDefect => "ALLD",
            PolicyKind::TitForTat => "TFT",
            PolicyKind::GrimTrigger => "GRIM",
            PolicyKind::GenerousTitForTat => "GTFT",
            PolicyKind::WinStayLoseShift => "WSLS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyParams {
    /// GTFT: probability of forgiving a defection
    #[serde(default = "default_generous_prob")]
    pub generous_prob: f64,

    /// WSLS: own previous payoff at or above this counts as a win
    #[serde(default = "default_wsls_win_threshold")]
    pub wsls_win_threshold: f64,
}

fn default_generous_prob() -> f64 {
    0.1
}

fn default_wsls_win_threshold() -> f64 {
    3.0
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            generous_prob: default_generous_prob(),
            wsls_win_threshold: default_wsls_win_threshold(),
        }
    }
}

/// Provider-backed agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAgentConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub mock: MockConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub prompting: PromptingConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_model() -> String {
    "mock-001".to_string()
}

fn default_max_tokens() -> u32 {
    10
}

impl Default for LlmAgentConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            mock: MockConfig::default(),
            openai: OpenAiConfig::default(),
            prompting: PromptingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Mock,
    Openai,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Prompt fragments and observation shape for a provider-backed agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptingConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_round_template")]
    pub round_template: String,

    #[serde(default)]
    pub persona: String,

    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_true")]
    pub include_cumulative_totals: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_round_template() -> String {
    DEFAULT_ROUND_TEMPLATE.to_string()
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

impl Default for PromptingConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            round_template: default_round_template(),
            persona: String::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
            include_cumulative_totals: true,
        }
    }
}

/// Output contract and retry protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Additional attempts after the first invalid reply
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Action taken when every attempt fails
    #[serde(default = "default_fallback_action")]
    pub fallback_action: Action,

    /// Provider calls slower than this count as invalid
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> usize {
    2
}

fn default_fallback_action() -> Action {
    Action::Defect
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_retries: default_max_retries(),
            fallback_action: default_fallback_action(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ExperimentConfig {
    /// Validate the whole configuration, failing on the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(run_id) = &self.run.run_id {
            if run_id.trim().is_empty() {
                return Err(ConfigError::invalid("run.run_id", "must not be empty"));
            }
        }
        if self.run.parallelism == Some(0) {
            return Err(ConfigError::invalid("run.parallelism", "must be > 0"));
        }

        self.payoff_matrix()?;
        self.validate_horizon()?;
        self.metrics
            .collapse
            .validate()
            .map_err(|e| e.within("metrics.collapse"))?;

        if self.experiment.replicates == 0 {
            return Err(ConfigError::invalid("experiment.replicates", "must be > 0"));
        }
        if self.experiment.conditions.is_empty() {
            return Err(ConfigError::invalid(
                "experiment.conditions",
                "at least one condition is required",
            ));
        }

        let mut names = HashSet::new();
        for (i, condition) in self.experiment.conditions.iter().enumerate() {
            let prefix = format!("experiment.conditions[{}]", i);
            if condition.name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.name", prefix),
                    "must not be empty",
                ));
            }
            if !names.insert(condition.name.as_str()) {
                return Err(ConfigError::DuplicateCondition(condition.name.clone()));
            }
            condition
                .agent_a
                .validate()
                .map_err(|e| e.within(&format!("{}.agent_a", prefix)))?;
            condition
                .agent_b
                .validate()
                .map_err(|e| e.within(&format!("{}.agent_b", prefix)))?;
        }

        Ok(())
    }

    /// Build the validated payoff matrix
    pub fn payoff_matrix(&self) -> Result<PayoffMatrix, ConfigError> {
        PayoffMatrix::from_config(&self.game.payoff_matrix).map_err(|e| e.within("game.payoff_matrix"))
    }

    fn validate_horizon(&self) -> Result<(), ConfigError> {
        match &self.horizon {
            HorizonConfig::Fixed { n_rounds } => {
                if *n_rounds == 0 {
                    return Err(ConfigError::invalid("horizon.n_rounds", "must be > 0"));
                }
            }
            HorizonConfig::Geometric {
                stop_prob,
                max_rounds,
            } => {
                if !stop_prob.is_finite() || *stop_prob <= 0.0 || *stop_prob > 1.0 {
                    return Err(ConfigError::invalid(
                        "horizon.stop_prob",
                        format!("must be in (0, 1], got {}", stop_prob),
                    ));
                }
                if *max_rounds == 0 {
                    return Err(ConfigError::invalid("horizon.max_rounds", "must be > 0"));
                }
            }
        }
        Ok(())
    }
}

impl CollapseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::invalid("k", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::invalid(
                "threshold",
                format!("must be in [0, 1], got {}", self.threshold),
            ));
        }
        Ok(())
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("must be a probability in [0, 1], got {}", value),
        ));
    }
    Ok(())
}

impl AgentSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            AgentSpec::Policy(config) => {
                check_probability("policy_params.generous_prob", config.policy_params.generous_prob)?;
                if !config.policy_params.wsls_win_threshold.is_finite() {
                    return Err(ConfigError::invalid(
                        "policy_params.wsls_win_threshold",
                        "must be finite",
                    ));
                }
                Ok(())
            }
            AgentSpec::Llm(config) => config.validate(),
        }
    }
}

impl LlmAgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::invalid("temperature", "must be finite and >= 0"));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens", "must be > 0"));
        }
        if self.prompting.history_window == 0 {
            return Err(ConfigError::invalid("prompting.history_window", "must be > 0"));
        }
        if self.prompting.round_template.trim().is_empty() {
            return Err(ConfigError::invalid("prompting.round_template", "must not be empty"));
        }
        if self.output.timeout_ms == 0 {
            return Err(ConfigError::invalid("output.timeout_ms", "must be > 0"));
        }
        match self.provider {
            ProviderKind::Mock => self.mock.validate().map_err(|e| e.within("mock")),
            ProviderKind::Openai => {
                if self.openai.base_url.trim().is_empty() {
                    return Err(ConfigError::invalid("openai.base_url", "must not be empty"));
                }
                Ok(())
            }
        }
    }
}

impl MockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("cooperate_prob", self.cooperate_prob)
    }
}
