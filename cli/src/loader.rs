//! YAML experiment loading
//!
//! Resolves the file-level conveniences of an experiment YAML before it is
//! handed to the typed configuration:
//!
//! - agent entries written as `{ ref: <file>, overrides: {...} }` are replaced
//!   by the referenced YAML with `overrides` deep-merged on top
//! - `prompting.system_prompt_path` / `prompting.round_prompt_path` /
//!   `prompting.persona_path` are read from disk into the matching inline field
//!
//! Relative paths resolve against the directory of the file that names them.
//! A missing file is a [`ConfigError`] naming the field that referenced it.

use anyhow::Context;
use pdbench_core_rs::{ConfigError, ExperimentConfig};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SEATS: [&str; 2] = ["agent_a", "agent_b"];

/// `*_path` key → inline key it fills
const PROMPT_FILES: [(&str, &str); 3] = [
    ("system_prompt_path", "system_prompt"),
    ("round_prompt_path", "round_template"),
    ("persona_path", "persona"),
];

/// Load, resolve and validate an experiment file
pub fn load_experiment(path: &Path) -> anyhow::Result<ExperimentConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let base = base_dir(path);
    let mut root: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    resolve_agents(&mut root, &base)?;

    let config: ExperimentConfig = serde_yaml::from_value(root)
        .with_context(|| format!("invalid experiment structure in {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn base_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_agents(root: &mut Value, base: &Path) -> anyhow::Result<()> {
    let Some(conditions) = root
        .get_mut("experiment")
        .and_then(|e| e.get_mut("conditions"))
        .and_then(Value::as_sequence_mut)
    else {
        return Ok(());
    };

    for (i, condition) in conditions.iter_mut().enumerate() {
        for seat in SEATS {
            let field = format!("experiment.conditions[{}].{}", i, seat);
            if let Some(agent) = condition.get_mut(seat) {
                let resolved = resolve_agent(agent.clone(), base, &field)?;
                *agent = resolved;
            }
        }
    }
    Ok(())
}

/// Resolve one agent entry: follow its `ref`, then inline its prompt files
fn resolve_agent(agent: Value, base: &Path, field: &str) -> anyhow::Result<Value> {
    let (mut agent, agent_base) = match agent.get("ref").cloned() {
        Some(reference) => {
            let reference = reference.as_str().ok_or_else(|| {
                ConfigError::invalid(format!("{}.ref", field), "must be a file path")
            })?;
            let ref_path = base.join(reference);
            let text = read_referenced(&ref_path, &format!("{}.ref", field))?;
            let referenced: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse agent file {}", ref_path.display()))?;

            let overrides = agent.get("overrides").cloned().unwrap_or(Value::Null);
            (merge_overrides(referenced, overrides), base_dir(&ref_path))
        }
        None => (agent, base.to_path_buf()),
    };

    if let Some(prompting) = agent.get_mut("prompting").and_then(Value::as_mapping_mut) {
        inline_prompt_files(prompting, &agent_base, &format!("{}.prompting", field))?;
    }
    Ok(agent)
}

fn inline_prompt_files(prompting: &mut Mapping, base: &Path, field: &str) -> anyhow::Result<()> {
    for (path_key, inline_key) in PROMPT_FILES {
        let Some(value) = prompting.remove(path_key) else {
            continue;
        };
        let key_field = format!("{}.{}", field, path_key);
        let relative = value
            .as_str()
            .ok_or_else(|| ConfigError::invalid(key_field.clone(), "must be a file path"))?;
        let text = read_referenced(&base.join(relative), &key_field)?;
        prompting.insert(
            Value::String(inline_key.to_string()),
            Value::String(text.trim_end().to_string()),
        );
    }
    Ok(())
}

fn read_referenced(path: &Path, field: &str) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map_err(|e| ConfigError::invalid(field, format!("cannot read {}: {}", path.display(), e)))
}

/// Deep-merge `overrides` onto `base`; mappings merge key by key, anything
/// else in `overrides` replaces the base value
pub fn merge_overrides(base: Value, overrides: Value) -> Value {
    match (base, overrides) {
        (base, Value::Null) => base,
        (Value::Mapping(mut base), Value::Mapping(overrides)) => {
            for (key, value) in overrides {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_overrides(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Mapping(base)
        }
        (_, overrides) => overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdbench_core_rs::config::{AgentSpec, PolicyKind};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    const EXPERIMENT: &str = r#"
run:
  seed: 7
horizon:
  type: fixed
  n_rounds: 20
experiment:
  replicates: 2
  conditions:
    - name: tft_vs_llm
      agent_a:
        type: policy
        policy: TFT
      agent_b:
        ref: agents/mock.yaml
        overrides:
          model: mock-override
          mock:
            fixed_output: D
"#;

    const MOCK_AGENT: &str = r#"
type: llm
provider: mock
model: mock-001
mock:
  mode: fixed
  fixed_output: C
  cooperate_prob: 0.7
prompting:
  system_prompt_path: ../prompts/system.txt
  history_window: 5
"#;

    #[test]
    fn test_load_with_ref_and_overrides() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "agents/mock.yaml", MOCK_AGENT);
        write(dir.path(), "prompts/system.txt", "Play the game.\n");
        let path = write(dir.path(), "experiment.yaml", EXPERIMENT);

        let config = load_experiment(&path).unwrap();
        assert_eq!(config.run.seed, 7);
        assert_eq!(config.experiment.replicates, 2);

        let condition = &config.experiment.conditions[0];
        match &condition.agent_a {
            AgentSpec::Policy(policy) => assert_eq!(policy.policy, PolicyKind::TitForTat),
            other => panic!("expected policy agent, got {:?}", other),
        }
        match &condition.agent_b {
            AgentSpec::Llm(llm) => {
                assert_eq!(llm.model, "mock-override");
                assert_eq!(llm.mock.fixed_output, "D");
                // Untouched keys of the referenced file survive the merge
                assert_eq!(llm.mock.cooperate_prob, 0.7);
                assert_eq!(llm.prompting.system_prompt, "Play the game.");
                assert_eq!(llm.prompting.history_window, 5);
            }
            other => panic!("expected llm agent, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_ref_names_field() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "experiment.yaml", EXPERIMENT);

        let err = load_experiment(&path).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(config_err.field(), "experiment.conditions[0].agent_b.ref");
    }

    #[test]
    fn test_missing_prompt_file_names_field() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "agents/mock.yaml", MOCK_AGENT);
        let path = write(dir.path(), "experiment.yaml", EXPERIMENT);

        let err = load_experiment(&path).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(
            config_err.field(),
            "experiment.conditions[0].agent_b.prompting.system_prompt_path"
        );
    }

    #[test]
    fn test_validation_runs_after_loading() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "experiment.yaml",
            r#"
run: {}
experiment:
  replicates: 0
  conditions:
    - name: c
      agent_a: { type: policy, policy: ALLC }
      agent_b: { type: policy, policy: ALLD }
"#,
        );

        let err = load_experiment(&path).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(config_err.field(), "experiment.replicates");
    }

    #[test]
    fn test_merge_overrides_nested() {
        let base: Value = serde_yaml::from_str("a: 1\nb: {c: 2, d: 3}").unwrap();
        let overrides: Value = serde_yaml::from_str("b: {d: 4}\ne: 5").unwrap();
        let expected: Value = serde_yaml::from_str("a: 1\nb: {c: 2, d: 4}\ne: 5").unwrap();
        assert_eq!(merge_overrides(base, overrides), expected);
    }
}
