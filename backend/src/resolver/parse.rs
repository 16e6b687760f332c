use crate::core::Action;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output contract for provider replies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Exactly one token, `C` or `D` (trimmed, case-insensitive)
    #[default]
    SingleToken,
    /// The bare token, or `{"action": "C"}`
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("invalid output {0:?}: expected 'C' or 'D'")]
    Unrecognised(String),

    #[error("malformed JSON output: {0}")]
    MalformedJson(String),
}

/// Parse a raw reply under `format`
///
/// # Example
/// ```
/// use pdbench_core_rs::resolver::{parse_action, OutputFormat};
/// use pdbench_core_rs::Action;
///
/// assert_eq!(parse_action(" d ", OutputFormat::SingleToken).unwrap(), Action::Defect);
/// assert!(parse_action("Defect", OutputFormat::SingleToken).is_err());
/// ```
pub fn parse_action(raw: &str, format: OutputFormat) -> Result<Action, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    match format {
        OutputFormat::SingleToken => parse_token(trimmed),
        OutputFormat::Json => {
            if trimmed.starts_with('{') {
                parse_record(trimmed)
            } else {
                parse_token(trimmed)
            }
        }
    }
}

fn parse_token(token: &str) -> Result<Action, ParseError> {
    Action::from_token(&token.trim().to_uppercase())
        .ok_or_else(|| ParseError::Unrecognised(token.to_string()))
}

fn parse_record(text: &str) -> Result<Action, ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ParseError::MalformedJson("expected an object".to_string()))?;
    if object.len() != 1 {
        return Err(ParseError::MalformedJson(
            "expected exactly one field, \"action\"".to_string(),
        ));
    }
    match object.get("action").and_then(|v| v.as_str()) {
        Some(token) => parse_token(token),
        None => Err(ParseError::MalformedJson(
            "\"action\" must be a string".to_string(),
        )),
    }
}
