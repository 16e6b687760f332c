//! The two moves of the Prisoner's Dilemma

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of {Cooperate, Defect}: the sole decision an agent makes per round.
///
/// Serialized as the single-character tokens `"C"` and `"D"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "C")]
    Cooperate,
    #[serde(rename = "D")]
    Defect,
}

impl Action {
    /// Both actions, Cooperate first
    pub const ALL: [Action; 2] = [Action::Cooperate, Action::Defect];

    /// Canonical single-character token
    pub fn token(&self) -> &'static str {
        match self {
            Action::Cooperate => "C",
            Action::Defect => "D",
        }
    }

    /// Look up an action by its canonical token (exact match, no normalisation)
    pub fn from_token(token: &str) -> Option<Action> {
        match token {
            "C" => Some(Action::Cooperate),
            "D" => Some(Action::Defect),
            _ => None,
        }
    }

    /// The other action
    pub fn opposite(&self) -> Action {
        match self {
            Action::Cooperate => Action::Defect,
            Action::Defect => Action::Cooperate,
        }
    }

    pub fn is_cooperate(&self) -> bool {
        matches!(self, Action::Cooperate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
