//! Payoff Model
//!
//! Maps an ordered pair of actions to an ordered pair of payoffs. Built and
//! validated once per configuration, then shared read-only by every game.

use super::action::Action;
use crate::config::{ConfigError, PayoffMatrixConfig};
use crate::models::Side;

/// Immutable 2×2 payoff table
///
/// Entries are `(row_payoff, column_payoff)`: the first seat plays the row,
/// the second seat plays the column.
///
/// # Example
/// ```
/// use pdbench_core_rs::{Action, PayoffMatrix};
///
/// let matrix = PayoffMatrix::standard();
/// assert_eq!(matrix.payoffs(Action::Defect, Action::Cooperate), (5.0, 0.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffMatrix {
    cc: (f64, f64),
    cd: (f64, f64),
    dc: (f64, f64),
    dd: (f64, f64),
}

impl PayoffMatrix {
    /// Build from the four entries, rejecting non-finite payoffs
    pub fn new(
        cc: (f64, f64),
        cd: (f64, f64),
        dc: (f64, f64),
        dd: (f64, f64),
    ) -> Result<Self, ConfigError> {
        for (key, (row, col)) in [("C.C", cc), ("C.D", cd), ("D.C", dc), ("D.D", dd)] {
            if !row.is_finite() || !col.is_finite() {
                return Err(ConfigError::invalid(
                    key,
                    format!("payoffs must be finite, got [{}, {}]", row, col),
                ));
            }
        }
        Ok(Self { cc, cd, dc, dd })
    }

    /// The canonical Prisoner's Dilemma: T=5, R=3, P=1, S=0
    pub fn standard() -> Self {
        Self {
            cc: (3.0, 3.0),
            cd: (0.0, 5.0),
            dc: (5.0, 0.0),
            dd: (1.0, 1.0),
        }
    }

    /// Build from the nested `{row: {column: [row_payoff, column_payoff]}}` form
    ///
    /// Fails when an action key is missing or unknown, an entry is not a
    /// pair, or a payoff is not finite. Negative and non-zero-sum payoffs are valid.
    pub fn from_config(config: &PayoffMatrixConfig) -> Result<Self, ConfigError> {
        for (row_key, row) in config.0.iter() {
            if Action::from_token(row_key).is_none() {
                return Err(ConfigError::invalid(row_key.clone(), "unknown action key"));
            }
            for col_key in row.keys() {
                if Action::from_token(col_key).is_none() {
                    return Err(ConfigError::invalid(
                        format!("{}.{}", row_key, col_key),
                        "unknown action key",
                    ));
                }
            }
        }

        let entry = |row: Action, col: Action| -> Result<(f64, f64), ConfigError> {
            let field = format!("{}.{}", row, col);
            let values = config
                .0
                .get(row.token())
                .and_then(|r| r.get(col.token()))
                .ok_or_else(|| ConfigError::MissingField(field.clone()))?;
            match values.as_slice() {
                [row_payoff, col_payoff] => Ok((*row_payoff, *col_payoff)),
                other => Err(ConfigError::invalid(
                    field,
                    format!(
                        "expected [row_payoff, column_payoff], got {} value(s)",
                        other.len()
                    ),
                )),
            }
        };

        Self::new(
            entry(Action::Cooperate, Action::Cooperate)?,
            entry(Action::Cooperate, Action::Defect)?,
            entry(Action::Defect, Action::Cooperate)?,
            entry(Action::Defect, Action::Defect)?,
        )
    }

    /// Payoffs for (first seat, second seat)
    pub fn payoffs(&self, action_a: Action, action_b: Action) -> (f64, f64) {
        match (action_a, action_b) {
            (Action::Cooperate, Action::Cooperate) => self.cc,
            (Action::Cooperate, Action::Defect) => self.cd,
            (Action::Defect, Action::Cooperate) => self.dc,
            (Action::Defect, Action::Defect) => self.dd,
        }
    }

    /// Payoffs `(mine, opponent's)` as seen from `side`
    pub fn payoffs_for(&self, side: Side, mine: Action, theirs: Action) -> (f64, f64) {
        match side {
            Side::A => self.payoffs(mine, theirs),
            Side::B => {
                let (a, b) = self.payoffs(theirs, mine);
                (b, a)
            }
        }
    }

    /// Back to the nested config form
    pub fn to_config(&self) -> PayoffMatrixConfig {
        let mut config = PayoffMatrixConfig::empty();
        for row in Action::ALL {
            for col in Action::ALL {
                let (a, b) = self.payoffs(row, col);
                config
                    .0
                    .entry(row.token().to_string())
                    .or_default()
                    .insert(col.token().to_string(), vec![a, b]);
            }
        }
        config
    }

    /// Human-readable table from `side`'s point of view
    pub fn format_table(&self, side: Side) -> String {
        let mut lines = vec![
            "Your action | Opponent action | Your payoff | Opponent payoff".to_string(),
            "------------|-----------------|-------------|----------------".to_string(),
        ];
        for mine in Action::ALL {
            for theirs in Action::ALL {
                let (my_payoff, their_payoff) = self.payoffs_for(side, mine, theirs);
                lines.push(format!(
                    "     {}      |        {}        |      {}      |       {}",
                    mine, theirs, my_payoff, their_payoff
                ));
            }
        }
        lines.join("\n")
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::standard()
    }
}
