//! ALLC / ALLD: constant output, observation ignored

use super::{Agent, Decision};
use crate::core::Action;
use crate::models::Observation;

pub struct ConstantPolicy {
    action: Action,
}

impl ConstantPolicy {
    pub fn always_cooperate() -> Self {
        Self {
            action: Action::Cooperate,
        }
    }

    pub fn always_defect() -> Self {
        Self {
            action: Action::Defect,
        }
    }
}

impl Agent for ConstantPolicy {
    fn name(&self) -> &str {
        match self.action {
            Action::Cooperate => "ALLC",
            Action::Defect => "ALLD",
        }
    }

    fn reset(&mut self, _seed: u64) {}

    fn act(&mut self, _obs: &Observation<'_>) -> Decision {
        Decision::plain(self.action)
    }
}
