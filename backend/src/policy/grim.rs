//! GRIM trigger: cooperate until the opponent defects once, then defect forever

use super::{Agent, Decision};
use crate::core::Action;
use crate::models::Observation;

#[derive(Default)]
pub struct GrimTrigger {
    triggered: bool,
}

impl GrimTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

impl Agent for GrimTrigger {
    fn name(&self) -> &str {
        "GRIM"
    }

    fn reset(&mut self, _seed: u64) {
        self.triggered = false;
    }

    fn act(&mut self, obs: &Observation<'_>) -> Decision {
        if !self.triggered && obs.history().any(|h| h.opp_action == Action::Defect) {
            self.triggered = true;
        }
        if self.triggered {
            Decision::plain(Action::Defect)
        } else {
            Decision::plain(Action::Cooperate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PayoffMatrix;
    use crate::models::Side;
    use crate::policy::test_support::{observation, rounds_from};
    use Action::{Cooperate as C, Defect as D};

    #[test]
    fn test_trigger_is_permanent() {
        let matrix = PayoffMatrix::standard();
        let mut grim = GrimTrigger::new();

        let before = rounds_from(&[(C, C), (C, C)]);
        assert_eq!(grim.act(&observation(&before, Side::A, &matrix)).action, C);

        let defected = rounds_from(&[(C, C), (C, D)]);
        assert_eq!(grim.act(&observation(&defected, Side::A, &matrix)).action, D);

        // Defection has scrolled out of any window; trigger still holds
        let later = rounds_from(&[(D, C)]);
        assert_eq!(grim.act(&observation(&later, Side::A, &matrix)).action, D);
        assert!(grim.is_triggered());

        grim.reset(0);
        assert!(!grim.is_triggered());
    }
}
