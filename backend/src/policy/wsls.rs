//! WSLS (Pavlov): repeat the previous move after a win, switch after a loss
//!
//! A round is a win when the agent's own payoff is at or above `win_threshold`.

use super::{Agent, Decision};
use crate::core::Action;
use crate::models::Observation;

pub struct WinStayLoseShift {
    win_threshold: f64,
}

impl WinStayLoseShift {
    pub fn new(win_threshold: f64) -> Self {
        Self { win_threshold }
    }
}

impl Agent for WinStayLoseShift {
    fn name(&self) -> &str {
        "WSLS"
    }

    fn reset(&mut self, _seed: u64) {}

    fn act(&mut self, obs: &Observation<'_>) -> Decision {
        let action = match obs.last() {
            None => Action::Cooperate,
            Some(last) if last.my_payoff >= self.win_threshold => last.my_action,
            Some(last) => last.my_action.opposite(),
        };
        Decision::plain(action)
    }
}
