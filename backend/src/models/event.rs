//! Event logging for game replay and auditing.
//!
//! Captures the notable things that happen while one game runs, beyond the
//! round records themselves. Rounds are not events: the log grows with
//! retries and fallbacks, not with game length. Events enable:
//! - Debugging (why did an agent fall back? where did the horizon stop?)
//! - Auditing (every invalid provider reply is accounted for)
//! - Unit reports (the orchestrator summarises fallbacks and cap hits)
//!
//! # Example
//!
//! ```rust
//! use pdbench_core_rs::models::{GameEvent, Side};
//! use pdbench_core_rs::Action;
//!
//! let event = GameEvent::FallbackResolved {
//!     round_index: 10,
//!     side: Side::B,
//!     action: Action::Defect,
//!     attempts: 3,
//! };
//!
//! println!("Event at round {}: {:?}", event.round_index(), event);
//! ```

use super::round::Side;
use crate::core::Action;
use serde::{Deserialize, Serialize};

/// Game event capturing something worth auditing.
///
/// All events include a round index for temporal ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// A provider reply failed the output contract (will be retried if budget allows)
    InvalidResponse {
        round_index: usize,
        side: Side,
        attempt: usize,
        reason: String,
    },

    /// Every attempt failed; the fallback action was used
    FallbackResolved {
        round_index: usize,
        side: Side,
        action: Action,
        attempts: usize,
    },

    /// Geometric horizon reached its safety cap without a natural stop
    HorizonCapHit { round_index: usize },

    /// Game ended
    GameCompleted { rounds: usize },
}

impl GameEvent {
    /// Round the event belongs to
    ///
    /// `GameCompleted` reports the first round index that was not played.
    pub fn round_index(&self) -> usize {
        match self {
            GameEvent::InvalidResponse { round_index, .. } => *round_index,
            GameEvent::FallbackResolved { round_index, .. } => *round_index,
            GameEvent::HorizonCapHit { round_index } => *round_index,
            GameEvent::GameCompleted { rounds } => *rounds,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::InvalidResponse { .. } => "InvalidResponse",
            GameEvent::FallbackResolved { .. } => "FallbackResolved",
            GameEvent::HorizonCapHit { .. } => "HorizonCapHit",
            GameEvent::GameCompleted { .. } => "GameCompleted",
        }
    }

    /// Seat the event concerns, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            GameEvent::InvalidResponse { side, .. } => Some(*side),
            GameEvent::FallbackResolved { side, .. } => Some(*side),
            _ => None,
        }
    }
}

/// Event log for storing and querying game events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<GameEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Get events for a specific round
    pub fn events_at_round(&self, round_index: usize) -> Vec<&GameEvent> {
        self.events
            .iter()
            .filter(|e| e.round_index() == round_index)
            .collect()
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&GameEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events concerning one seat
    pub fn events_for_side(&self, side: Side) -> Vec<&GameEvent> {
        self.events
            .iter()
            .filter(|e| e.side() == Some(side))
            .collect()
    }

    /// Number of fallback resolutions per seat `(a, b)`
    pub fn fallback_counts(&self) -> (usize, usize) {
        self.events_of_type("FallbackResolved")
            .into_iter()
            .fold((0, 0), |(a, b), e| match e.side() {
                Some(Side::A) => (a + 1, b),
                Some(Side::B) => (a, b + 1),
                None => (a, b),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(round_index: usize, side: Side) -> GameEvent {
        GameEvent::InvalidResponse {
            round_index,
            side,
            attempt: 0,
            reason: "unrecognised token".to_string(),
        }
    }

    #[test]
    fn test_event_round_index() {
        assert_eq!(invalid(42, Side::A).round_index(), 42);
        assert_eq!(GameEvent::GameCompleted { rounds: 7 }.round_index(), 7);
    }

    #[test]
    fn test_event_type() {
        assert_eq!(invalid(1, Side::B).event_type(), "InvalidResponse");
        assert_eq!(
            GameEvent::HorizonCapHit { round_index: 100 }.event_type(),
            "HorizonCapHit"
        );
    }

    #[test]
    fn test_event_side() {
        assert_eq!(invalid(5, Side::A).side(), Some(Side::A));
        assert_eq!(GameEvent::HorizonCapHit { round_index: 5 }.side(), None);
    }

    #[test]
    fn test_event_log_basic() {
        let mut log = EventLog::new();

        assert_eq!(log.len(), 0);
        assert!(log.is_empty());

        log.log(GameEvent::GameCompleted { rounds: 3 });

        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_event_log_queries() {
        let mut log = EventLog::new();
        log.log(invalid(0, Side::A));
        log.log(invalid(1, Side::B));
        log.log(GameEvent::FallbackResolved {
            round_index: 1,
            side: Side::B,
            action: Action::Defect,
            attempts: 3,
        });
        log.log(GameEvent::GameCompleted { rounds: 2 });

        assert_eq!(log.events_at_round(1).len(), 2);
        assert_eq!(log.events_of_type("InvalidResponse").len(), 2);
        assert_eq!(log.events_for_side(Side::B).len(), 2);
        assert_eq!(log.events_for_side(Side::A).len(), 1);
        assert_eq!(log.fallback_counts(), (0, 1));
    }

    #[test]
    fn test_event_serialized_with_tag() {
        let value = serde_json::to_value(GameEvent::HorizonCapHit { round_index: 9 }).unwrap();
        assert_eq!(value["event"], "horizon_cap_hit");
        assert_eq!(value["round_index"], 9);
    }
}
