//! Game Loop: one two-agent game from start to horizon termination
//!
//! ```text
//! Start → (per round: Observe → Act(a) → Act(b) → Score → Append) → horizon check → Terminal
//! ```
//!
//! Both agents observe the history as of the end of the previous round; the
//! second seat never sees the first seat's current choice. Whole rounds are
//! never retried (only provider replies are, inside the Action Resolver).

use crate::core::{Action, Clock, HorizonPolicy, PayoffMatrix};
use crate::models::{AttemptOutcome, DecisionTrace, EventLog, GameEvent, Round, Side};
use crate::policy::Agent;
use crate::rng::{derive_seed, SeedStream};
use crate::transcript::observe;

/// Seeds for one (condition, replicate) unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSeeds {
    pub horizon: u64,
    pub agent_a: u64,
    pub agent_b: u64,
}

impl UnitSeeds {
    /// Derive every stream of a unit from the run seed and the unit identity
    pub fn derive(run_seed: u64, condition: &str, replicate: usize) -> Self {
        Self {
            horizon: derive_seed(run_seed, condition, replicate, SeedStream::Horizon),
            agent_a: derive_seed(run_seed, condition, replicate, SeedStream::agent(Side::A)),
            agent_b: derive_seed(run_seed, condition, replicate, SeedStream::agent(Side::B)),
        }
    }
}

/// Everything a finished game produced
#[derive(Debug, Clone)]
pub struct GameOutcome {
    pub rounds: Vec<Round>,
    /// Geometric horizon ended at its safety cap
    pub horizon_cap_hit: bool,
    pub events: EventLog,
}

/// Sequential driver for a single game
///
/// # Determinism
///
/// Given the same agents, seeds and clock, the produced rounds are identical
/// across runs, threads and processes.
pub struct GameLoop<'a> {
    payoff_matrix: &'a PayoffMatrix,
    horizon: HorizonPolicy,
    agent_a: Box<dyn Agent>,
    agent_b: Box<dyn Agent>,
    clock: &'a dyn Clock,
    rounds: Vec<Round>,
    cum_a: f64,
    cum_b: f64,
    finished: bool,
    events: EventLog,
}

impl<'a> GameLoop<'a> {
    /// Set up a game; agents are reset with their `seeds`
    ///
    /// The horizon arrives already seeded (normally from `seeds.horizon`)
    /// and is used as given.
    pub fn new(
        payoff_matrix: &'a PayoffMatrix,
        horizon: HorizonPolicy,
        mut agent_a: Box<dyn Agent>,
        mut agent_b: Box<dyn Agent>,
        clock: &'a dyn Clock,
        seeds: UnitSeeds,
    ) -> Self {
        agent_a.reset(seeds.agent_a);
        agent_b.reset(seeds.agent_b);

        Self {
            payoff_matrix,
            horizon,
            agent_a,
            agent_b,
            clock,
            rounds: Vec::new(),
            cum_a: 0.0,
            cum_b: 0.0,
            finished: false,
            events: EventLog::new(),
        }
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn horizon_cap_hit(&self) -> bool {
        self.horizon.cap_hit()
    }

    /// Play the next round
    ///
    /// Returns `None` once the horizon has signalled stop.
    pub fn play_round(&mut self) -> Option<&Round> {
        if self.finished {
            return None;
        }

        let round_index = self.rounds.len();

        // STEP 1: HORIZON CHECK
        if self.horizon.should_stop(round_index) {
            self.finish(round_index);
            return None;
        }

        let horizon_info = self.horizon.info();

        // STEP 2: OBSERVE + ACT
        // Both observations are built from the same pre-round history
        let spec_a = self.agent_a.window();
        let obs_a = observe(
            &self.rounds,
            Side::A,
            spec_a.size,
            self.payoff_matrix,
            horizon_info,
            spec_a.include_totals,
        );
        let decision_a = self.agent_a.act(&obs_a);

        let spec_b = self.agent_b.window();
        let obs_b = observe(
            &self.rounds,
            Side::B,
            spec_b.size,
            self.payoff_matrix,
            horizon_info,
            spec_b.include_totals,
        );
        let decision_b = self.agent_b.act(&obs_b);

        // STEP 3: SCORE
        let (payoff_a, payoff_b) = self
            .payoff_matrix
            .payoffs(decision_a.action, decision_b.action);
        self.cum_a += payoff_a;
        self.cum_b += payoff_b;

        // STEP 4: TELEMETRY
        // Only retries and fallbacks; the rounds themselves are the record
        for (side, decision) in [(Side::A, &decision_a), (Side::B, &decision_b)] {
            if let Some(trace) = &decision.trace {
                self.log_trace(round_index, side, trace, decision.action);
            }
        }

        // STEP 5: APPEND
        self.rounds.push(Round {
            round_index,
            agent_a_action: decision_a.action,
            agent_b_action: decision_b.action,
            agent_a_payoff: payoff_a,
            agent_b_payoff: payoff_b,
            agent_a_cum_payoff: self.cum_a,
            agent_b_cum_payoff: self.cum_b,
            timestamp: self.clock.now(),
            agent_a_trace: decision_a.trace,
            agent_b_trace: decision_b.trace,
        });

        self.rounds.last()
    }

    /// Play until the horizon stops the game
    pub fn run_to_completion(mut self) -> GameOutcome {
        while self.play_round().is_some() {}
        self.into_outcome()
    }

    /// Consume the loop, keeping what it produced so far
    pub fn into_outcome(self) -> GameOutcome {
        GameOutcome {
            horizon_cap_hit: self.horizon.cap_hit(),
            rounds: self.rounds,
            events: self.events,
        }
    }

    fn log_trace(&mut self, round_index: usize, side: Side, trace: &DecisionTrace, action: Action) {
        for attempt in trace.attempts.iter() {
            let reason = match &attempt.outcome {
                AttemptOutcome::Parsed { .. } => continue,
                AttemptOutcome::Invalid { reason } => reason.clone(),
                AttemptOutcome::ProviderError { message } => message.clone(),
                AttemptOutcome::Timeout { timeout_ms } => format!("timed out after {} ms", timeout_ms),
            };
            self.events.log(GameEvent::InvalidResponse {
                round_index,
                side,
                attempt: attempt.attempt,
                reason,
            });
        }
        if trace.resolved_by_fallback {
            self.events.log(GameEvent::FallbackResolved {
                round_index,
                side,
                action,
                attempts: trace.attempts.len(),
            });
        }
    }

    fn finish(&mut self, round_index: usize) {
        self.finished = true;
        if self.horizon.cap_hit() {
            log::warn!(
                "geometric horizon reached its safety cap at round {} without a natural stop",
                round_index
            );
            self.events.log(GameEvent::HorizonCapHit { round_index });
        }
        self.events.log(GameEvent::GameCompleted {
            rounds: self.rounds.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixedClock;
    use crate::policy::{ConstantPolicy, GrimTrigger, TitForTat};

    fn seeds() -> UnitSeeds {
        UnitSeeds::derive(1337, "test", 0)
    }

    #[test]
    fn test_fixed_horizon_round_count() {
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let game = GameLoop::new(
            &matrix,
            HorizonPolicy::fixed(12, 0),
            Box::new(TitForTat::new()),
            Box::new(ConstantPolicy::always_defect()),
            &clock,
            seeds(),
        );
        let outcome = game.run_to_completion();

        assert_eq!(outcome.rounds.len(), 12);
        for (i, round) in outcome.rounds.iter().enumerate() {
            assert_eq!(round.round_index, i);
        }
        assert!(!outcome.horizon_cap_hit);
        assert_eq!(
            outcome.events.events(),
            &[GameEvent::GameCompleted { rounds: 12 }]
        );
    }

    #[test]
    fn test_horizon_used_with_its_own_seed() {
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let length = |seed: u64| {
            GameLoop::new(
                &matrix,
                HorizonPolicy::geometric(0.2, 1000, seed),
                Box::new(ConstantPolicy::always_cooperate()),
                Box::new(ConstantPolicy::always_cooperate()),
                &clock,
                seeds(),
            )
            .run_to_completion()
            .rounds
            .len()
        };

        for seed in [3, 77, seeds().horizon] {
            let mut standalone = HorizonPolicy::geometric(0.2, 1000, seed);
            let expected = (0..).find(|&i| standalone.should_stop(i)).unwrap();
            assert_eq!(length(seed), expected, "seed {}", seed);
        }

        let lengths: Vec<usize> = (0..10).map(length).collect();
        assert!(lengths.iter().any(|&l| l != lengths[0]), "lengths: {:?}", lengths);
    }

    #[test]
    fn test_cumulative_payoffs() {
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let outcome = GameLoop::new(
            &matrix,
            HorizonPolicy::fixed(4, 0),
            Box::new(ConstantPolicy::always_defect()),
            Box::new(ConstantPolicy::always_cooperate()),
            &clock,
            seeds(),
        )
        .run_to_completion();

        let last = outcome.rounds.last().unwrap();
        assert_eq!(last.agent_a_cum_payoff, 20.0);
        assert_eq!(last.agent_b_cum_payoff, 0.0);
    }

    #[test]
    fn test_agents_see_same_pre_round_history() {
        // GRIM only reacts to A's round-0 defection from round 1 on
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let outcome = GameLoop::new(
            &matrix,
            HorizonPolicy::fixed(3, 0),
            Box::new(ConstantPolicy::always_defect()),
            Box::new(GrimTrigger::new()),
            &clock,
            seeds(),
        )
        .run_to_completion();

        assert_eq!(outcome.rounds[0].agent_b_action, Action::Cooperate);
        assert_eq!(outcome.rounds[1].agent_b_action, Action::Defect);
    }

    #[test]
    fn test_play_round_after_finish() {
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let mut game = GameLoop::new(
            &matrix,
            HorizonPolicy::fixed(1, 0),
            Box::new(ConstantPolicy::always_cooperate()),
            Box::new(ConstantPolicy::always_cooperate()),
            &clock,
            seeds(),
        );
        assert!(game.play_round().is_some());
        assert!(game.play_round().is_none());
        assert!(game.is_finished());
        assert!(game.play_round().is_none());
        assert_eq!(game.rounds().len(), 1);
    }

    #[test]
    fn test_geometric_cap_flagged() {
        let matrix = PayoffMatrix::standard();
        let clock = FixedClock::epoch();
        let outcome = GameLoop::new(
            &matrix,
            HorizonPolicy::geometric(0.0, 30, 0),
            Box::new(ConstantPolicy::always_cooperate()),
            Box::new(ConstantPolicy::always_cooperate()),
            &clock,
            seeds(),
        )
        .run_to_completion();

        assert_eq!(outcome.rounds.len(), 30);
        assert!(outcome.horizon_cap_hit);
        assert_eq!(outcome.events.events_of_type("HorizonCapHit").len(), 1);
    }
}
