//! Core game primitives: actions, payoffs, horizons and the wall clock

pub mod action;
pub mod clock;
pub mod horizon;
pub mod payoff;

pub use action::Action;
pub use clock::{Clock, FixedClock, SystemClock};
pub use horizon::HorizonPolicy;
pub use payoff::PayoffMatrix;
