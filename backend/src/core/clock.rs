//! Wall clock used to timestamp rounds
//!
//! Timestamps are the only wall-clock input to a game. Injecting the clock
//! lets tests pin it and compare transcripts byte for byte.

use chrono::{DateTime, Utc};

/// Source of round timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real UTC time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Unix epoch
    pub fn epoch() -> Self {
        FixedClock(DateTime::<Utc>::default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
