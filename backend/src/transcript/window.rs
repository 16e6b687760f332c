use crate::config::DEFAULT_HISTORY_WINDOW;
use crate::core::PayoffMatrix;
use crate::models::{HorizonInfo, Observation, Round, Side};

/// Shape of the observation an agent asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Maximum number of prior rounds shown
    pub size: usize,
    /// Show cumulative payoffs
    pub include_totals: bool,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            size: DEFAULT_HISTORY_WINDOW,
            include_totals: true,
        }
    }
}

/// Build the observation for the round after `rounds_so_far`
///
/// The window holds at most `window_size` most recent rounds, oldest first
/// (all of them when fewer have been played). `perspective` decides which
/// side of each round reads as "mine". Pure: no I/O, no copies.
pub fn observe<'a>(
    rounds_so_far: &'a [Round],
    perspective: Side,
    window_size: usize,
    payoff_matrix: &'a PayoffMatrix,
    horizon: HorizonInfo,
    include_totals: bool,
) -> Observation<'a> {
    let start = rounds_so_far.len().saturating_sub(window_size);
    let window = &rounds_so_far[start..];

    let (my_cumulative, opp_cumulative) = if include_totals {
        let (mine, theirs) = rounds_so_far.last().map_or((0.0, 0.0), |last| {
            (
                last.cum_payoff(perspective),
                last.cum_payoff(perspective.opponent()),
            )
        });
        (Some(mine), Some(theirs))
    } else {
        (None, None)
    };

    Observation {
        round_index: rounds_so_far.len(),
        perspective,
        window,
        my_cumulative,
        opp_cumulative,
        payoff_matrix,
        horizon,
    }
}
