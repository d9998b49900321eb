//! per-contest configuration.

use serde::{Deserialize, Serialize};

/// Immutable configuration for one contest instance.
///
/// Fixed when the contest actor is created; a running contest never
/// observes a config change.
#[derive(Debug, Clone, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct ContestConfig {
    /// Registrations required before the contest may start.
    pub min_players:             usize,
    /// Registrations accepted before the roster rejects with `RosterFull`.
    pub max_players:             usize,
    /// Number of scoring rounds per contest.
    pub total_rounds:            usize,
    /// Seconds each contestant has to act within a round.
    pub round_deadline_secs:     u64,
    /// Seconds the per-round leaderboard stays on screen between rounds.
    pub inter_round_display_secs: u64,
    /// Seconds counted down before round one and between rounds.
    pub countdown_secs:          u64,
    /// House commission taken off the pool before payout, in `[0, 1)`.
    pub commission_rate:         f64,
}

impl Default for ContestConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 8,
            total_rounds: 10,
            round_deadline_secs: 15,
            inter_round_display_secs: 5,
            countdown_secs: 3,
            commission_rate: 0.10,
        }
    }
}
