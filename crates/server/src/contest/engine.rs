//! Round timer and scoring state machine.
//!
//! One phase plus one deadline field, advanced by `tick(now)`. Transitions
//! overwrite the deadline, so cancelling a timer is free and nothing can
//! fire against torn-down state. All timing flows through the `now`
//! argument; tests drive the machine with synthetic instants.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use diceroyale_core::config::ContestConfig;
use diceroyale_core::event::ServerEvent;
use diceroyale_core::identity::{PlayerId, PlayerIdentity};
use diceroyale_core::money::Coins;
use diceroyale_core::session::SessionKey;

use super::payout;
use super::ranking::{self, RankedEntry};
use super::roster::{RegistrationError, Roster};

/// How long the "calculating" notice stays up before results go out.
const CALCULATING_DELAY: Duration = Duration::from_secs(2,);

/// Rows shown on the between-round and final leaderboards.
const LEADERBOARD_SIZE: usize = 5;

/// Phase of a contest instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
enum Phase {
    Idle,
    Loading,
    RoundActive,
    RoundSettling,
    Countdown,
    Calculating,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        match self {
            | Phase::Idle => write!(f, "Idle"),
            | Phase::Loading => write!(f, "Loading"),
            | Phase::RoundActive => write!(f, "RoundActive"),
            | Phase::RoundSettling => write!(f, "RoundSettling"),
            | Phase::Countdown => write!(f, "Countdown"),
            | Phase::Calculating => write!(f, "Calculating"),
            | Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Core state machine of one contest instance.
#[derive(Debug,)]
pub struct Engine {
    session_key: SessionKey,
    config: ContestConfig,
    phase: Phase,
    /// 1-based round in play; 0 outside rounds.
    round: usize,
    /// The single deadline of the current phase.
    deadline: Option<Instant,>,
    /// Last whole-second value broadcast for this phase.
    last_countdown: Option<u64,>,
    roster: Roster,
    rng: StdRng,
    start_requested: bool,
    contests_run: usize,
}

impl Engine {
    /// Creates an idle engine with an OS-seeded dice rng.
    #[must_use]
    pub fn new(session_key: SessionKey, config: ContestConfig,) -> Self {
        let rng = StdRng::from_os_rng();
        Self::with_rng(session_key, config, rng,)
    }

    /// Creates an idle engine with the given dice rng.
    #[must_use]
    pub fn with_rng(
        session_key: SessionKey, config: ContestConfig, rng: StdRng,
    ) -> Self {
        Self {
            session_key,
            config,
            phase: Phase::Idle,
            round: 0,
            deadline: None,
            last_countdown: None,
            roster: Roster::default(),
            rng,
            start_requested: false,
            contests_run: 0,
        }
    }

    /// Read access to the registered contestants.
    #[must_use]
    pub fn roster(&self,) -> &Roster {
        &self.roster
    }

    /// True once the contest has completed at least once and holds no
    /// contestants.
    #[must_use]
    pub fn is_spent(&self,) -> bool {
        self.phase == Phase::Idle
            && self.roster.is_empty()
            && self.contests_run > 0
    }

    /// Registers a contestant and starts the contest when the start
    /// condition is met.
    pub async fn register(
        &mut self, identity: PlayerIdentity, stake: Coins,
        events_tx: mpsc::Sender<ServerEvent,>, now: Instant,
    ) -> Result<(), RegistrationError,> {
        let running = self.phase != Phase::Idle;
        self.roster.register(
            identity.clone(),
            stake,
            events_tx,
            self.config.max_players,
            running,
        )?;
        info!(
            "contest {}: {} registered with stake {}",
            self.session_key, identity.display_name, stake
        );
        self.maybe_start(now,).await;
        Ok((),)
    }

    /// Marks a contestant ready; a no-op outside `Idle`.
    pub async fn set_ready(&mut self, player_id: &PlayerId, now: Instant,) {
        if self.phase != Phase::Idle {
            return;
        }
        let Some(contestant,) = self.roster.get_mut(player_id,) else {
            debug!(
                "contest {}: ready from unregistered player, dropped",
                self.session_key
            );
            return;
        };
        contestant.is_ready = true;
        self.maybe_start(now,).await;
    }

    /// External scheduling trigger.
    pub async fn request_start(&mut self, now: Instant,) {
        self.start_requested = true;
        self.maybe_start(now,).await;
    }

    async fn maybe_start(&mut self, now: Instant,) {
        if self.phase != Phase::Idle {
            return;
        }
        if self.roster.count() < self.config.min_players {
            return;
        }
        if !(self.start_requested || self.roster.all_ready()) {
            return;
        }
        self.enter_loading(now,).await;
    }

    /// Advances the phase machine; called on every scheduler tick.
    pub async fn tick(&mut self, now: Instant,) {
        let expired = self.deadline.is_some_and(|deadline| now >= deadline,);
        match self.phase {
            | Phase::Idle | Phase::Complete => {},
            | Phase::Loading | Phase::Countdown => {
                if expired {
                    let next = self.round + 1;
                    self.enter_round(next, now,).await;
                } else {
                    self.countdown_tick(now,).await;
                }
            },
            | Phase::RoundActive => {
                if expired {
                    self.close_round(now,).await;
                } else {
                    self.countdown_tick(now,).await;
                }
            },
            | Phase::RoundSettling => {
                if expired {
                    if self.round >= self.config.total_rounds {
                        self.enter_calculating(now,).await;
                    } else {
                        self.enter_countdown(now,).await;
                    }
                }
            },
            | Phase::Calculating => {
                if expired {
                    self.enter_complete().await;
                }
            },
        }
    }

    /// Resolves one contestant's roll for the current round.
    ///
    /// A second action in the same round is silently ignored: a replay is
    /// indistinguishable from a double-scoring attempt and neither earns
    /// an error broadcast.
    pub async fn submit_roll(&mut self, player_id: &PlayerId, now: Instant,) {
        if self.phase != Phase::RoundActive {
            debug!(
                "contest {}: roll outside an active round, dropped",
                self.session_key
            );
            return;
        }
        let round_index = self.round - 1;
        let Some(contestant,) = self.roster.get_mut(player_id,) else {
            debug!(
                "contest {}: roll from unregistered player, dropped",
                self.session_key
            );
            return;
        };
        if contestant.has_acted_this_round {
            return;
        }

        let dice: [u32; 2] = [
            self.rng.random_range(1..=6,),
            self.rng.random_range(1..=6,),
        ];
        let score = dice[0] + dice[1];

        contestant.has_acted_this_round = true;
        contestant.per_round_score[round_index] = score;
        contestant.total_score += score;
        let identity = contestant.identity.clone();
        let total = contestant.total_score;

        self.broadcast(ServerEvent::ActionResolving {
            player_id: identity.id.clone(),
        },)
            .await;
        if let Some(contestant,) = self.roster.get(player_id,) {
            contestant
                .send(ServerEvent::ActionResult {
                    dice,
                    round_score: score,
                },)
                .await;
        }
        self.broadcast(ServerEvent::ScoreUpdated {
            player_id: identity.id.clone(),
            total,
            message: Some(format!(
                "{} rolled {}",
                identity.display_name, score
            ),),
        },)
            .await;

        if self.roster.all_acted() {
            // Every action is in; close the round without waiting out the
            // deadline.
            self.enter_settling(now,).await;
        }
    }

    async fn enter_loading(&mut self, now: Instant,) {
        self.phase = Phase::Loading;
        info!(
            "contest {}: entering {} with {} contestants",
            self.session_key,
            self.phase,
            self.roster.count()
        );
        let total_rounds = self.config.total_rounds;
        for contestant in self.roster.iter_mut() {
            contestant.reset_for_contest(total_rounds,);
        }
        self.round = 0;
        self.arm_countdown(now,).await;
    }

    async fn enter_round(&mut self, round: usize, now: Instant,) {
        self.phase = Phase::RoundActive;
        self.round = round;
        for contestant in self.roster.iter_mut() {
            contestant.has_acted_this_round = false;
        }
        self.set_deadline(now, self.config.round_deadline_secs,);
        info!(
            "contest {}: round {} of {} open",
            self.session_key, round, self.config.total_rounds
        );
        self.broadcast(ServerEvent::RoundStarted {
            round_number: round,
            deadline_seconds: self.config.round_deadline_secs,
        },)
            .await;
    }

    /// Deadline expiry: every contestant who has not acted is recorded as
    /// zero for the round, with no further penalty.
    async fn close_round(&mut self, now: Instant,) {
        let round_index = self.round - 1;
        for contestant in self.roster.iter_mut() {
            if !contestant.has_acted_this_round {
                contestant.per_round_score[round_index] = 0;
                contestant.has_acted_this_round = true;
            }
        }
        self.enter_settling(now,).await;
    }

    async fn enter_settling(&mut self, now: Instant,) {
        self.phase = Phase::RoundSettling;
        self.set_deadline(now, self.config.inter_round_display_secs,);
        let ranked = self.ranked();
        self.broadcast(ServerEvent::RoundLeaderboard {
            top5: ranking::top_rows(&ranked, LEADERBOARD_SIZE,),
        },)
            .await;
    }

    async fn enter_countdown(&mut self, now: Instant,) {
        self.phase = Phase::Countdown;
        self.arm_countdown(now,).await;
    }

    async fn arm_countdown(&mut self, now: Instant,) {
        let seconds = self.config.countdown_secs;
        self.set_deadline(now, seconds,);
        self.broadcast(ServerEvent::NextRoundCountdown {
            seconds,
        },)
            .await;
    }

    async fn enter_calculating(&mut self, now: Instant,) {
        self.phase = Phase::Calculating;
        self.deadline = Some(now + CALCULATING_DELAY,);
        self.last_countdown = None;
        self.broadcast(ServerEvent::Calculating,).await;
    }

    /// Final ranking, payout and personalized result delivery, then a full
    /// reset: a finished contest does not persist.
    async fn enter_complete(&mut self,) {
        self.phase = Phase::Complete;
        let ranked = self.ranked();
        let leaderboard = ranking::top_rows(&ranked, LEADERBOARD_SIZE,);
        let note = ranking::tie_break_note(&ranked,);
        let pool = self.roster.total_pool();
        let payouts =
            payout::distribute(&ranked, pool, self.config.commission_rate,);

        for entry in &ranked {
            let Some(contestant,) = self.roster.get(&entry.identity.id,)
            else {
                continue;
            };
            let payout = payouts
                .get(&entry.identity.id,)
                .copied()
                .unwrap_or(Coins::ZERO,);
            contestant
                .send(ServerEvent::ContestComplete {
                    rank: entry.rank,
                    score: entry.total_score,
                    leaderboard: leaderboard.clone(),
                    tie_break_note: note.clone(),
                    payout,
                },)
                .await;
        }

        info!(
            "contest {}: complete, pool {} over {} contestants",
            self.session_key,
            pool,
            self.roster.count()
        );
        self.contests_run += 1;
        self.reset();
    }

    fn reset(&mut self,) {
        self.phase = Phase::Idle;
        self.round = 0;
        self.deadline = None;
        self.last_countdown = None;
        self.start_requested = false;
        self.roster.clear();
    }

    fn set_deadline(&mut self, now: Instant, secs: u64,) {
        self.deadline = Some(now + Duration::from_secs(secs,),);
        self.last_countdown = Some(secs,);
    }

    /// Broadcasts the whole-second countdown once per second.
    async fn countdown_tick(&mut self, now: Instant,) {
        let Some(deadline,) = self.deadline else {
            return;
        };
        let left = deadline.saturating_duration_since(now,).as_secs();
        if self.last_countdown == Some(left,) {
            return;
        }
        self.last_countdown = Some(left,);
        let event = match self.phase {
            | Phase::RoundActive => ServerEvent::DeadlineTick {
                seconds_left: left,
            },
            | _ => ServerEvent::NextRoundCountdown {
                seconds: left,
            },
        };
        self.broadcast(event,).await;
    }

    fn ranked(&self,) -> Vec<RankedEntry,> {
        ranking::rank(
            self.roster
                .iter()
                .map(|c| {
                    RankedEntry::new(
                        c.identity.clone(),
                        c.total_score,
                        c.per_round_score.clone(),
                    )
                },)
                .collect(),
        )
    }

    async fn broadcast(&self, event: ServerEvent,) {
        for contestant in self.roster.iter() {
            contestant.send(event.clone(),).await;
        }
    }
}
