//! Contest roster and stake pool.

use thiserror::Error;
use tokio::sync::mpsc;

use diceroyale_core::event::ServerEvent;
use diceroyale_core::identity::{PlayerId, PlayerIdentity};
use diceroyale_core::money::Coins;

/// Policy errors rejected to a registering caller. State is unchanged
/// whenever one of these comes back.
#[derive(Debug, Error, PartialEq, Eq,)]
pub enum RegistrationError {
    /// Registration is closed while rounds are in progress.
    #[error("contest already running")]
    ContestAlreadyRunning,
    /// The roster reached its configured maximum.
    #[error("contest roster is full")]
    RosterFull,
    /// The offered stake differs from the table stake fixed by the first
    /// registration.
    #[error("stake {offered} does not match the table stake {required}")]
    StakeMismatch {
        /// Stake every contestant must commit.
        required: Coins,
        /// Stake the caller offered.
        offered:  Coins,
    },
}

/// One registered contestant.
#[derive(Debug,)]
pub struct Contestant {
    /// Stable identity from the auth collaborator.
    pub identity:             PlayerIdentity,
    /// Stake committed to the pool.
    pub stake:                Coins,
    /// Sum of all recorded round scores.
    pub total_score:          u32,
    /// Score per round, zero-filled to the full round count on start.
    pub per_round_score:      Vec<u32,>,
    /// Whether this contestant already rolled in the current round.
    pub has_acted_this_round: bool,
    /// Whether this contestant is ready to start.
    pub is_ready:             bool,
    events_tx:                mpsc::Sender<ServerEvent,>,
}

impl Contestant {
    fn new(
        identity: PlayerIdentity, stake: Coins,
        events_tx: mpsc::Sender<ServerEvent,>,
    ) -> Self {
        Self {
            identity,
            stake,
            total_score: 0,
            per_round_score: Vec::new(),
            has_acted_this_round: false,
            is_ready: false,
            events_tx,
        }
    }

    /// Delivers an event to this contestant's connection.
    pub async fn send(&self, event: ServerEvent,) {
        let _ = self.events_tx.send(event,).await;
    }

    /// Zeroes all scoring state for a starting contest.
    pub fn reset_for_contest(&mut self, total_rounds: usize,) {
        self.total_score = 0;
        self.per_round_score = vec![0; total_rounds];
        self.has_acted_this_round = false;
    }
}

/// Registered contestants in registration order, plus the uniform stake
/// they all committed.
#[derive(Debug, Default,)]
pub struct Roster {
    contestants: Vec<Contestant,>,
    required_stake: Option<Coins,>,
}

impl Roster {
    /// Registers a contestant, enforcing the roster and stake policy. The
    /// first successful registration fixes the required stake.
    pub fn register(
        &mut self, identity: PlayerIdentity, stake: Coins,
        events_tx: mpsc::Sender<ServerEvent,>, max_players: usize,
        running: bool,
    ) -> Result<(), RegistrationError,> {
        if running {
            return Err(RegistrationError::ContestAlreadyRunning,);
        }

        // A repeat registration for a known identity refreshes the
        // outbound channel (reconnect) and changes nothing else.
        if let Some(existing,) = self
            .contestants
            .iter_mut()
            .find(|c| c.identity.id == identity.id,)
        {
            if existing.stake != stake {
                return Err(RegistrationError::StakeMismatch {
                    required: existing.stake,
                    offered:  stake,
                },);
            }
            existing.events_tx = events_tx;
            return Ok((),);
        }

        if self.contestants.len() >= max_players {
            return Err(RegistrationError::RosterFull,);
        }

        match self.required_stake {
            | Some(required,) if required != stake => {
                return Err(RegistrationError::StakeMismatch {
                    required,
                    offered: stake,
                },);
            },
            | None => self.required_stake = Some(stake,),
            | _ => {},
        }

        self.contestants.push(Contestant::new(identity, stake, events_tx,),);
        Ok((),)
    }

    /// The pool is always recomputed from the live roster, never cached.
    #[must_use]
    pub fn total_pool(&self,) -> Coins {
        self.contestants
            .iter()
            .fold(Coins::ZERO, |acc, c| acc + c.stake,)
    }

    /// Stake fixed by the first registration, if any.
    #[must_use]
    pub fn required_stake(&self,) -> Option<Coins,> {
        self.required_stake
    }

    /// Number of registered contestants.
    #[must_use]
    pub fn count(&self,) -> usize {
        self.contestants.len()
    }

    /// Whether nobody is registered.
    #[must_use]
    pub fn is_empty(&self,) -> bool {
        self.contestants.is_empty()
    }

    /// Iterates contestants in registration order.
    pub fn iter(&self,) -> impl Iterator<Item = &Contestant,> {
        self.contestants.iter()
    }

    /// Mutably iterates contestants in registration order.
    pub fn iter_mut(&mut self,) -> impl Iterator<Item = &mut Contestant,> {
        self.contestants.iter_mut()
    }

    /// Looks a contestant up by identity.
    #[must_use]
    pub fn get(&self, id: &PlayerId,) -> Option<&Contestant,> {
        self.contestants.iter().find(|c| &c.identity.id == id,)
    }

    /// Mutably looks a contestant up by identity.
    pub fn get_mut(&mut self, id: &PlayerId,) -> Option<&mut Contestant,> {
        self.contestants.iter_mut().find(|c| &c.identity.id == id,)
    }

    /// Whether every registered contestant has marked ready.
    #[must_use]
    pub fn all_ready(&self,) -> bool {
        !self.contestants.is_empty()
            && self.contestants.iter().all(|c| c.is_ready,)
    }

    /// Whether every contestant has rolled in the current round.
    #[must_use]
    pub fn all_acted(&self,) -> bool {
        self.contestants.iter().all(|c| c.has_acted_this_round,)
    }

    /// Empties the roster; the next registration fixes a fresh stake.
    pub fn clear(&mut self,) {
        self.contestants.clear();
        self.required_stake = None;
    }
}
