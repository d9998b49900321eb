//! contest actor: stake pool, round state machine, ranking, payout.
//!
//! Mirrors the lobby actor split: a clonable handle pushes commands over an
//! mpsc channel into one task that owns the engine, and a periodic tick
//! advances the phase machine against its single deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use diceroyale_core::config::ContestConfig;
use diceroyale_core::event::ServerEvent;
use diceroyale_core::identity::{PlayerId, PlayerIdentity};
use diceroyale_core::money::Coins;
use diceroyale_core::session::SessionKey;

mod engine;
mod payout;
mod ranking;
mod roster;

pub use engine::Engine;
pub use payout::{distribute, distributable_pool};
pub use ranking::{rank, tie_break_note, top_rows, RankedEntry};
pub use roster::{Contestant, RegistrationError, Roster};

const COMMAND_BUFFER: usize = 128;

/// Scheduler resolution for deadlines and per-second countdown broadcasts.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to one contest actor.
#[derive(Debug, Clone)]
pub struct Contest {
    commands_tx: mpsc::Sender<ContestCommand>,
    parked: Arc<AtomicBool>,
}

#[derive(Debug)]
enum ContestCommand {
    Register {
        identity: PlayerIdentity,
        stake: Coins,
        events_tx: mpsc::Sender<ServerEvent>,
        response_tx: oneshot::Sender<Result<(), RegistrationError>>,
    },
    SetReady(PlayerId),
    SubmitRoll(PlayerId),
    Start,
}

impl Contest {
    /// Spawns the actor task for a fresh contest instance.
    #[must_use]
    pub fn spawn(session_key: SessionKey, config: ContestConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let parked = Arc::new(AtomicBool::new(false));

        let mut task = ContestTask {
            engine: Engine::new(session_key.clone(), config),
            commands_rx,
            parked: parked.clone(),
        };
        tokio::spawn(async move {
            task.run().await;
            info!("contest {session_key} task stopped");
        });

        Self { commands_tx, parked }
    }

    /// Whether the actor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands_tx.is_closed()
    }

    /// True once the contest has run to completion and holds no
    /// contestants; the store may drop the handle, which stops the actor.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }

    /// Registers a contestant; policy errors come back to the caller.
    pub async fn register(
        &self,
        identity: PlayerIdentity,
        stake: Coins,
        events_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(), RegistrationError> {
        let (response_tx, response_rx) = oneshot::channel();
        let _ = self
            .commands_tx
            .send(ContestCommand::Register {
                identity,
                stake,
                events_tx,
                response_tx,
            })
            .await;
        // A vanished actor is a consistency fault: drop, don't error.
        response_rx.await.unwrap_or(Ok(()))
    }

    /// Marks a contestant ready to start.
    pub async fn set_ready(&self, player_id: PlayerId) {
        let _ = self
            .commands_tx
            .send(ContestCommand::SetReady(player_id))
            .await;
    }

    /// Submits the contestant's roll for the current round.
    pub async fn submit_roll(&self, player_id: PlayerId) {
        let _ = self
            .commands_tx
            .send(ContestCommand::SubmitRoll(player_id))
            .await;
    }

    /// External scheduling trigger: start once enough players registered.
    pub async fn request_start(&self) {
        let _ = self.commands_tx.send(ContestCommand::Start).await;
    }
}

struct ContestTask {
    engine: Engine,
    commands_rx: mpsc::Receiver<ContestCommand>,
    parked: Arc<AtomicBool>,
}

impl ContestTask {
    async fn run(&mut self) {
        let mut tick = time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => break,
                    }
                }
                _ = tick.tick() => self.engine.tick(Instant::now()).await,
            }
            self.parked.store(self.engine.is_spent(), Ordering::Relaxed);
        }
    }

    async fn handle(&mut self, command: ContestCommand) {
        let now = Instant::now();
        match command {
            ContestCommand::Register {
                identity,
                stake,
                events_tx,
                response_tx,
            } => {
                let result = self.engine.register(identity, stake, events_tx, now).await;
                let _ = response_tx.send(result);
            }
            ContestCommand::SetReady(player_id) => {
                self.engine.set_ready(&player_id, now).await;
            }
            ContestCommand::SubmitRoll(player_id) => {
                self.engine.submit_roll(&player_id, now).await;
            }
            ContestCommand::Start => self.engine.request_start(now).await,
        }
    }
}
