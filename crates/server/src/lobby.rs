//! lobby presence actor.
//!
//! One task per session key owns the lobby state; commands arrive over an
//! mpsc channel, so every mutation for a session is serialized while
//! independent sessions run in parallel.

use std::time::Duration;

use log::info;
use tokio::sync::mpsc;
use tokio::time;

use diceroyale_core::event::ServerEvent;
use diceroyale_core::identity::{ConnId, PlayerIdentity};
use diceroyale_core::session::SessionKey;

mod participant;
mod state;

pub use participant::Participant;
pub use state::LobbyState;

const COMMAND_BUFFER: usize = 128;

/// Self-check interval: marks participants with dead outbound channels as
/// disconnected, covering a leave event the transport lost.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to one lobby actor.
#[derive(Debug, Clone)]
pub struct Lobby {
    commands_tx: mpsc::Sender<LobbyCommand>,
}

#[derive(Debug)]
enum LobbyCommand {
    Join {
        conn_id: ConnId,
        identity: PlayerIdentity,
        events_tx: mpsc::Sender<ServerEvent>,
    },
    Leave(ConnId),
    SetReady(ConnId, bool),
    SetOnline(ConnId, bool),
    MarkContestStarted(bool),
    Chat(ConnId, String),
}

impl Lobby {
    /// Spawns the actor task for a fresh lobby.
    #[must_use]
    pub fn spawn(session_key: SessionKey) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let mut task = LobbyTask {
            state: LobbyState::new(session_key.clone()),
            commands_rx,
        };
        tokio::spawn(async move {
            task.run().await;
            info!("lobby {session_key} task stopped");
        });

        Self { commands_tx }
    }

    /// Whether the actor has stopped (lobby deserted and destroyed).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands_tx.is_closed()
    }

    /// Joins or reconnects a participant.
    pub async fn join(
        &self,
        conn_id: ConnId,
        identity: PlayerIdentity,
        events_tx: mpsc::Sender<ServerEvent>,
    ) {
        let _ = self
            .commands_tx
            .send(LobbyCommand::Join {
                conn_id,
                identity,
                events_tx,
            })
            .await;
    }

    /// Marks a participant disconnected.
    pub async fn leave(&self, conn_id: ConnId) {
        let _ = self.commands_tx.send(LobbyCommand::Leave(conn_id)).await;
    }

    /// Toggles a participant's ready state.
    pub async fn set_ready(&self, conn_id: ConnId, ready: bool) {
        let _ = self
            .commands_tx
            .send(LobbyCommand::SetReady(conn_id, ready))
            .await;
    }

    /// Tab-visibility heartbeat.
    pub async fn set_online(&self, conn_id: ConnId, online: bool) {
        let _ = self
            .commands_tx
            .send(LobbyCommand::SetOnline(conn_id, online))
            .await;
    }

    /// Latches the contest-started flag.
    pub async fn mark_contest_started(&self, started: bool) {
        let _ = self
            .commands_tx
            .send(LobbyCommand::MarkContestStarted(started))
            .await;
    }

    /// Appends a user chat message.
    pub async fn send_chat(&self, conn_id: ConnId, text: String) {
        let _ = self.commands_tx.send(LobbyCommand::Chat(conn_id, text)).await;
    }
}

struct LobbyTask {
    state: LobbyState,
    commands_rx: mpsc::Receiver<LobbyCommand>,
}

impl LobbyTask {
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
                _ = tick.tick() => self.state.sweep_dead_connections().await,
            }
            if self.state.is_deserted() {
                break;
            }
        }
    }

    async fn handle(&mut self, command: LobbyCommand) {
        match command {
            LobbyCommand::Join {
                conn_id,
                identity,
                events_tx,
            } => self.state.join(conn_id, identity, events_tx).await,
            LobbyCommand::Leave(conn_id) => self.state.leave(conn_id).await,
            LobbyCommand::SetReady(conn_id, ready) => {
                self.state.set_ready(conn_id, ready).await;
            }
            LobbyCommand::SetOnline(conn_id, online) => {
                self.state.set_online(conn_id, online).await;
            }
            LobbyCommand::MarkContestStarted(started) => {
                self.state.mark_contest_started(started).await;
            }
            LobbyCommand::Chat(conn_id, text) => {
                self.state.send_chat(conn_id, text).await;
            }
        }
    }
}
