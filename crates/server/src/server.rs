//! websocket gateway: accept loop and per-connection handling.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use diceroyale_core::config::ContestConfig;
use diceroyale_core::event::{ClientEvent, ServerEvent};
use diceroyale_core::identity::{ConnId, PlayerIdentity};
use diceroyale_core::session::SessionKey;

use crate::store::SessionStore;

/// Outbound event buffer per connection; slow clients drop the connection
/// rather than the session.
const OUTBOUND_BUFFER: usize = 128;

/// Gateway configuration assembled by the binary.
#[derive(Debug)]
pub struct ServerConfig {
    /// Listening address.
    pub address: String,
    /// Listening port.
    pub port: u16,
    /// Configuration applied to every contest instance.
    pub contest: ContestConfig,
}

/// Binds the listener and serves until ctrl-c.
pub async fn run(config: ServerConfig) -> Result<()> {
    if !(0.0..1.0).contains(&config.contest.commission_rate) {
        bail!("commission rate must be in [0, 1)");
    }
    if config.contest.min_players > config.contest.max_players {
        bail!("min players exceeds max players");
    }

    let bind_addr = format!("{}:{}", config.address, config.port);
    info!("starting diceroyale server on {bind_addr}");

    let listener = TcpListener::bind(&bind_addr).await?;
    let (shutdown_tx, _) = broadcast::channel(1);

    let store = Arc::new(SessionStore::new(config.contest.clone()));
    store.spawn_reaper(shutdown_tx.subscribe());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let store = store.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, store, shutdown_rx).await {
                        debug!("connection from {addr} closed: {err}");
                    }
                });
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    drop(shutdown_tx);
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    store: Arc<SessionStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let conn_id = ConnId::new_id();
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    // Writer task: drains the outbound channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    debug!("dropping unserializable event {event}: {err}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut conn = Connection {
        conn_id,
        identity: None,
        lobby_key: None,
        events_tx,
        store,
    };

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => conn.dispatch(event).await,
                            Err(err) => conn.reject(format!("malformed event: {err}")).await,
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Binary and ping/pong frames carry nothing for us.
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!("websocket error on {conn_id}: {err}");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    conn.disconnected().await;
    writer.abort();
    Ok(())
}

/// Per-connection routing state: which identity authenticated on this
/// socket and which lobby it joined.
struct Connection {
    conn_id: ConnId,
    identity: Option<PlayerIdentity>,
    lobby_key: Option<SessionKey>,
    events_tx: mpsc::Sender<ServerEvent>,
    store: Arc<SessionStore>,
}

impl Connection {
    /// Rejects the caller's last event. Never broadcast.
    async fn reject(&self, message: String) {
        let _ = self.events_tx.send(ServerEvent::Error { message }).await;
    }

    async fn dispatch(&mut self, event: ClientEvent) {
        let key = match SessionKey::parse(event.session_key()) {
            Ok(key) => key,
            Err(err) => return self.reject(err.to_string()).await,
        };

        match event {
            ClientEvent::Join {
                player_id,
                display_name,
                ..
            } => {
                if player_id.is_empty() || display_name.trim().is_empty() {
                    return self.reject("missing player identity".to_string()).await;
                }
                let identity = PlayerIdentity {
                    id: player_id,
                    display_name: display_name.trim().to_string(),
                };
                let lobby = self.store.lobby(&key);
                lobby
                    .join(self.conn_id, identity.clone(), self.events_tx.clone())
                    .await;
                self.identity = Some(identity);
                self.lobby_key = Some(key);
            }
            ClientEvent::Leave { .. } => {
                if let Some(lobby) = self.store.find_lobby(&key) {
                    lobby.leave(self.conn_id).await;
                } else {
                    debug!("leave for unknown session {key}, dropped");
                }
                if self.lobby_key.as_ref() == Some(&key) {
                    self.lobby_key = None;
                }
            }
            ClientEvent::SetReady { ready, .. } => {
                if let Some(lobby) = self.store.find_lobby(&key) {
                    lobby.set_ready(self.conn_id, ready).await;
                }
            }
            ClientEvent::SetOnline { online, .. } => {
                if let Some(lobby) = self.store.find_lobby(&key) {
                    lobby.set_online(self.conn_id, online).await;
                }
            }
            ClientEvent::SendChatMessage { text, .. } => {
                if let Some(lobby) = self.store.find_lobby(&key) {
                    lobby.send_chat(self.conn_id, text).await;
                }
            }
            ClientEvent::MarkContestStarted { started, .. } => {
                if let Some(lobby) = self.store.find_lobby(&key) {
                    lobby.mark_contest_started(started).await;
                }
                // The lobby latch doubles as the contest's external start
                // trigger for the same session key.
                if started {
                    if let Some(contest) = self.store.find_contest(&key) {
                        contest.request_start().await;
                    }
                }
            }
            ClientEvent::Register {
                player_id,
                display_name,
                stake,
                ..
            } => {
                if player_id.is_empty() || display_name.trim().is_empty() {
                    return self.reject("missing player identity".to_string()).await;
                }
                let identity = PlayerIdentity {
                    id: player_id,
                    display_name: display_name.trim().to_string(),
                };
                let contest = self.store.contest(&key);
                if let Err(err) = contest
                    .register(identity.clone(), stake, self.events_tx.clone())
                    .await
                {
                    return self.reject(err.to_string()).await;
                }
                self.identity = Some(identity);
            }
            ClientEvent::SetContestReady { .. } => {
                let Some(identity) = self.identity.clone() else {
                    return self.reject("not registered".to_string()).await;
                };
                if let Some(contest) = self.store.find_contest(&key) {
                    contest.set_ready(identity.id).await;
                }
            }
            ClientEvent::SubmitRoundAction { .. } => {
                let Some(identity) = self.identity.clone() else {
                    return self.reject("not registered".to_string()).await;
                };
                if let Some(contest) = self.store.find_contest(&key) {
                    contest.submit_roll(identity.id).await;
                }
            }
        }
    }

    /// Socket gone: synthesize the leave for the joined lobby. A contest
    /// contestant is not removed; unplayed rounds time out to zero.
    async fn disconnected(&mut self) {
        if let Some(key) = self.lobby_key.take() {
            if let Some(lobby) = self.store.find_lobby(&key) {
                lobby.leave(self.conn_id).await;
            }
        }
    }
}
