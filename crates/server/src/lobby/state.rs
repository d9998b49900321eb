//! Lobby presence state management.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use log::{debug, info};
use tokio::sync::mpsc;

use diceroyale_core::event::{
    ChatKind, ChatMessage, ParticipantStatus, ParticipantUpdate, ServerEvent,
};
use diceroyale_core::identity::{ConnId, PlayerId, PlayerIdentity};
use diceroyale_core::session::SessionKey;

use super::participant::Participant;

/// Retained chat messages per lobby; the oldest entries roll off.
const MAX_CHAT_MESSAGES: usize = 256;

/// Longest accepted chat message body.
const MAX_CHAT_TEXT_LEN: usize = 500;

/// How long a created lobby may sit with no participant at all before the
/// sweep destroys it (the expected join never arrived).
const ABANDON_GRACE: Duration = Duration::from_secs(30,);

/// Core state of one lobby instance.
///
/// Two-level index: `by_identity` maps a stable identity to its current
/// connection, `participants` maps a connection to its record. A join for
/// a known identity evicts the stale connection's record atomically, so at
/// any instant exactly one record per identity is authoritative.
#[derive(Debug,)]
pub struct LobbyState {
    session_key: SessionKey,
    by_identity: AHashMap<PlayerId, ConnId,>,
    participants: AHashMap<ConnId, Participant,>,
    chat: VecDeque<ChatMessage,>,
    next_chat_id: u64,
    next_seq: u64,
    contest_started: bool,
    created_at: Instant,
    deserted: bool,
}

impl LobbyState {
    /// Creates an empty lobby for `session_key`.
    pub fn new(session_key: SessionKey,) -> Self {
        Self {
            session_key,
            by_identity: AHashMap::new(),
            participants: AHashMap::new(),
            chat: VecDeque::new(),
            next_chat_id: 0,
            next_seq: 0,
            contest_started: false,
            created_at: Instant::now(),
            deserted: false,
        }
    }

    /// True once every participant has gone and the lobby is destroyed.
    pub fn is_deserted(&self,) -> bool {
        self.deserted
    }

    /// Joins or reconnects a participant and broadcasts the snapshots
    /// in their fixed order.
    pub async fn join(
        &mut self, conn_id: ConnId, identity: PlayerIdentity,
        events_tx: mpsc::Sender<ServerEvent,>,
    ) {
        // Replaying a join for the already-current connection mutates
        // nothing; the snapshots are just re-broadcast.
        if self.by_identity.get(&identity.id,) == Some(&conn_id,) {
            self.broadcast(ServerEvent::ContestStartedChanged {
                started: self.contest_started,
            },)
                .await;
            self.broadcast_roster().await;
            self.broadcast_chat().await;
            return;
        }

        let stale = self
            .by_identity
            .insert(identity.id.clone(), conn_id,)
            .and_then(|old_conn| self.participants.remove(&old_conn,),);

        let fresh_status = if self.contest_started {
            ParticipantStatus::Ready
        } else {
            ParticipantStatus::NotReady
        };
        let mut participant = Participant::new(
            identity.clone(),
            conn_id,
            fresh_status,
            self.next_seq,
            events_tx,
        );
        self.next_seq += 1;

        let announce = match &stale {
            | Some(old,) => {
                // Reconnection: carry the prior record forward.
                participant.status = old.resumed_status();
                participant.is_captain = old.is_captain;
                participant.seq = old.seq;
                info!(
                    "lobby {}: {} reconnected",
                    self.session_key, identity.display_name
                );
                self.push_system_chat(format!(
                    "{} reconnected",
                    identity.display_name
                ),);
                ServerEvent::PlayerReconnected {
                    identity: identity.clone(),
                }
            },
            | None => {
                participant.is_captain =
                    !self.participants.values().any(|p| p.is_captain,);
                info!(
                    "lobby {}: {} joined",
                    self.session_key, identity.display_name
                );
                self.push_system_chat(format!(
                    "{} joined",
                    identity.display_name
                ),);
                ServerEvent::PlayerJoined {
                    identity: identity.clone(),
                }
            },
        };

        self.participants.insert(conn_id, participant,);
        self.deserted = false;

        // Fixed order so observers never render a roster change without
        // knowing whether the contest is live.
        self.broadcast(ServerEvent::ContestStartedChanged {
            started: self.contest_started,
        },)
            .await;
        self.broadcast(announce,).await;
        self.broadcast_roster().await;
        self.broadcast_chat().await;
    }

    /// Marks a participant disconnected; destroys the lobby once every
    /// participant is gone.
    pub async fn leave(&mut self, conn_id: ConnId,) {
        let Some(participant,) = self.participants.get_mut(&conn_id,) else {
            debug!("lobby {}: leave for unknown connection", self.session_key);
            return;
        };
        if participant.status == ParticipantStatus::Disconnected {
            return;
        }

        let identity = participant.identity.clone();
        participant.disconnect();

        if self.all_disconnected() {
            self.destroy();
            return;
        }

        self.push_system_chat(format!("{} left", identity.display_name),);
        self.broadcast(ServerEvent::PlayerLeft {
            identity,
        },)
            .await;
        self.broadcast_roster().await;
        self.broadcast_chat().await;
    }

    /// Toggles a participant between ready and not-ready.
    pub async fn set_ready(&mut self, conn_id: ConnId, ready: bool,) {
        // Readiness is frozen once the contest is live.
        if self.contest_started {
            return;
        }
        let Some(participant,) = self.participants.get_mut(&conn_id,) else {
            return;
        };
        if participant.status == ParticipantStatus::Disconnected {
            return;
        }
        participant.status = if ready {
            ParticipantStatus::Ready
        } else {
            ParticipantStatus::NotReady
        };
        self.broadcast_roster().await;
    }

    /// Tab-visibility heartbeat; flips `online` only.
    pub async fn set_online(&mut self, conn_id: ConnId, online: bool,) {
        let Some(participant,) = self.participants.get_mut(&conn_id,) else {
            return;
        };
        if participant.status == ParticipantStatus::Disconnected {
            return;
        }
        participant.online = online;
        self.broadcast_roster().await;
    }

    /// Latches the contest-started flag and broadcasts it.
    pub async fn mark_contest_started(&mut self, started: bool,) {
        // One-way latch; attempts to unset only re-broadcast the flag.
        if started && !self.contest_started {
            self.contest_started = true;
            info!("lobby {}: contest started", self.session_key);
        }
        self.broadcast(ServerEvent::ContestStartedChanged {
            started: self.contest_started,
        },)
            .await;
    }

    /// Validates and appends a user chat message, then rebroadcasts the
    /// full history.
    pub async fn send_chat(&mut self, conn_id: ConnId, text: String,) {
        let Some(participant,) = self.participants.get(&conn_id,) else {
            debug!("lobby {}: chat from unknown connection", self.session_key);
            return;
        };

        let text = text.trim();
        if text.is_empty() {
            participant
                .send(ServerEvent::Error {
                    message: "chat message is empty".to_string(),
                },)
                .await;
            return;
        }

        let mut body = text.to_string();
        body.truncate(
            body.char_indices()
                .map(|(i, _,)| i,)
                .nth(MAX_CHAT_TEXT_LEN,)
                .unwrap_or(body.len(),),
        );
        let sender = participant.identity.display_name.clone();
        self.push_chat(sender, body, ChatKind::User,);
        self.broadcast_chat().await;
    }

    /// Treats a connected participant whose outbound channel is gone as if
    /// its leave event had arrived; called from the actor's periodic tick.
    pub async fn sweep_dead_connections(&mut self,) {
        let dead: Vec<ConnId,> = self
            .participants
            .values()
            .filter(|p| p.channel_is_dead(),)
            .map(|p| p.conn_id,)
            .collect();
        for conn_id in dead {
            debug!(
                "lobby {}: reaping dead connection {conn_id}",
                self.session_key
            );
            self.leave(conn_id,).await;
        }

        if self.participants.is_empty()
            && !self.deserted
            && self.created_at.elapsed() > ABANDON_GRACE
        {
            self.destroy();
        }
    }

    fn all_disconnected(&self,) -> bool {
        self.participants
            .values()
            .all(|p| p.status == ParticipantStatus::Disconnected,)
    }

    fn destroy(&mut self,) {
        self.chat.clear();
        self.by_identity.clear();
        self.participants.clear();
        self.deserted = true;
        info!(
            "lobby {} destroyed after {:?}",
            self.session_key,
            self.created_at.elapsed()
        );
    }

    fn push_system_chat(&mut self, text: String,) {
        self.push_chat("system".to_string(), text, ChatKind::System,);
    }

    fn push_chat(&mut self, sender: String, text: String, kind: ChatKind,) {
        let message = ChatMessage {
            id: self.next_chat_id,
            sender,
            text,
            timestamp_ms: now_ms(),
            kind,
        };
        self.next_chat_id += 1;
        self.chat.push_back(message,);
        while self.chat.len() > MAX_CHAT_MESSAGES {
            self.chat.pop_front();
        }
    }

    fn roster(&self,) -> Vec<ParticipantUpdate,> {
        let mut entries: Vec<&Participant,> =
            self.participants.values().collect();
        entries.sort_by_key(|p| p.seq,);
        entries.iter().map(|p| p.update(),).collect()
    }

    async fn broadcast(&self, event: ServerEvent,) {
        for participant in self.participants.values() {
            participant.send(event.clone(),).await;
        }
    }

    async fn broadcast_roster(&self,) {
        self.broadcast(ServerEvent::RosterUpdated {
            roster: self.roster(),
        },)
            .await;
    }

    async fn broadcast_chat(&self,) {
        self.broadcast(ServerEvent::ChatHistory {
            messages: self.chat.iter().cloned().collect(),
        },)
            .await;
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH,)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> LobbyState {
        LobbyState::new(SessionKey::parse("lobby-1",).unwrap(),)
    }

    fn identity(n: u32,) -> PlayerIdentity {
        PlayerIdentity {
            id: PlayerId::new(format!("u-{n}"),),
            display_name: format!("Player{n}"),
        }
    }

    fn channel() -> (mpsc::Sender<ServerEvent,>, mpsc::Receiver<ServerEvent,>,)
    {
        mpsc::channel(64,)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent,>,) -> Vec<ServerEvent,> {
        let mut events = Vec::new();
        while let Ok(event,) = rx.try_recv() {
            events.push(event,);
        }
        events
    }

    #[tokio::test]
    async fn join_broadcast_order() {
        let mut lobby = lobby();
        let (tx, mut rx,) = channel();
        lobby.join(ConnId::new_id(), identity(1,), tx,).await;

        let labels: Vec<&str,> =
            drain(&mut rx,).iter().map(|e| e.label(),).collect();
        assert_eq!(
            labels,
            vec![
                "contestStartedChanged",
                "playerJoined",
                "rosterUpdated",
                "chatHistory"
            ]
        );
    }

    #[tokio::test]
    async fn reconnection_merges_identity() {
        let mut lobby = lobby();
        let (tx1, mut rx1,) = channel();
        let conn1 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.set_ready(conn1, true,).await;

        let (tx2, mut rx2,) = channel();
        let conn2 = ConnId::new_id();
        lobby.join(conn2, identity(1,), tx2,).await;

        assert_eq!(lobby.participants.len(), 1);
        let participant = lobby.participants.get(&conn2,).unwrap();
        assert_eq!(participant.status, ParticipantStatus::Ready);
        assert!(participant.online);
        assert!(!lobby.participants.contains_key(&conn1,));

        // The replaced connection saw the events up to its eviction only.
        let events = drain(&mut rx2,);
        assert!(events
            .iter()
            .any(|e| e.label() == "playerReconnected",));
        assert!(lobby
            .chat
            .iter()
            .any(|m| m.kind == ChatKind::System && m.text.contains("reconnected",),));
        drain(&mut rx1,);
    }

    #[tokio::test]
    async fn disconnect_then_rejoin_resumes_status() {
        let mut lobby = lobby();
        let (tx1, _rx1,) = channel();
        let (tx2, _rx2,) = channel();
        let conn1 = ConnId::new_id();
        let conn2 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.join(conn2, identity(2,), tx2,).await;

        lobby.set_ready(conn1, true,).await;
        lobby.leave(conn1,).await;
        assert!(!lobby.is_deserted());
        assert_eq!(
            lobby.participants.get(&conn1,).unwrap().status,
            ParticipantStatus::Disconnected
        );

        let (tx3, _rx3,) = channel();
        let conn3 = ConnId::new_id();
        lobby.join(conn3, identity(1,), tx3,).await;
        let resumed = lobby.participants.get(&conn3,).unwrap();
        assert_eq!(resumed.status, ParticipantStatus::Ready);
        assert!(resumed.online);
        assert_eq!(lobby.participants.len(), 2);
    }

    #[tokio::test]
    async fn lobby_destroyed_after_last_leave() {
        let mut lobby = lobby();
        let conns: Vec<ConnId,> =
            (0..3).map(|_| ConnId::new_id(),).collect();
        for (i, conn,) in conns.iter().enumerate() {
            let (tx, _rx,) = channel();
            lobby.join(*conn, identity(i as u32,), tx,).await;
        }

        lobby.leave(conns[0],).await;
        lobby.leave(conns[1],).await;
        assert!(!lobby.is_deserted());
        assert!(!lobby.chat.is_empty());

        lobby.leave(conns[2],).await;
        assert!(lobby.is_deserted());
        assert!(lobby.chat.is_empty());
        assert!(lobby.participants.is_empty());
        assert!(lobby.by_identity.is_empty());
    }

    #[tokio::test]
    async fn set_ready_noop_after_start() {
        let mut lobby = lobby();
        let (tx, mut rx,) = channel();
        let conn = ConnId::new_id();
        lobby.join(conn, identity(1,), tx,).await;
        lobby.mark_contest_started(true,).await;
        drain(&mut rx,);

        lobby.set_ready(conn, true,).await;
        assert!(drain(&mut rx,).is_empty());
        assert_eq!(
            lobby.participants.get(&conn,).unwrap().status,
            ParticipantStatus::NotReady
        );
    }

    #[tokio::test]
    async fn join_after_start_is_ready() {
        let mut lobby = lobby();
        let (tx1, _rx1,) = channel();
        let conn1 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.mark_contest_started(true,).await;

        let (tx2, _rx2,) = channel();
        let conn2 = ConnId::new_id();
        lobby.join(conn2, identity(2,), tx2,).await;
        assert_eq!(
            lobby.participants.get(&conn2,).unwrap().status,
            ParticipantStatus::Ready
        );
    }

    #[tokio::test]
    async fn empty_chat_rejected_to_sender_only() {
        let mut lobby = lobby();
        let (tx1, mut rx1,) = channel();
        let (tx2, mut rx2,) = channel();
        let conn1 = ConnId::new_id();
        let conn2 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.join(conn2, identity(2,), tx2,).await;
        drain(&mut rx1,);
        drain(&mut rx2,);
        let chat_len = lobby.chat.len();

        lobby.send_chat(conn1, "   ".to_string(),).await;

        let sender_events = drain(&mut rx1,);
        assert_eq!(sender_events.len(), 1);
        assert_eq!(sender_events[0].label(), "error");
        assert!(drain(&mut rx2,).is_empty());
        assert_eq!(lobby.chat.len(), chat_len);
    }

    #[tokio::test]
    async fn user_chat_appended_and_rebroadcast() {
        let mut lobby = lobby();
        let (tx, mut rx,) = channel();
        let conn = ConnId::new_id();
        lobby.join(conn, identity(1,), tx,).await;
        drain(&mut rx,);

        lobby.send_chat(conn, "  hello there  ".to_string(),).await;
        let events = drain(&mut rx,);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label(), "chatHistory");

        let last = lobby.chat.back().unwrap();
        assert_eq!(last.kind, ChatKind::User);
        assert_eq!(last.text, "hello there");
        assert_eq!(last.sender, "Player1");
    }

    #[tokio::test]
    async fn captain_is_first_joiner_and_survives_reconnect() {
        let mut lobby = lobby();
        let (tx1, _rx1,) = channel();
        let (tx2, _rx2,) = channel();
        let conn1 = ConnId::new_id();
        let conn2 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.join(conn2, identity(2,), tx2,).await;

        assert!(lobby.participants.get(&conn1,).unwrap().is_captain);
        assert!(!lobby.participants.get(&conn2,).unwrap().is_captain);

        // Captain drops and returns: captaincy is carried forward.
        lobby.leave(conn1,).await;
        let (tx3, _rx3,) = channel();
        let conn3 = ConnId::new_id();
        lobby.join(conn3, identity(1,), tx3,).await;
        assert!(lobby.participants.get(&conn3,).unwrap().is_captain);
        assert!(!lobby.participants.get(&conn2,).unwrap().is_captain);
    }

    #[tokio::test]
    async fn replayed_join_keeps_single_record() {
        let mut lobby = lobby();
        let (tx, mut rx,) = channel();
        let conn = ConnId::new_id();
        lobby.join(conn, identity(1,), tx.clone(),).await;
        drain(&mut rx,);

        lobby.join(conn, identity(1,), tx,).await;
        assert_eq!(lobby.participants.len(), 1);
        let system_joins = lobby
            .chat
            .iter()
            .filter(|m| m.kind == ChatKind::System,)
            .count();
        assert_eq!(system_joins, 1);

        // Replay still re-broadcasts the snapshots.
        let labels: Vec<&str,> =
            drain(&mut rx,).iter().map(|e| e.label(),).collect();
        assert_eq!(
            labels,
            vec!["contestStartedChanged", "rosterUpdated", "chatHistory"]
        );
    }

    #[tokio::test]
    async fn set_online_flips_online_only() {
        let mut lobby = lobby();
        let (tx, _rx,) = channel();
        let conn = ConnId::new_id();
        lobby.join(conn, identity(1,), tx,).await;
        lobby.set_ready(conn, true,).await;

        lobby.set_online(conn, false,).await;
        let participant = lobby.participants.get(&conn,).unwrap();
        assert!(!participant.online);
        assert_eq!(participant.status, ParticipantStatus::Ready);
    }

    #[tokio::test]
    async fn sweep_reaps_closed_channels() {
        let mut lobby = lobby();
        let (tx1, rx1,) = channel();
        let (tx2, _rx2,) = channel();
        let conn1 = ConnId::new_id();
        let conn2 = ConnId::new_id();
        lobby.join(conn1, identity(1,), tx1,).await;
        lobby.join(conn2, identity(2,), tx2,).await;

        // Simulate a lost leave event: the receiver side is gone.
        drop(rx1,);
        lobby.sweep_dead_connections().await;
        assert_eq!(
            lobby.participants.get(&conn1,).unwrap().status,
            ParticipantStatus::Disconnected
        );
        assert!(!lobby.is_deserted());
    }
}
