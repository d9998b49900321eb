//! wire events exchanged between clients and the session coordinator.
//!
//! Everything is JSON text frames tagged with a camelCase `type` field,
//! matching what the web clients expect.

use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::identity::{PlayerId, PlayerIdentity};
use crate::money::Coins;

/// Participant status within a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantStatus {
    /// Joined but not yet ready.
    NotReady,
    /// Ready for the contest to start.
    Ready,
    /// Connection gone; record retained for resume.
    Disconnected,
}

/// Origin of a chat log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// Emitted by the lobby itself (joins, leaves, reconnects).
    System,
    /// Written by a participant.
    User,
}

/// One entry of a lobby chat log. Append-only, insertion ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Per-lobby sequence number.
    pub id:           u64,
    /// Display name of the sender, or `"system"`.
    pub sender:       String,
    /// Message body.
    pub text:         String,
    /// Milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    /// System or user origin.
    pub kind:         ChatKind,
}

/// Roster entry broadcast to every lobby member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    /// Stable player id.
    pub player_id:    PlayerId,
    /// Name shown in the roster.
    pub display_name: String,
    /// Ready / not-ready / disconnected.
    pub status:       ParticipantStatus,
    /// Tab-visibility heartbeat state.
    pub online:       bool,
    /// Whether this participant leads the lobby.
    pub is_captain:   bool,
}

/// One row of a contest leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    /// Stable player id.
    pub player_id:    PlayerId,
    /// Name shown on the board.
    pub display_name: String,
    /// Sum of all recorded round scores.
    pub total_score:  u32,
    /// Competition rank (ties share, next rank skips).
    pub rank:         usize,
}

/// Events sent by clients into the coordinator.
///
/// Every event carries the session key it addresses; the gateway routes it
/// to the matching lobby or contest actor.
#[derive(Debug, Clone, Serialize, Deserialize,)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Enter a lobby (created lazily on first join).
    Join {
        /// Lobby to join.
        session_key:  String,
        /// Authenticated player id.
        player_id:    PlayerId,
        /// Name to show in the roster.
        display_name: String,
    },
    /// Leave a lobby (also synthesized by the gateway on socket close).
    Leave {
        /// Lobby to leave.
        session_key: String,
    },
    /// Toggle ready state before the contest starts.
    SetReady {
        /// Target lobby.
        session_key: String,
        /// Desired ready state.
        ready:       bool,
    },
    /// Tab-visibility heartbeat; flips `online` only.
    SetOnline {
        /// Target lobby.
        session_key: String,
        /// Whether the tab is visible.
        online:      bool,
    },
    /// Append a user chat message.
    SendChatMessage {
        /// Target lobby.
        session_key: String,
        /// Message body; must be non-empty after trimming.
        text:        String,
    },
    /// Latch the lobby's contest-started flag (one-way).
    MarkContestStarted {
        /// Target lobby.
        session_key: String,
        /// Attempts to unset are ignored.
        started:     bool,
    },
    /// Register for the contest tied to a session key.
    Register {
        /// Target contest.
        session_key:  String,
        /// Authenticated player id.
        player_id:    PlayerId,
        /// Name to show on leaderboards.
        display_name: String,
        /// Stake committed to the pool; must match the table stake.
        stake:        Coins,
    },
    /// Mark this contestant ready to start.
    SetContestReady {
        /// Target contest.
        session_key: String,
    },
    /// Roll the dice for the current round.
    SubmitRoundAction {
        /// Target contest.
        session_key: String,
    },
}

impl ClientEvent {
    /// The session key this event addresses, as sent.
    #[must_use]
    pub fn session_key(&self,) -> &str {
        match self {
            | Self::Join { session_key, .. }
            | Self::Leave { session_key, }
            | Self::SetReady { session_key, .. }
            | Self::SetOnline { session_key, .. }
            | Self::SendChatMessage { session_key, .. }
            | Self::MarkContestStarted { session_key, .. }
            | Self::Register { session_key, .. }
            | Self::SetContestReady { session_key, }
            | Self::SubmitRoundAction { session_key, } => session_key,
        }
    }

    /// Label of the event variant, for logging.
    #[must_use]
    pub const fn label(&self,) -> &'static str {
        match self {
            | Self::Join { .. } => "join",
            | Self::Leave { .. } => "leave",
            | Self::SetReady { .. } => "setReady",
            | Self::SetOnline { .. } => "setOnline",
            | Self::SendChatMessage { .. } => "sendChatMessage",
            | Self::MarkContestStarted { .. } => "markContestStarted",
            | Self::Register { .. } => "register",
            | Self::SetContestReady { .. } => "setContestReady",
            | Self::SubmitRoundAction { .. } => "submitRoundAction",
        }
    }
}

impl Display for ClientEvent {
    fn fmt(&self, f: &mut Formatter<'_,>,) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Events broadcast or privately delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// The lobby's contest-started flag.
    ContestStartedChanged {
        /// Current flag value.
        started: bool,
    },
    /// A fresh participant entered the lobby.
    PlayerJoined {
        /// Who joined.
        identity: PlayerIdentity,
    },
    /// A known identity returned under a new connection.
    PlayerReconnected {
        /// Who returned.
        identity: PlayerIdentity,
    },
    /// A participant disconnected.
    PlayerLeft {
        /// Who left.
        identity: PlayerIdentity,
    },
    /// Full roster snapshot, in join order.
    RosterUpdated {
        /// Current roster.
        roster: Vec<ParticipantUpdate,>,
    },
    /// Full chat history snapshot.
    ChatHistory {
        /// Current log, oldest first.
        messages: Vec<ChatMessage,>,
    },
    /// A scoring round opened.
    RoundStarted {
        /// 1-based round number.
        round_number:     usize,
        /// Seconds until the roll deadline.
        deadline_seconds: u64,
    },
    /// Per-second countdown inside an active round.
    DeadlineTick {
        /// Whole seconds left before forced zeros.
        seconds_left: u64,
    },
    /// A contestant's roll is being resolved.
    ActionResolving {
        /// Who is rolling.
        player_id: PlayerId,
    },
    /// Private roll outcome for the acting contestant.
    ActionResult {
        /// The two dice.
        dice:        [u32; 2],
        /// Their sum, recorded for the round.
        round_score: u32,
    },
    /// Roster-wide score snapshot after a roll.
    ScoreUpdated {
        /// Whose score changed.
        player_id: PlayerId,
        /// New total score.
        total:     u32,
        /// Optional human-readable note.
        message:   Option<String,>,
    },
    /// Top-five leaderboard shown between rounds.
    RoundLeaderboard {
        /// Up to five best rows.
        top5: Vec<LeaderboardRow,>,
    },
    /// Per-second countdown before the next round.
    NextRoundCountdown {
        /// Whole seconds left.
        seconds: u64,
    },
    /// Final ranking is being computed.
    Calculating,
    /// Private, personalized end-of-contest result.
    ContestComplete {
        /// This contestant's rank.
        rank:           usize,
        /// This contestant's total score.
        score:          u32,
        /// Shared top-five leaderboard.
        leaderboard:    Vec<LeaderboardRow,>,
        /// Present when a tie-break changed the order.
        tie_break_note: Option<String,>,
        /// This contestant's payout share.
        payout:         Coins,
    },
    /// Private rejection of the caller's last event.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl ServerEvent {
    /// Label of the event variant, for logging.
    #[must_use]
    pub const fn label(&self,) -> &'static str {
        match self {
            | Self::ContestStartedChanged { .. } => "contestStartedChanged",
            | Self::PlayerJoined { .. } => "playerJoined",
            | Self::PlayerReconnected { .. } => "playerReconnected",
            | Self::PlayerLeft { .. } => "playerLeft",
            | Self::RosterUpdated { .. } => "rosterUpdated",
            | Self::ChatHistory { .. } => "chatHistory",
            | Self::RoundStarted { .. } => "roundStarted",
            | Self::DeadlineTick { .. } => "deadlineTick",
            | Self::ActionResolving { .. } => "actionResolving",
            | Self::ActionResult { .. } => "actionResult",
            | Self::ScoreUpdated { .. } => "scoreUpdated",
            | Self::RoundLeaderboard { .. } => "roundLeaderboard",
            | Self::NextRoundCountdown { .. } => "nextRoundCountdown",
            | Self::Calculating => "calculating",
            | Self::ContestComplete { .. } => "contestComplete",
            | Self::Error { .. } => "error",
        }
    }
}

impl Display for ServerEvent {
    fn fmt(&self, f: &mut Formatter<'_,>,) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_wire_format() {
        let json = r#"{
            "type": "join",
            "sessionKey": "lobby-7",
            "playerId": "u-1",
            "displayName": "Alice"
        }"#;
        let event: ClientEvent = serde_json::from_str(json,).unwrap();
        assert!(matches!(
            &event,
            ClientEvent::Join { display_name, .. } if display_name == "Alice"
        ));
        assert_eq!(event.session_key(), "lobby-7");
        assert_eq!(event.label(), "join");
    }

    #[test]
    fn submit_round_action_tag() {
        let event = ClientEvent::SubmitRoundAction {
            session_key: "c-1".to_string(),
        };
        let json = serde_json::to_string(&event,).unwrap();
        assert!(json.contains(r#""type":"submitRoundAction""#));
        assert!(json.contains(r#""sessionKey":"c-1""#));
    }

    #[test]
    fn server_event_round_trip() {
        let event = ServerEvent::ContestComplete {
            rank: 2,
            score: 51,
            leaderboard: vec![LeaderboardRow {
                player_id: PlayerId::new("u-1",),
                display_name: "Alice".to_string(),
                total_score: 60,
                rank: 1,
            }],
            tie_break_note: None,
            payout: Coins::new(90,),
        };
        let json = serde_json::to_string(&event,).unwrap();
        assert!(json.contains(r#""type":"contestComplete""#));
        assert!(json.contains(r#""tieBreakNote":null"#));
        let back: ServerEvent = serde_json::from_str(&json,).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn status_uses_kebab_case() {
        let json = serde_json::to_string(&ParticipantStatus::NotReady,).unwrap();
        assert_eq!(json, r#""not-ready""#);
    }
}
