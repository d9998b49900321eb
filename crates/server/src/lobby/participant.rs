//! lobby participant record.

use tokio::sync::mpsc;

use diceroyale_core::event::{ParticipantStatus, ParticipantUpdate, ServerEvent};
use diceroyale_core::identity::{ConnId, PlayerIdentity};

/// State of one participant, keyed by its live connection.
///
/// There is exactly one record per connection; the lobby reconciles them to
/// one logical record per identity on join.
#[derive(Debug)]
pub struct Participant {
    /// Stable identity from the auth collaborator.
    pub identity: PlayerIdentity,

    /// The connection this record belongs to.
    pub conn_id: ConnId,

    /// Current readiness/disconnect status.
    pub status: ParticipantStatus,

    /// Status held before the last disconnect, for resume.
    pub previous_status: ParticipantStatus,

    /// Tab-visibility heartbeat state.
    pub online: bool,

    /// Whether this participant leads the lobby.
    pub is_captain: bool,

    /// Join order, stable across reconnects; used for roster ordering.
    pub seq: u64,

    /// Outbound channel; dropped on disconnect so a dead socket's writer
    /// can wind down.
    events_tx: Option<mpsc::Sender<ServerEvent>>,
}

impl Participant {
    /// A freshly connected participant with no captaincy.
    pub fn new(
        identity: PlayerIdentity,
        conn_id: ConnId,
        status: ParticipantStatus,
        seq: u64,
        events_tx: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            identity,
            conn_id,
            status,
            previous_status: status,
            online: true,
            is_captain: false,
            seq,
            events_tx: Some(events_tx),
        }
    }

    /// Delivers an event to this participant's connection, if any.
    pub async fn send(&self, event: ServerEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Marks the participant disconnected, preserving the prior status.
    pub fn disconnect(&mut self) {
        if self.status != ParticipantStatus::Disconnected {
            self.previous_status = self.status;
        }
        self.status = ParticipantStatus::Disconnected;
        self.online = false;
        self.events_tx = None;
    }

    /// The status a reconnecting participant resumes with.
    pub fn resumed_status(&self) -> ParticipantStatus {
        if self.status == ParticipantStatus::Disconnected {
            self.previous_status
        } else {
            self.status
        }
    }

    /// True when the record still counts as connected but its outbound
    /// channel is gone; the leave event for it was lost.
    pub fn channel_is_dead(&self) -> bool {
        self.status != ParticipantStatus::Disconnected
            && self.events_tx.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Roster snapshot entry for this participant.
    pub fn update(&self) -> ParticipantUpdate {
        ParticipantUpdate {
            player_id: self.identity.id.clone(),
            display_name: self.identity.display_name.clone(),
            status: self.status,
            online: self.online,
            is_captain: self.is_captain,
        }
    }
}
