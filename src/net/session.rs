use tracing::debug;

use crate::lobby::room::{PlayerRecord, RoomMembership};
use crate::net::protocol::{PlayerId, RoomId, ServerMessage};

/// Transport lifecycle as seen by the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Client-side view of the session: identity, room and membership.
///
/// Membership only changes through [`Session::apply`] (server events) and
/// the two resets, [`Session::leave_room`] and [`Session::reset`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    status: ConnectionStatus,
    player_id: Option<PlayerId>,
    room_id: Option<RoomId>,
    is_host: bool,
    membership: RoomMembership,
}

/// Snapshot of the current room for UI and logs
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: Option<RoomId>,
    pub is_host: bool,
    pub player_id: Option<PlayerId>,
    pub player_count: usize,
    pub players: Vec<(PlayerId, PlayerRecord)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    pub fn member_count(&self) -> usize {
        self.membership.len()
    }

    /// Connected and holding a room
    pub fn is_in_room(&self) -> bool {
        self.is_connected() && self.room_id.is_some()
    }

    pub fn room_info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            is_host: self.is_host,
            player_id: self.player_id.clone(),
            player_count: self.membership.len(),
            players: self.membership.sorted(),
        }
    }

    pub(crate) fn begin_connect(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    pub(crate) fn connected(&mut self, player_id: PlayerId) {
        self.status = ConnectionStatus::Connected;
        self.player_id = Some(player_id);
    }

    /// Forget the room but keep the connection
    pub(crate) fn leave_room(&mut self) {
        self.room_id = None;
        self.is_host = false;
        self.membership.clear();
    }

    /// Back to a fresh, disconnected session
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    fn holds_other_room(&self, room_id: &str) -> bool {
        self.room_id.as_deref().is_some_and(|current| current != room_id)
    }

    /// Apply the membership side of a server message.
    /// A room reply never replaces a different room we already hold.
    /// Returns true if room state changed.
    pub(crate) fn apply(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::RoomCreated(room) | ServerMessage::RoomJoined(room)
                if self.holds_other_room(&room.room_id) =>
            {
                debug!(room_id = %room.room_id, current = ?self.room_id, "Reply for another room ignored");
                false
            }
            ServerMessage::RoomCreated(room) => {
                self.room_id = Some(room.room_id.clone());
                self.is_host = true;
                self.membership.replace(room.players.clone());
                true
            }
            ServerMessage::RoomJoined(room) => {
                self.room_id = Some(room.room_id.clone());
                self.is_host = false;
                self.membership.replace(room.players.clone());
                true
            }
            ServerMessage::PlayerJoined(change) if self.room_id.is_some() => {
                let record = change.player_data.clone().unwrap_or_default();
                self.membership.insert(change.player_id.clone(), record);
                true
            }
            ServerMessage::PlayerLeft(change) if self.room_id.is_some() => {
                self.membership.remove(&change.player_id).is_some()
            }
            ServerMessage::PlayerJoined(change) | ServerMessage::PlayerLeft(change) => {
                debug!(player_id = %change.player_id, "Membership change outside a room ignored");
                false
            }
            _ => false,
        }
    }
}
