//! Session connection: transport lifecycle and raw message exchange
//!
//! Knows the message contract but nothing about lobby flow or gameplay.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::game::constants::net;
use crate::lobby::room::{PlayerRecord, RoomSummary};
use crate::net::dispatch::SessionEvent;
use crate::net::protocol::{
    decode, encode, ClientMessage, OutboundObjectUpdate, OutboundSnapshot, PlayerAction, RoomId,
    ServerMessage, SnapshotData,
};
use crate::net::session::{ConnectionStatus, RoomInfo, Session};
use crate::net::transport::{Transport, TransportEvent};
use crate::util::unix_millis;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Timeouts and room size used by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub room_list_timeout: Duration,
    pub max_players: u8,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(net::CONNECT_TIMEOUT_MS),
            room_list_timeout: Duration::from_millis(net::ROOM_LIST_TIMEOUT_MS),
            max_players: net::MAX_PLAYERS,
        }
    }
}

impl From<&ClientConfig> for ConnectionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            room_list_timeout: Duration::from_millis(config.room_list_timeout_ms),
            max_players: config.max_players,
        }
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_failures: u64,
    pub decode_failures: u64,
}

impl TrafficStats {
    fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
    }
}

/// One client-server session over a [`Transport`]
pub struct SessionConnection<T: Transport> {
    transport: T,
    session: Session,
    settings: ConnectionSettings,
    stats: TrafficStats,
    /// Events that arrived while a request was waiting for its reply
    backlog: VecDeque<SessionEvent>,
}

impl<T: Transport> SessionConnection<T> {
    pub fn new(transport: T, settings: ConnectionSettings) -> Self {
        Self {
            transport,
            session: Session::new(),
            settings,
            stats: TrafficStats::default(),
            backlog: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.session.player_id()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.session.room_id()
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    pub fn is_in_room(&self) -> bool {
        self.session.is_in_room()
    }

    pub fn room_info(&self) -> RoomInfo {
        self.session.room_info()
    }

    /// Open the transport, bounded by the connect timeout.
    /// Already connected is success.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.session.is_connected() {
            debug!("connect() while already connected");
            return Ok(());
        }

        self.session.begin_connect();
        let timeout = self.settings.connect_timeout;

        match tokio::time::timeout(timeout, self.transport.open()).await {
            Ok(Ok(player_id)) => {
                info!(player_id = %player_id, "Connected to session server");
                self.session.connected(player_id);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Connection failed: {}", e);
                self.transport.close();
                self.session.reset();
                Err(ConnectError::Transport(e.to_string()))
            }
            Err(_) => {
                warn!("Connection timed out after {:?}", timeout);
                self.transport.close();
                self.session.reset();
                Err(ConnectError::Timeout(timeout))
            }
        }
    }

    /// Close the transport and forget identity, room and membership.
    /// Emits no `Disconnected` event.
    pub fn disconnect(&mut self) {
        if self.session.status() != ConnectionStatus::Disconnected {
            info!("Disconnecting from session server");
        }
        self.transport.close();
        self.session.reset();
        self.backlog.clear();
    }

    /// Fire-and-forget send
    pub fn send(&mut self, message: &ClientMessage) {
        if !self.session.is_connected() {
            warn!(event = message.event_name(), "Not connected; message dropped");
            return;
        }

        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = message.event_name(), "Failed to encode message: {}", e);
                self.stats.send_failures += 1;
                return;
            }
        };

        let len = frame.len();
        match self.transport.send(frame) {
            Ok(()) => self.stats.record_sent(len),
            Err(e) => {
                warn!(event = message.event_name(), "Send failed: {}", e);
                self.stats.send_failures += 1;
            }
        }
    }

    pub fn create_room(&mut self, player: PlayerRecord) {
        let max_players = self.settings.max_players;
        self.send(&ClientMessage::CreateRoom {
            player_data: player,
            max_players,
        });
    }

    pub fn join_room(&mut self, room_id: RoomId, player: PlayerRecord) {
        debug!(room_id = %room_id, "Joining room");
        self.send(&ClientMessage::JoinRoom {
            room_id,
            player_data: player,
        });
    }

    /// Host only; otherwise a logged no-op
    pub fn start_game(&mut self) {
        let room_id = match (self.session.is_host(), self.session.room_id()) {
            (true, Some(room_id)) if self.session.is_connected() => room_id.to_string(),
            _ => {
                warn!("Cannot start game: not host or not connected");
                return;
            }
        };
        self.send(&ClientMessage::StartGame { room_id });
    }

    /// Tag a local snapshot with room, identity and time, then send it
    pub fn send_snapshot(&mut self, data: SnapshotData) {
        if !self.session.is_connected() {
            return;
        }
        let message = ClientMessage::PlayerUpdate(OutboundSnapshot {
            room_id: self.session.room_id().map(str::to_string),
            player_id: self.session.player_id().map(str::to_string),
            player_data: data,
            timestamp: unix_millis(),
        });
        self.send(&message);
    }

    pub fn send_action(&mut self, action: PlayerAction) {
        self.send(&ClientMessage::PlayerAction(action));
    }

    /// Relay a game-object change (coins, blocks) untouched
    pub fn send_object_update(&mut self, object_data: serde_json::Value) {
        if !self.session.is_connected() {
            return;
        }
        let message = ClientMessage::GameObjectUpdate(OutboundObjectUpdate {
            room_id: self.session.room_id().map(str::to_string),
            player_id: self.session.player_id().map(str::to_string),
            object_data,
            timestamp: unix_millis(),
        });
        self.send(&message);
    }

    /// Tell the server we left and forget the room locally
    pub fn leave_room(&mut self) {
        let (room_id, player_id) = match (self.session.room_id(), self.session.player_id()) {
            (Some(room), Some(player)) if self.session.is_connected() => {
                (room.to_string(), player.to_string())
            }
            _ => return,
        };
        info!(room_id = %room_id, "Leaving room");
        self.send(&ClientMessage::LeaveRoom { room_id, player_id });
        self.session.leave_room();
    }

    /// Leave a room we never meant to be in. The current room is only
    /// forgotten if it is that room.
    pub fn abandon_room(&mut self, room_id: &str) {
        let player_id = match self.session.player_id() {
            Some(player) if self.session.is_connected() => player.to_string(),
            _ => return,
        };
        info!(room_id, "Leaving unwanted room");
        self.send(&ClientMessage::LeaveRoom {
            room_id: room_id.to_string(),
            player_id,
        });
        if self.session.room_id() == Some(room_id) {
            self.session.leave_room();
        }
    }

    /// Ask for the room list. Resolves to an empty list on timeout,
    /// server error, transport loss, or when not connected.
    pub async fn request_room_list(&mut self) -> Vec<RoomSummary> {
        if !self.session.is_connected() {
            warn!("Room list requested while not connected");
            return Vec::new();
        }

        self.send(&ClientMessage::GetRoomList);
        let deadline = tokio::time::Instant::now() + self.settings.room_list_timeout;

        loop {
            match tokio::time::timeout_at(deadline, self.transport.recv()).await {
                Err(_) => {
                    warn!("Room list request timed out");
                    return Vec::new();
                }
                Ok(None) => {
                    self.handle_loss(None);
                    return Vec::new();
                }
                Ok(Some(TransportEvent::Closed(reason))) => {
                    self.handle_loss(reason);
                    return Vec::new();
                }
                Ok(Some(TransportEvent::Message(frame))) => match self.decode_frame(&frame) {
                    Some(ServerMessage::RoomList(rooms)) => {
                        let rooms = rooms.unwrap_or_default();
                        debug!(count = rooms.len(), "Received room list");
                        return rooms;
                    }
                    Some(ServerMessage::Error(e)) => {
                        warn!("Error while listing rooms: {}", e.message);
                        self.backlog.push_back(SessionEvent::Error { message: e.message });
                        return Vec::new();
                    }
                    Some(other) => {
                        if let Some(event) = self.accept(other) {
                            self.backlog.push_back(event);
                        }
                    }
                    None => {}
                },
            }
        }
    }

    /// Everything received since the last poll, with membership applied
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = self.backlog.drain(..).collect();
        if !self.session.is_connected() {
            return events;
        }

        while let Some(incoming) = self.transport.try_recv() {
            match incoming {
                TransportEvent::Message(frame) => {
                    if let Some(message) = self.decode_frame(&frame) {
                        events.extend(self.accept(message));
                    }
                }
                TransportEvent::Closed(reason) => {
                    self.handle_loss(reason);
                    events.extend(self.backlog.drain(..));
                    break;
                }
            }
        }
        events
    }

    fn decode_frame(&mut self, frame: &[u8]) -> Option<ServerMessage> {
        self.stats.record_received(frame.len());
        match decode::<ServerMessage>(frame) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Failed to decode server message: {}", e);
                self.stats.decode_failures += 1;
                None
            }
        }
    }

    fn accept(&mut self, message: ServerMessage) -> Option<SessionEvent> {
        self.session.apply(&message);
        let event = SessionEvent::from_server(message);
        if event.is_none() {
            debug!("Unsolicited room list dropped");
        }
        event
    }

    fn handle_loss(&mut self, reason: Option<String>) {
        warn!(?reason, "Connection lost");
        self.transport.close();
        self.session.reset();
        self.backlog.push_back(SessionEvent::Disconnected { reason });
    }
}
