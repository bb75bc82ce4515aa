use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::game::constants::animation;
use crate::lobby::room::{PlayerRecord, RoomSummary};

/// Server-assigned identity token
pub type PlayerId = String;
pub type RoomId = String;

/// Messages from client to server
///
/// Wire form: `{"event": "<name>", "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        player_data: PlayerRecord,
        max_players: u8,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        player_data: PlayerRecord,
    },
    GetRoomList,
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: RoomId },
    /// Periodic snapshot of the local player
    PlayerUpdate(OutboundSnapshot),
    PlayerAction(PlayerAction),
    GameObjectUpdate(OutboundObjectUpdate),
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId, player_id: PlayerId },
}

impl ClientMessage {
    /// Wire event name
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "createRoom",
            ClientMessage::JoinRoom { .. } => "joinRoom",
            ClientMessage::GetRoomList => "getRoomList",
            ClientMessage::StartGame { .. } => "startGame",
            ClientMessage::PlayerUpdate(_) => "playerUpdate",
            ClientMessage::PlayerAction(_) => "playerAction",
            ClientMessage::GameObjectUpdate(_) => "gameObjectUpdate",
            ClientMessage::LeaveRoom { .. } => "leaveRoom",
        }
    }
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    RoomCreated(RoomSnapshot),
    RoomJoined(RoomSnapshot),
    PlayerJoined(MemberChange),
    PlayerLeft(MemberChange),
    GameStarted(GameStarted),
    PlayerUpdate(RemoteSnapshot),
    GameObjectUpdate(RemoteObjectUpdate),
    PlayerAction(RemoteAction),
    /// Reply to `getRoomList`; the server may send `null` for "no rooms"
    RoomList(Option<Vec<RoomSummary>>),
    Error(ServerError),
    RoomError(RoomErrorPayload),
}

/// Player state carried by `playerUpdate` in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    /// True when the sprite faces right
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(default, alias = "playerSprite", skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
}

impl SnapshotData {
    /// Animation label, falling back to idle when the peer sent none
    pub fn animation_or_idle(&self) -> &str {
        self.animation.as_deref().unwrap_or(animation::IDLE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundSnapshot {
    pub room_id: Option<RoomId>,
    pub player_id: Option<PlayerId>,
    pub player_data: SnapshotData,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundObjectUpdate {
    pub room_id: Option<RoomId>,
    pub player_id: Option<PlayerId>,
    pub object_data: serde_json::Value,
    pub timestamp: u64,
}

/// Horizontal facing carried by attack actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn from_flip_x(flip_x: bool) -> Self {
        if flip_x {
            Facing::Right
        } else {
            Facing::Left
        }
    }

    /// +1 for right, -1 for left
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

/// Gameplay action relayed to peers
///
/// Wire form: `{"action": "kick" | "healthUpdate", "actionData": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "actionData", rename_all = "camelCase")]
pub enum PlayerAction {
    Kick(KickAction),
    HealthUpdate(HealthReport),
}

/// Parameters of a kick. Missing fields take the kick defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Facing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f32>,
    /// Lifetime in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_use: Option<bool>,
}

/// Authoritative health published by the entity's owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub health: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    #[serde(default)]
    pub players: HashMap<PlayerId, PlayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberChange {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_data: Option<PlayerRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStarted {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    pub player_id: PlayerId,
    pub player_data: SnapshotData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObjectUpdate {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub object_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAction {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub action: PlayerAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomErrorPayload {
    #[serde(default, alias = "message")]
    pub error: String,
}

/// Encode a message as a JSON frame body
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(message).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a JSON frame body
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
