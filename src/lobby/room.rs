use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::net::protocol::{PlayerId, RoomId};

/// One entry of the server's room list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    #[serde(default)]
    pub player_count: u32,
    #[serde(default)]
    pub max_players: u32,
}

impl RoomSummary {
    pub fn is_full(&self) -> bool {
        self.max_players > 0 && self.player_count >= self.max_players
    }
}

/// Public profile of a room member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sprite: String,
    /// Unix milliseconds
    #[serde(default)]
    pub joined_at: u64,
}

impl PlayerRecord {
    pub fn new(name: impl Into<String>, sprite: impl Into<String>, joined_at: u64) -> Self {
        Self {
            name: name.into(),
            sprite: sprite.into(),
            joined_at,
        }
    }
}

/// Members of the current room, keyed by identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomMembership {
    members: HashMap<PlayerId, PlayerRecord>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole membership (roomCreated / roomJoined)
    pub fn replace(&mut self, members: HashMap<PlayerId, PlayerRecord>) {
        self.members = members;
    }

    /// Add or update a member (playerJoined)
    pub fn insert(&mut self, player_id: PlayerId, record: PlayerRecord) {
        self.members.insert(player_id, record);
    }

    /// Remove a member (playerLeft)
    pub fn remove(&mut self, player_id: &str) -> Option<PlayerRecord> {
        self.members.remove(player_id)
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.members.get(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &PlayerRecord)> {
        self.members.iter()
    }

    /// Members ordered by join time, then identity
    pub fn sorted(&self) -> Vec<(PlayerId, PlayerRecord)> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        members.sort_by(|a, b| a.1.joined_at.cmp(&b.1.joined_at).then_with(|| a.0.cmp(&b.0)));
        members
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
