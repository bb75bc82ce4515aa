//! Optional rendering/audio collaborator
//!
//! Gameplay never depends on a presentation being present. Every method has
//! a no-op default so a renderer implements only what it can show.

use crate::net::protocol::PlayerId;

/// Scene-level notifications for the HUD and restart flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// A proxy appeared for a newly seen peer
    PlayerSpawned { player_id: PlayerId, sprite: String },
    /// Health changed; the local HUD shows "HP: current/max"
    HealthChanged {
        player_id: PlayerId,
        is_local: bool,
        current: i32,
        max: i32,
    },
    /// The local player died; the scene runs its restart path
    PlayerDied { player_id: PlayerId },
}

pub trait Presentation {
    fn play_animation(&mut self, _entity: &str, _label: &str) {}

    fn emit_scene_event(&mut self, _event: SceneEvent) {}

    fn destroy_entity(&mut self, _entity: &str) {}
}

/// Presentation that shows nothing; used by the headless client
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl Presentation for Headless {}
