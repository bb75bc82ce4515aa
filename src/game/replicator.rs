//! Local player authority and remote proxy replication
//!
//! The replicator owns exactly one local entity and any number of remote
//! proxies. Proxies appear on the first snapshot from an unseen peer and
//! leave only through [`PlayerReplicator::remove_remote`] or
//! [`PlayerReplicator::clear_remotes`].

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::game::constants::{player, replication};
use crate::game::player::{LocalInput, PlayerEntity};
use crate::game::presentation::{Presentation, SceneEvent};
use crate::net::protocol::{HealthReport, PlayerId, SnapshotData};
use crate::util::vec2::Vec2;

pub struct PlayerReplicator {
    local: PlayerEntity,
    remotes: FxHashMap<PlayerId, PlayerEntity>,
    last_snapshot_at: Option<u64>,
    snapshot_interval_ms: u64,
    interpolation_ms: u64,
}

impl PlayerReplicator {
    pub fn new(local_id: impl Into<PlayerId>, sprite: impl Into<String>, spawn: Vec2) -> Self {
        Self {
            local: PlayerEntity::new_local(local_id, sprite, spawn),
            remotes: FxHashMap::default(),
            last_snapshot_at: None,
            snapshot_interval_ms: replication::SNAPSHOT_INTERVAL_MS,
            interpolation_ms: replication::INTERPOLATION_MS,
        }
    }

    pub fn local(&self) -> &PlayerEntity {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut PlayerEntity {
        &mut self.local
    }

    pub fn local_id(&self) -> &str {
        self.local.id()
    }

    pub fn remote(&self, id: &str) -> Option<&PlayerEntity> {
        self.remotes.get(id)
    }

    pub fn remote_mut(&mut self, id: &str) -> Option<&mut PlayerEntity> {
        self.remotes.get_mut(id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.remotes.values()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Local entity or proxy by identity
    pub fn entity(&self, id: &str) -> Option<&PlayerEntity> {
        if id == self.local.id() {
            Some(&self.local)
        } else {
            self.remotes.get(id)
        }
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut PlayerEntity> {
        if id == self.local.id() {
            Some(&mut self.local)
        } else {
            self.remotes.get_mut(id)
        }
    }

    /// Every entity, local first
    pub fn entities(&self) -> impl Iterator<Item = &PlayerEntity> {
        std::iter::once(&self.local).chain(self.remotes.values())
    }

    /// Apply one tick of local input and integrate movement.
    /// Returns true if the animation label changed.
    pub fn tick_local(&mut self, input: LocalInput, dt: f32) -> bool {
        let previous = self.local.animation().to_string();
        self.local.apply_input(input);
        self.local.integrate(dt);
        previous != self.local.animation()
    }

    /// The local snapshot, once per snapshot interval
    pub fn take_due_snapshot(&mut self, now: u64) -> Option<SnapshotData> {
        if let Some(last) = self.last_snapshot_at {
            if now.saturating_sub(last) < self.snapshot_interval_ms {
                return None;
            }
        }
        self.last_snapshot_at = Some(now);
        Some(self.local.snapshot())
    }

    /// Apply a peer's snapshot. Creates the proxy on first sight, otherwise
    /// tweens toward the new position. Returns false if ignored.
    pub fn apply_snapshot(
        &mut self,
        sender: &str,
        data: &SnapshotData,
        now: u64,
        presentation: &mut dyn Presentation,
    ) -> bool {
        if sender == self.local.id() {
            return false;
        }
        let target = Vec2::new(data.x, data.y);
        if !target.is_finite() {
            warn!(player_id = %sender, "Dropping snapshot with invalid position");
            return false;
        }

        let animation = data.animation_or_idle();
        match self.remotes.get_mut(sender) {
            Some(proxy) => {
                proxy.tween_to(target, now, self.interpolation_ms);
                proxy.velocity = Vec2::new(data.velocity_x, data.velocity_y);
                proxy.flip_x = data.flip_x;
                if proxy.set_animation(animation) {
                    presentation.play_animation(sender, animation);
                }
                trace!(player_id = %sender, x = data.x, y = data.y, "Proxy snapshot");
            }
            None => {
                let sprite = data
                    .sprite
                    .clone()
                    .unwrap_or_else(|| player::DEFAULT_SPRITE.to_string());
                let mut proxy = PlayerEntity::new_remote(sender, sprite.clone(), target);
                proxy.velocity = Vec2::new(data.velocity_x, data.velocity_y);
                proxy.flip_x = data.flip_x;
                proxy.set_animation(animation);

                debug!(player_id = %sender, sprite = %sprite, "Remote player created");
                self.remotes.insert(sender.to_string(), proxy);
                presentation.emit_scene_event(SceneEvent::PlayerSpawned {
                    player_id: sender.to_string(),
                    sprite,
                });
                presentation.play_animation(sender, animation);
            }
        }
        true
    }

    /// Destroy a proxy immediately
    pub fn remove_remote(&mut self, id: &str, presentation: &mut dyn Presentation) -> bool {
        if self.remotes.remove(id).is_some() {
            debug!(player_id = %id, "Remote player removed");
            presentation.destroy_entity(id);
            true
        } else {
            false
        }
    }

    /// Destroy every proxy; returns how many were removed
    pub fn clear_remotes(&mut self, presentation: &mut dyn Presentation) -> usize {
        let count = self.remotes.len();
        for (id, _) in self.remotes.drain() {
            presentation.destroy_entity(&id);
        }
        count
    }

    /// Apply health reported by a peer for its own entity
    pub fn apply_health_report(
        &mut self,
        sender: &str,
        report: HealthReport,
        presentation: &mut dyn Presentation,
    ) -> bool {
        let Some(proxy) = self.remotes.get_mut(sender) else {
            return false;
        };
        if !proxy.apply_reported_health(report) {
            return false;
        }
        let health = proxy.health();
        presentation.emit_scene_event(SceneEvent::HealthChanged {
            player_id: sender.to_string(),
            is_local: false,
            current: health.current(),
            max: health.max(),
        });
        true
    }

    /// Advance proxy interpolation
    pub fn advance(&mut self, now: u64) {
        for proxy in self.remotes.values_mut() {
            proxy.advance_tween(now);
        }
    }

    /// Replace a dead local entity with a fresh one at `spawn`
    pub fn respawn_local(&mut self, spawn: Vec2) {
        let id = self.local.id().to_string();
        let sprite = self.local.sprite().to_string();
        self.local = PlayerEntity::new_local(id, sprite, spawn);
        self.last_snapshot_at = None;
    }
}
