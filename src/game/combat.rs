//! Hit-volume combat
//!
//! Each client runs the same overlap test for every volume, its own and the
//! ones mirrored from peers' kicks, but only decides damage for its own
//! local entity. Contacts with proxies are recorded without a damage
//! decision so a single-use volume is consumed identically on every peer.

use smallvec::SmallVec;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::constants::{animation, combat};
use crate::game::player::{DamageOutcome, HealthState, PlayerEntity};
use crate::game::presentation::{Presentation, SceneEvent};
use crate::game::replicator::PlayerReplicator;
use crate::net::protocol::{Facing, KickAction, PlayerId};
use crate::util::vec2::{Rect, Vec2};

/// Geometry and behaviour of a hit-volume
#[derive(Debug, Clone, PartialEq)]
pub struct HitVolumeConfig {
    pub width: f32,
    pub height: f32,
    pub ttl_ms: u64,
    pub damage: u32,
    /// Defaults to the owner's facing at spawn
    pub direction: Option<Facing>,
    pub single_use: bool,
    /// Defaults to just in front of the owner's body
    pub offset_x: Option<f32>,
    pub offset_y: f32,
}

impl Default for HitVolumeConfig {
    fn default() -> Self {
        Self {
            width: combat::DEFAULT_WIDTH,
            height: combat::DEFAULT_HEIGHT,
            ttl_ms: combat::DEFAULT_TTL_MS,
            damage: combat::DEFAULT_DAMAGE,
            direction: None,
            single_use: false,
            offset_x: None,
            offset_y: 0.0,
        }
    }
}

impl HitVolumeConfig {
    pub fn kick() -> Self {
        Self {
            width: combat::KICK_WIDTH,
            height: combat::KICK_HEIGHT,
            ttl_ms: combat::KICK_TTL_MS,
            damage: combat::KICK_DAMAGE,
            offset_y: combat::KICK_OFFSET_Y,
            ..Default::default()
        }
    }

    /// Config for a kick received from a peer. Missing fields take the kick
    /// defaults and the direction falls back to `facing`.
    pub fn from_kick(kick: &KickAction, facing: Facing) -> Self {
        let defaults = Self::kick();
        Self {
            width: kick.width.unwrap_or(defaults.width),
            height: kick.height.unwrap_or(defaults.height),
            ttl_ms: kick.duration.unwrap_or(defaults.ttl_ms),
            damage: kick.damage.unwrap_or(defaults.damage),
            direction: Some(kick.direction.unwrap_or(facing)),
            single_use: kick.single_use.unwrap_or(false),
            offset_x: None,
            offset_y: kick.offset_y.unwrap_or(defaults.offset_y),
        }
    }

    /// Wire form of this config as a kick in `facing`
    pub fn to_kick_action(&self, facing: Facing) -> KickAction {
        KickAction {
            direction: Some(self.direction.unwrap_or(facing)),
            damage: Some(self.damage),
            width: Some(self.width),
            height: Some(self.height),
            offset_y: Some(self.offset_y),
            duration: Some(self.ttl_ms),
            single_use: Some(self.single_use),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitVolumeHandle(Uuid);

#[derive(Debug)]
struct HitVolume {
    id: Uuid,
    owner: PlayerId,
    offset: Vec2,
    rect: Rect,
    expires_at: u64,
    damage: u32,
    single_use: bool,
    hits: SmallVec<[PlayerId; 4]>,
    spent: bool,
}

impl HitVolume {
    fn follow(&mut self, owner_position: Vec2) {
        self.rect.center = owner_position + self.offset;
    }

    fn record_hit(&mut self, target: &str) {
        self.hits.push(target.to_string());
        if self.single_use {
            self.spent = true;
        }
    }
}

/// Outcome of one combat update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombatEvent {
    /// The local entity took damage; peers learn through a health update
    LocalDamaged {
        attacker: PlayerId,
        health: HealthState,
        died: bool,
    },
    /// A volume touched a proxy; recorded, no damage decided here
    RemoteContact { attacker: PlayerId, target: PlayerId },
}

#[derive(Debug, Default)]
pub struct CombatReconciler {
    volumes: Vec<HitVolume>,
}

impl CombatReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_active(&self, handle: HitVolumeHandle) -> bool {
        self.volumes.iter().any(|v| v.id == handle.0)
    }

    /// Current area of an active volume
    pub fn volume_rect(&self, handle: HitVolumeHandle) -> Option<Rect> {
        self.volumes.iter().find(|v| v.id == handle.0).map(|v| v.rect)
    }

    pub fn spawn_hit_volume(
        &mut self,
        owner: &PlayerEntity,
        config: &HitVolumeConfig,
        now: u64,
    ) -> HitVolumeHandle {
        let direction = config.direction.unwrap_or_else(|| owner.facing());
        let offset_x = config
            .offset_x
            .unwrap_or((owner.body_width() / 2.0 + config.width / 2.0) * direction.sign());
        let offset = Vec2::new(offset_x, config.offset_y);

        let id = Uuid::new_v4();
        self.volumes.push(HitVolume {
            id,
            owner: owner.id().to_string(),
            offset,
            rect: Rect::new(owner.position + offset, config.width, config.height),
            expires_at: now.saturating_add(config.ttl_ms),
            damage: config.damage,
            single_use: config.single_use,
            hits: SmallVec::new(),
            spent: false,
        });
        debug!(owner = %owner.id(), volume = %id, "Hit volume spawned");
        HitVolumeHandle(id)
    }

    /// Expire, follow and resolve overlaps for every volume
    pub fn update(
        &mut self,
        now: u64,
        replicator: &mut PlayerReplicator,
        presentation: &mut dyn Presentation,
    ) -> Vec<CombatEvent> {
        self.volumes.retain(|v| now < v.expires_at);

        let mut events = Vec::new();
        for volume in &mut self.volumes {
            let Some(owner) = replicator.entity(&volume.owner) else {
                volume.spent = true;
                continue;
            };
            volume.follow(owner.position);

            let mut targets: SmallVec<[(PlayerId, bool); 4]> = replicator
                .entities()
                .filter(|e| {
                    e.id() != volume.owner
                        && !e.is_dead()
                        && !volume.hits.iter().any(|h| h == e.id())
                        && volume.rect.overlaps(&e.body_rect())
                })
                .map(|e| (e.id().to_string(), e.is_local()))
                .collect();
            targets.sort_unstable();

            for (target, is_local) in targets {
                if volume.spent {
                    break;
                }
                if !is_local {
                    volume.record_hit(&target);
                    events.push(CombatEvent::RemoteContact {
                        attacker: volume.owner.clone(),
                        target,
                    });
                    continue;
                }

                let local = replicator.local_mut();
                match local.take_damage(volume.damage, now) {
                    DamageOutcome::Applied { health, died } => {
                        volume.record_hit(&target);
                        presentation.emit_scene_event(SceneEvent::HealthChanged {
                            player_id: target.clone(),
                            is_local: true,
                            current: health.current(),
                            max: health.max(),
                        });
                        if died {
                            info!(attacker = %volume.owner, "Local player was defeated");
                            presentation.play_animation(&target, animation::DEAD);
                            presentation.emit_scene_event(SceneEvent::PlayerDied {
                                player_id: target,
                            });
                        }
                        events.push(CombatEvent::LocalDamaged {
                            attacker: volume.owner.clone(),
                            health,
                            died,
                        });
                    }
                    DamageOutcome::CoolingDown | DamageOutcome::Ignored => {}
                }
            }
        }

        self.volumes.retain(|v| !v.spent);
        events
    }

    /// Reproduce a peer's kick: turn the proxy, play the attack animation
    /// and spawn the same volume. None if the attacker has no proxy or
    /// its proxy is dead.
    pub fn mirror_remote_kick(
        &mut self,
        attacker: &str,
        kick: &KickAction,
        now: u64,
        replicator: &mut PlayerReplicator,
        presentation: &mut dyn Presentation,
    ) -> Option<HitVolumeHandle> {
        let proxy = replicator.remote_mut(attacker)?;
        if proxy.is_dead() {
            debug!(attacker, "Kick from a dead player ignored");
            return None;
        }
        let direction = kick.direction.unwrap_or_else(|| proxy.facing());
        proxy.face(direction);
        proxy.set_animation(animation::ATTACK);
        presentation.play_animation(attacker, animation::ATTACK);

        let config = HitVolumeConfig::from_kick(kick, direction);
        Some(self.spawn_hit_volume(proxy, &config, now))
    }

    /// Drop every volume not owned by `local_id`
    pub fn clear_remote_volumes(&mut self, local_id: &str) -> usize {
        let before = self.volumes.len();
        self.volumes.retain(|v| v.owner == local_id);
        before - self.volumes.len()
    }

    pub fn clear(&mut self) {
        self.volumes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presentation::recording::Recording;
    use crate::net::protocol::{HealthReport, SnapshotData};

    fn snapshot_at(x: f32, y: f32) -> SnapshotData {
        SnapshotData {
            x,
            y,
            velocity_x: 0.0,
            velocity_y: 0.0,
            flip_x: false,
            animation: None,
            sprite: Some("walt".to_string()),
        }
    }

    /// Local "p1" at the origin facing right, proxy "p2" 40 units to its left
    fn world() -> (PlayerReplicator, Recording) {
        let mut rec = Recording::default();
        let mut replicator = PlayerReplicator::new("p1", "vanoSprite", Vec2::ZERO);
        replicator.apply_snapshot("p2", &snapshot_at(-40.0, 0.0), 0, &mut rec);
        (replicator, rec)
    }

    #[test]
    fn test_kick_defaults() {
        let config = HitVolumeConfig::from_kick(&KickAction::default(), Facing::Left);
        assert_eq!(config.width, 54.0);
        assert_eq!(config.height, 40.0);
        assert_eq!(config.offset_y, -10.0);
        assert_eq!(config.ttl_ms, 180);
        assert_eq!(config.damage, 1);
        assert_eq!(config.direction, Some(Facing::Left));
        assert!(!config.single_use);

        let generic = HitVolumeConfig::default();
        assert_eq!((generic.width, generic.height, generic.ttl_ms), (48.0, 32.0, 200));
    }

    #[test]
    fn test_kick_action_roundtrip_keeps_fields() {
        let config = HitVolumeConfig {
            single_use: true,
            ..HitVolumeConfig::kick()
        };
        let action = config.to_kick_action(Facing::Right);
        assert_eq!(HitVolumeConfig::from_kick(&action, Facing::Left), HitVolumeConfig {
            direction: Some(Facing::Right),
            ..config
        });
    }

    #[test]
    fn test_default_offset_in_front_of_owner() {
        let (replicator, _) = world();
        let mut combat = CombatReconciler::new();

        let handle = combat.spawn_hit_volume(replicator.local(), &HitVolumeConfig::kick(), 0);
        let rect = combat.volume_rect(handle).unwrap();
        // half body (24) + half kick (27)
        assert_eq!(rect.center, Vec2::new(51.0, -10.0));

        let left = HitVolumeConfig {
            direction: Some(Facing::Left),
            ..HitVolumeConfig::kick()
        };
        let handle = combat.spawn_hit_volume(replicator.local(), &left, 0);
        assert_eq!(combat.volume_rect(handle).unwrap().center.x, -51.0);
    }

    #[test]
    fn test_volume_follows_owner_and_expires() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let handle = combat.spawn_hit_volume(replicator.local(), &HitVolumeConfig::kick(), 0);

        replicator.local_mut().position = Vec2::new(500.0, 0.0);
        combat.update(16, &mut replicator, &mut rec);
        assert_eq!(combat.volume_rect(handle).unwrap().center.x, 551.0);

        combat.update(179, &mut replicator, &mut rec);
        assert!(combat.is_active(handle));
        combat.update(180, &mut replicator, &mut rec);
        assert!(!combat.is_active(handle));
    }

    #[test]
    fn test_single_use_volume_damages_once() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();

        // p2 kicks toward p1 (to its right)
        let kick = KickAction {
            direction: Some(Facing::Right),
            single_use: Some(true),
            ..Default::default()
        };
        let handle = combat
            .mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec)
            .unwrap();

        // Overlapping at tick 10 and tick 11
        let first = combat.update(10 * 16, &mut replicator, &mut rec);
        let second = combat.update(11 * 16, &mut replicator, &mut rec);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(replicator.local().health().current(), 9);
        assert!(!combat.is_active(handle));
        assert_eq!(rec.health_changes(), vec![("p1".to_string(), 9)]);
    }

    #[test]
    fn test_multi_use_volume_hits_each_target_once() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let kick = KickAction {
            direction: Some(Facing::Right),
            ..Default::default()
        };
        let handle = combat
            .mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec)
            .unwrap();

        for tick in 0..10 {
            combat.update(tick * 16, &mut replicator, &mut rec);
        }
        assert_eq!(replicator.local().health().current(), 9);
        assert!(combat.is_active(handle));
    }

    #[test]
    fn test_cooldown_suppresses_second_volume() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let kick = KickAction {
            direction: Some(Facing::Right),
            ..Default::default()
        };
        for _ in 0..2 {
            combat.mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec);
        }

        let events = combat.update(16, &mut replicator, &mut rec);
        assert_eq!(events.len(), 1);
        assert_eq!(replicator.local().health().current(), 9);

        // The suppressed volume was not marked, so it lands after the cooldown
        let events = combat.update(16 + 150, &mut replicator, &mut rec);
        assert_eq!(events.len(), 1);
        assert_eq!(replicator.local().health().current(), 8);
    }

    #[test]
    fn test_local_volume_records_remote_contact_without_damage() {
        let (mut replicator, mut rec) = world();
        replicator.local_mut().face(Facing::Left);
        let mut combat = CombatReconciler::new();
        let config = HitVolumeConfig {
            single_use: true,
            ..HitVolumeConfig::kick()
        };
        let handle = combat.spawn_hit_volume(replicator.local(), &config, 0);

        let events = combat.update(16, &mut replicator, &mut rec);
        assert_eq!(
            events,
            vec![CombatEvent::RemoteContact {
                attacker: "p1".to_string(),
                target: "p2".to_string()
            }]
        );
        assert_eq!(replicator.remote("p2").unwrap().health().current(), 10);
        assert!(!combat.is_active(handle));
    }

    #[test]
    fn test_lethal_hit_kills_and_stops_damage() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let kick = KickAction {
            direction: Some(Facing::Right),
            damage: Some(25),
            ..Default::default()
        };
        combat.mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec);
        let events = combat.update(16, &mut replicator, &mut rec);

        assert!(matches!(
            events[0],
            CombatEvent::LocalDamaged { died: true, .. }
        ));
        assert_eq!(replicator.local().health().current(), 0);
        assert!(rec.died());

        combat.mirror_remote_kick("p2", &kick, 500, &mut replicator, &mut rec);
        assert!(combat.update(516, &mut replicator, &mut rec).is_empty());
    }

    #[test]
    fn test_owner_removed_drops_volume() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let handle = combat
            .mirror_remote_kick("p2", &KickAction::default(), 0, &mut replicator, &mut rec)
            .unwrap();

        replicator.remove_remote("p2", &mut rec);
        combat.update(16, &mut replicator, &mut rec);
        assert!(!combat.is_active(handle));
    }

    #[test]
    fn test_mirror_turns_proxy_and_plays_attack() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let kick = KickAction {
            direction: Some(Facing::Right),
            ..Default::default()
        };
        combat.mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec);

        let proxy = replicator.remote("p2").unwrap();
        assert!(proxy.flip_x);
        assert_eq!(proxy.animation(), animation::ATTACK);
        assert!(rec
            .animations
            .contains(&("p2".to_string(), animation::ATTACK.to_string())));

        assert!(combat
            .mirror_remote_kick("ghost", &kick, 0, &mut replicator, &mut rec)
            .is_none());
    }

    #[test]
    fn test_dead_proxy_cannot_kick() {
        let (mut replicator, mut rec) = world();
        replicator.apply_health_report(
            "p2",
            HealthReport {
                health: 0,
                max_health: None,
            },
            &mut rec,
        );
        let mut combat = CombatReconciler::new();
        let kick = KickAction {
            direction: Some(Facing::Right),
            ..Default::default()
        };

        assert!(combat
            .mirror_remote_kick("p2", &kick, 0, &mut replicator, &mut rec)
            .is_none());
        assert_eq!(combat.active_count(), 0);
        assert_eq!(replicator.remote("p2").unwrap().animation(), animation::DEAD);
        assert!(combat.update(16, &mut replicator, &mut rec).is_empty());
        assert_eq!(replicator.local().health().current(), 10);
    }

    #[test]
    fn test_clear_remote_volumes_keeps_local() {
        let (mut replicator, mut rec) = world();
        let mut combat = CombatReconciler::new();
        let local = combat.spawn_hit_volume(replicator.local(), &HitVolumeConfig::kick(), 0);
        combat.mirror_remote_kick("p2", &KickAction::default(), 0, &mut replicator, &mut rec);

        assert_eq!(combat.clear_remote_volumes("p1"), 1);
        assert!(combat.is_active(local));
        assert_eq!(combat.active_count(), 1);
    }
}
