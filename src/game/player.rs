//! Player entities: the local authoritative player and remote proxies

use tracing::debug;

use crate::game::constants::{animation, combat, player};
use crate::net::protocol::{Facing, HealthReport, PlayerId, SnapshotData};
use crate::util::vec2::{Rect, Vec2};

/// Held directional keys for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl LocalInput {
    pub fn is_moving(&self) -> bool {
        self.left || self.right || self.up || self.down
    }

    /// Velocity for these keys. Right wins over left and down over up
    /// when both are held.
    pub fn velocity(&self) -> Vec2 {
        let speed = player::WALK_VELOCITY;
        let mut v = Vec2::ZERO;
        if self.left {
            v.x = -speed;
        }
        if self.right {
            v.x = speed;
        }
        if self.up {
            v.y = -speed;
        }
        if self.down {
            v.y = speed;
        }
        if v.x != 0.0 && v.y != 0.0 {
            let diagonal = speed * player::DIAGONAL_SCALE;
            v = Vec2::new(diagonal.copysign(v.x), diagonal.copysign(v.y));
        }
        v
    }
}

/// Health clamped to `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    current: i32,
    max: i32,
}

impl HealthState {
    pub fn full(max: i32) -> Self {
        let max = max.max(1);
        Self { current: max, max }
    }

    pub fn new(current: i32, max: i32) -> Self {
        let max = max.max(1);
        Self {
            current: current.clamp(0, max),
            max,
        }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_depleted(&self) -> bool {
        self.current == 0
    }

    fn subtract(&mut self, amount: u32) {
        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.current = self.current.saturating_sub(amount).clamp(0, self.max);
    }

    fn report(&mut self, report: HealthReport) {
        if let Some(max) = report.max_health {
            self.max = max.max(1);
        }
        self.current = report.health.clamp(0, self.max);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead,
}

/// Outcome of [`PlayerEntity::take_damage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Applied { health: HealthState, died: bool },
    /// Inside the per-entity damage cooldown
    CoolingDown,
    /// Already dead, or not ours to damage
    Ignored,
}

impl DamageOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, DamageOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    from: Vec2,
    to: Vec2,
    started_at: u64,
    duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PlayerEntity {
    id: PlayerId,
    is_local: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    /// True when facing right
    pub flip_x: bool,
    animation: String,
    sprite: String,
    health: HealthState,
    life: LifeState,
    last_damage_at: Option<u64>,
    body: Vec2,
    tween: Option<Tween>,
}

impl PlayerEntity {
    pub fn new_local(id: impl Into<PlayerId>, sprite: impl Into<String>, position: Vec2) -> Self {
        Self::new(id.into(), true, sprite.into(), position)
    }

    pub fn new_remote(id: impl Into<PlayerId>, sprite: impl Into<String>, position: Vec2) -> Self {
        Self::new(id.into(), false, sprite.into(), position)
    }

    fn new(id: PlayerId, is_local: bool, sprite: String, position: Vec2) -> Self {
        Self {
            id,
            is_local,
            position,
            velocity: Vec2::ZERO,
            flip_x: true,
            animation: animation::IDLE.to_string(),
            sprite,
            health: HealthState::full(player::MAX_HEALTH),
            life: LifeState::Alive,
            last_damage_at: None,
            body: Vec2::new(player::BODY_WIDTH, player::BODY_HEIGHT),
            tween: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fixed at construction
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn sprite(&self) -> &str {
        &self.sprite
    }

    pub fn animation(&self) -> &str {
        &self.animation
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn life(&self) -> LifeState {
        self.life
    }

    pub fn is_dead(&self) -> bool {
        self.life == LifeState::Dead
    }

    pub fn facing(&self) -> Facing {
        Facing::from_flip_x(self.flip_x)
    }

    pub fn body_width(&self) -> f32 {
        self.body.x
    }

    pub fn body_rect(&self) -> Rect {
        Rect::new(self.position, self.body.x, self.body.y)
    }

    /// Set the animation label; returns true if it changed
    pub fn set_animation(&mut self, label: &str) -> bool {
        if self.animation == label {
            return false;
        }
        self.animation.clear();
        self.animation.push_str(label);
        true
    }

    pub fn face(&mut self, facing: Facing) {
        self.flip_x = facing == Facing::Right;
    }

    /// Translate held keys into velocity, facing and animation.
    /// Dead players ignore input.
    pub fn apply_input(&mut self, input: LocalInput) {
        if self.is_dead() {
            self.velocity = Vec2::ZERO;
            return;
        }
        if input.left {
            self.flip_x = false;
        }
        if input.right {
            self.flip_x = true;
        }
        self.velocity = input.velocity();
        let label = if input.is_moving() {
            animation::WALK
        } else {
            animation::IDLE
        };
        self.set_animation(label);
    }

    pub fn integrate(&mut self, dt: f32) {
        if self.is_dead() {
            return;
        }
        self.position += self.velocity * dt;
    }

    /// Apply combat damage. Only the local entity takes damage here;
    /// hits inside the cooldown window are refused.
    pub fn take_damage(&mut self, amount: u32, now: u64) -> DamageOutcome {
        if !self.is_local || self.is_dead() {
            return DamageOutcome::Ignored;
        }
        if let Some(last) = self.last_damage_at {
            if now.saturating_sub(last) < combat::DAMAGE_COOLDOWN_MS {
                return DamageOutcome::CoolingDown;
            }
        }
        self.last_damage_at = Some(now);
        self.health.subtract(amount);

        let died = self.health.is_depleted();
        if died {
            debug!(player_id = %self.id, "Local player died");
            self.life = LifeState::Dead;
            self.velocity = Vec2::ZERO;
            self.set_animation(animation::DEAD);
        }
        DamageOutcome::Applied {
            health: self.health,
            died,
        }
    }

    /// Apply health reported by the entity's owner. Never touches the
    /// local entity. Life follows the reported value, so a respawned
    /// peer comes back. Returns true if applied.
    pub fn apply_reported_health(&mut self, report: HealthReport) -> bool {
        if self.is_local {
            return false;
        }
        self.health.report(report);
        match (self.life, self.health.is_depleted()) {
            (LifeState::Alive, true) => {
                self.life = LifeState::Dead;
                self.set_animation(animation::DEAD);
            }
            (LifeState::Dead, false) => {
                debug!(player_id = %self.id, "Remote player back to life");
                self.life = LifeState::Alive;
                self.set_animation(animation::IDLE);
            }
            _ => {}
        }
        true
    }

    pub fn snapshot(&self) -> SnapshotData {
        SnapshotData {
            x: self.position.x,
            y: self.position.y,
            velocity_x: self.velocity.x,
            velocity_y: self.velocity.y,
            flip_x: self.flip_x,
            animation: Some(self.animation.clone()),
            sprite: Some(self.sprite.clone()),
        }
    }

    /// Start moving toward `target` over `duration_ms`
    pub fn tween_to(&mut self, target: Vec2, now: u64, duration_ms: u64) {
        self.tween = Some(Tween {
            from: self.position,
            to: target,
            started_at: now,
            duration_ms,
        });
    }

    /// Advance an active tween; returns true while one is running
    pub fn advance_tween(&mut self, now: u64) -> bool {
        let Some(tween) = self.tween else {
            return false;
        };
        let elapsed = now.saturating_sub(tween.started_at);
        if tween.duration_ms == 0 || elapsed >= tween.duration_ms {
            self.position = tween.to;
            self.tween = None;
            return false;
        }
        let t = elapsed as f32 / tween.duration_ms as f32;
        self.position = tween.from.lerp(tween.to, t);
        true
    }

    pub fn tween_target(&self) -> Option<Vec2> {
        self.tween.map(|t| t.to)
    }
}
