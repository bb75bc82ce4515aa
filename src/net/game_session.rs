//! Game session - runs the client tick and exchanges gameplay state with peers
//!
//! One tick, in order: dispatch inbound events, move the local player,
//! spawn local attacks, resolve overlaps, advance proxy interpolation and
//! send the snapshot when due.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::combat::{CombatEvent, CombatReconciler, HitVolumeConfig};
use crate::game::constants::{animation, replication};
use crate::game::input_buffer::{InputBuffer, InputSender};
use crate::game::presentation::Presentation;
use crate::game::replicator::PlayerReplicator;
use crate::lobby::driver::GameStartHandoff;
use crate::lobby::machine::SessionContext;
use crate::net::connection::SessionConnection;
use crate::net::dispatch::{EventKind, HandlerTable, SessionEvent};
use crate::net::protocol::{HealthReport, PlayerAction, RemoteObjectUpdate};
use crate::net::transport::Transport;
use crate::util::vec2::Vec2;

/// Identity used for the local entity when playing offline
pub const OFFLINE_IDENTITY: &str = "local";

/// Why the game loop handed control back to the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEnd {
    /// The transport dropped
    Disconnected { reason: Option<String> },
    /// We left the room
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Ended(GameEnd),
}

/// Gameplay state the event handlers operate on
pub struct GameWorld<P: Presentation> {
    pub replicator: PlayerReplicator,
    pub combat: CombatReconciler,
    pub presentation: P,
    /// Clock of the tick being dispatched
    now: u64,
    object_updates: Vec<RemoteObjectUpdate>,
    ended: Option<GameEnd>,
}

impl<P: Presentation> GameWorld<P> {
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Drop every proxy and every volume a peer owns
    fn teardown_remotes(&mut self) {
        let proxies = self.replicator.clear_remotes(&mut self.presentation);
        let local_id = self.replicator.local_id().to_string();
        let volumes = self.combat.clear_remote_volumes(&local_id);
        debug!(proxies, volumes, "Remote state torn down");
    }
}

/// Handlers every game session starts with
fn default_handlers<P: Presentation + 'static>() -> HandlerTable<GameWorld<P>> {
    let mut handlers = HandlerTable::new();
    handlers
        .on(EventKind::PlayerSnapshot, |world: &mut GameWorld<P>, event| {
            if let SessionEvent::PlayerSnapshot(snapshot) = event {
                let now = world.now;
                world.replicator.apply_snapshot(
                    &snapshot.player_id,
                    &snapshot.player_data,
                    now,
                    &mut world.presentation,
                );
            }
        })
        .on(EventKind::PlayerLeft, |world: &mut GameWorld<P>, event| {
            if let SessionEvent::PlayerLeft(change) = event {
                info!(player_id = %change.player_id, "Player left the game");
                world
                    .replicator
                    .remove_remote(&change.player_id, &mut world.presentation);
            }
        })
        .on(EventKind::PlayerAction, |world: &mut GameWorld<P>, event| {
            let SessionEvent::PlayerAction(remote) = event else {
                return;
            };
            if remote.player_id == world.replicator.local_id() {
                return;
            }
            let now = world.now;
            match &remote.action {
                PlayerAction::Kick(kick) => {
                    let mirrored = world.combat.mirror_remote_kick(
                        &remote.player_id,
                        kick,
                        now,
                        &mut world.replicator,
                        &mut world.presentation,
                    );
                    if mirrored.is_none() {
                        debug!(player_id = %remote.player_id, "Kick not mirrored");
                    }
                }
                PlayerAction::HealthUpdate(report) => {
                    world.replicator.apply_health_report(
                        &remote.player_id,
                        *report,
                        &mut world.presentation,
                    );
                }
            }
        })
        .on(EventKind::GameObjectUpdate, |world: &mut GameWorld<P>, event| {
            if let SessionEvent::GameObjectUpdate(update) = event {
                world.object_updates.push(update.clone());
            }
        })
        .on(EventKind::Error, |_: &mut GameWorld<P>, event| {
            if let SessionEvent::Error { message } = event {
                warn!("Server error during game: {}", message);
            }
        })
        .on(EventKind::RoomError, |_: &mut GameWorld<P>, event| {
            if let SessionEvent::RoomError { message } = event {
                warn!("Room error during game: {}", message);
            }
        })
        .on(EventKind::Disconnected, |world: &mut GameWorld<P>, event| {
            if let SessionEvent::Disconnected { reason } = event {
                warn!(?reason, "Disconnected during game");
                world.teardown_remotes();
                world.ended = Some(GameEnd::Disconnected {
                    reason: reason.clone(),
                });
            }
        });
    handlers
}

pub struct GameSession<T: Transport, P: Presentation + 'static> {
    context: SessionContext,
    connection: Option<SessionConnection<T>>,
    world: GameWorld<P>,
    handlers: HandlerTable<GameWorld<P>>,
    input: InputBuffer,
    pending: Vec<SessionEvent>,
    attack_until: u64,
    started: Instant,
    ticks: u64,
}

impl<T: Transport, P: Presentation + 'static> GameSession<T, P> {
    pub fn new(handoff: GameStartHandoff<T>, presentation: P, spawn: Vec2) -> Self {
        let GameStartHandoff {
            context,
            session,
            pending_events,
        } = handoff;
        let local_id = context
            .local_identity
            .clone()
            .unwrap_or_else(|| OFFLINE_IDENTITY.to_string());

        info!(
            player_id = %local_id,
            mode = ?context.mode,
            room_id = ?context.room_id,
            "Game session starting"
        );

        Self {
            world: GameWorld {
                replicator: PlayerReplicator::new(local_id, context.sprite.clone(), spawn),
                combat: CombatReconciler::new(),
                presentation,
                now: 0,
                object_updates: Vec::new(),
                ended: None,
            },
            context,
            connection: session,
            handlers: default_handlers(),
            input: InputBuffer::default(),
            pending: pending_events,
            attack_until: 0,
            started: Instant::now(),
            ticks: 0,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn connection(&self) -> Option<&SessionConnection<T>> {
        self.connection.as_ref()
    }

    pub fn world(&self) -> &GameWorld<P> {
        &self.world
    }

    pub fn replicator(&self) -> &PlayerReplicator {
        &self.world.replicator
    }

    pub fn combat(&self) -> &CombatReconciler {
        &self.world.combat
    }

    pub fn presentation(&self) -> &P {
        &self.world.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.world.presentation
    }

    /// Register extra handlers next to the built-in ones
    pub fn handlers_mut(&mut self) -> &mut HandlerTable<GameWorld<P>> {
        &mut self.handlers
    }

    /// Sender for the input side
    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Object updates received from peers since the last call
    pub fn take_object_updates(&mut self) -> Vec<RemoteObjectUpdate> {
        std::mem::take(&mut self.world.object_updates)
    }

    /// Relay a shared world object (coins, blocks) to peers
    pub fn send_object_update(&mut self, object_data: serde_json::Value) {
        if let Some(connection) = self.connection.as_mut() {
            connection.send_object_update(object_data);
        }
    }

    /// Milliseconds since the session started
    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Run one tick at `now` (milliseconds on the session clock)
    pub fn tick(&mut self, now: u64) -> TickOutcome {
        self.ticks += 1;
        self.world.now = now;

        // 1. Inbound events
        let mut events = std::mem::take(&mut self.pending);
        if let Some(connection) = self.connection.as_mut() {
            events.extend(connection.poll_events());
        }
        self.handlers.dispatch_all(&mut self.world, &events);
        if let Some(end) = self.world.ended.take() {
            return TickOutcome::Ended(end);
        }

        // 2. Local movement
        let frame = self.input.drain_frame();
        let local_id = self.world.replicator.local_id().to_string();
        let moved = self.world.replicator.tick_local(frame.keys, replication::DT);
        if now < self.attack_until && !self.world.replicator.local().is_dead() {
            self.world
                .replicator
                .local_mut()
                .set_animation(animation::ATTACK);
        } else if moved {
            let label = self.world.replicator.local().animation().to_string();
            self.world.presentation.play_animation(&local_id, &label);
        }

        // 3. Local attacks
        if frame.kick {
            self.spawn_local_kick(now);
        }

        // 4. Overlaps and damage
        let combat_events =
            self.world
                .combat
                .update(now, &mut self.world.replicator, &mut self.world.presentation);
        for event in combat_events {
            if let CombatEvent::LocalDamaged { health, died, .. } = event {
                if died {
                    info!(player_id = %local_id, "Local player died");
                }
                self.send_action(PlayerAction::HealthUpdate(HealthReport {
                    health: health.current(),
                    max_health: Some(health.max()),
                }));
            }
        }

        // 5. Proxy interpolation
        self.world.replicator.advance(now);

        // 6. Outbound snapshot
        if let Some(snapshot) = self.world.replicator.take_due_snapshot(now) {
            if let Some(connection) = self.connection.as_mut() {
                if connection.is_in_room() {
                    connection.send_snapshot(snapshot);
                }
            }
        }

        TickOutcome::Continue
    }

    fn spawn_local_kick(&mut self, now: u64) {
        let local = self.world.replicator.local();
        if local.is_dead() {
            return;
        }
        let facing = local.facing();
        let config = HitVolumeConfig {
            direction: Some(facing),
            ..HitVolumeConfig::kick()
        };
        self.world.combat.spawn_hit_volume(local, &config, now);

        let local_id = local.id().to_string();
        self.world
            .replicator
            .local_mut()
            .set_animation(animation::ATTACK);
        self.world
            .presentation
            .play_animation(&local_id, animation::ATTACK);
        self.attack_until = now + config.ttl_ms;

        self.send_action(PlayerAction::Kick(config.to_kick_action(facing)));
    }

    fn send_action(&mut self, action: PlayerAction) {
        if let Some(connection) = self.connection.as_mut() {
            connection.send_action(action);
        }
    }

    /// Bring a dead local player back at `spawn` and tell peers
    pub fn respawn(&mut self, spawn: Vec2) {
        self.world.replicator.respawn_local(spawn);
        self.input.release_all();
        self.attack_until = 0;
        let health = self.world.replicator.local().health();
        self.send_action(PlayerAction::HealthUpdate(HealthReport {
            health: health.current(),
            max_health: Some(health.max()),
        }));
    }

    /// Leave the room and disconnect; remote state is torn down at once
    pub fn leave(&mut self) {
        self.world.teardown_remotes();
        if let Some(connection) = self.connection.as_mut() {
            connection.leave_room();
            connection.disconnect();
        }
        info!("Left game session");
    }

    /// Tick at the fixed rate until the connection drops or `shutdown`
    /// resolves; shutdown leaves the room first
    pub async fn run<F: Future<Output = ()>>(self, shutdown: F) -> (GameEnd, Self) {
        self.run_with(shutdown, |_| {}).await
    }

    /// Like [`GameSession::run`], calling `after_tick` once per tick
    pub async fn run_with<F, H>(mut self, shutdown: F, mut after_tick: H) -> (GameEnd, Self)
    where
        F: Future<Output = ()>,
        H: FnMut(&mut Self),
    {
        let mut ticker = interval(Duration::from_millis(replication::TICK_DURATION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.now_ms();
                    if let TickOutcome::Ended(end) = self.tick(now) {
                        return (end, self);
                    }
                    after_tick(&mut self);
                }
                _ = &mut shutdown => {
                    self.leave();
                    return (GameEnd::Left, self);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::LocalInput;
    use crate::game::presentation::recording::Recording;
    use crate::game::presentation::SceneEvent;
    use crate::lobby::machine::GameMode;
    use crate::lobby::room::PlayerRecord;
    use crate::net::connection::ConnectionSettings;
    use crate::net::mock::{MockHandle, MockTransport};
    use crate::net::protocol::{
        ClientMessage, Facing, KickAction, MemberChange, RemoteAction, RemoteSnapshot,
        RoomSnapshot, ServerMessage, SnapshotData,
    };
    use std::collections::HashMap;

    async fn in_room() -> (GameSession<MockTransport, Recording>, MockHandle) {
        let (transport, handle) = MockTransport::accepting("p1");
        let mut connection = SessionConnection::new(transport, ConnectionSettings::default());
        connection.connect().await.unwrap();
        handle.push(ServerMessage::RoomCreated(RoomSnapshot {
            room_id: "R1".to_string(),
            players: HashMap::from([("p1".to_string(), PlayerRecord::new("A", "x", 1))]),
        }));
        connection.poll_events();
        handle.clear_sent();

        let handoff = GameStartHandoff {
            context: SessionContext {
                mode: GameMode::Host,
                sprite: "vanoSprite".to_string(),
                player_name: "A".to_string(),
                local_identity: Some("p1".to_string()),
                room_id: Some("R1".to_string()),
            },
            session: Some(connection),
            pending_events: Vec::new(),
        };
        (
            GameSession::new(handoff, Recording::default(), Vec2::ZERO),
            handle,
        )
    }

    fn peer_snapshot(id: &str, x: f32, y: f32) -> ServerMessage {
        ServerMessage::PlayerUpdate(RemoteSnapshot {
            player_id: id.to_string(),
            player_data: SnapshotData {
                x,
                y,
                velocity_x: 0.0,
                velocity_y: 0.0,
                flip_x: true,
                animation: Some(animation::IDLE.to_string()),
                sprite: Some("walt".to_string()),
            },
        })
    }

    fn peer_kick(id: &str, direction: Facing) -> ServerMessage {
        ServerMessage::PlayerAction(RemoteAction {
            player_id: id.to_string(),
            action: PlayerAction::Kick(KickAction {
                direction: Some(direction),
                ..Default::default()
            }),
        })
    }

    #[tokio::test]
    async fn test_snapshot_sent_every_50ms() {
        let (mut game, handle) = in_room().await;
        for tick in 0..7u64 {
            game.tick(tick * 16);
        }
        // Sent at 0 and 64; 80 and 96 are inside the interval
        let sent = handle.sent();
        let snapshots: Vec<_> = sent
            .iter()
            .filter_map(|m| match m {
                ClientMessage::PlayerUpdate(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].room_id.as_deref(), Some("R1"));
        assert_eq!(snapshots[0].player_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_peer_snapshot_creates_proxy_with_its_sprite() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", 100.0, 0.0));
        game.tick(0);

        let proxy = game.replicator().remote("p2").unwrap();
        assert_eq!(proxy.sprite(), "walt");
        assert_eq!(game.replicator().local().sprite(), "vanoSprite");
    }

    #[tokio::test]
    async fn test_pending_events_dispatched_on_first_tick() {
        let (mut game, _handle) = in_room().await;
        game.pending.push(SessionEvent::PlayerSnapshot(RemoteSnapshot {
            player_id: "p3".to_string(),
            player_data: SnapshotData {
                x: 0.0,
                y: 0.0,
                velocity_x: 0.0,
                velocity_y: 0.0,
                flip_x: false,
                animation: None,
                sprite: None,
            },
        }));
        game.tick(0);
        assert!(game.replicator().remote("p3").is_some());
    }

    #[tokio::test]
    async fn test_local_kick_spawns_and_sends() {
        let (mut game, handle) = in_room().await;
        game.input_sender().kick().unwrap();
        game.tick(0);

        assert_eq!(game.combat().active_count(), 1);
        assert_eq!(game.replicator().local().animation(), animation::ATTACK);
        let kick = handle.sent().into_iter().find_map(|m| match m {
            ClientMessage::PlayerAction(PlayerAction::Kick(k)) => Some(k),
            _ => None,
        });
        let kick = kick.expect("kick was sent");
        assert_eq!(kick.direction, Some(Facing::Right));
        assert_eq!(kick.width, Some(54.0));
        assert_eq!(kick.duration, Some(180));
    }

    #[tokio::test]
    async fn test_remote_kick_damages_local_and_reports_health() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", -40.0, 0.0));
        game.tick(0);
        handle.clear_sent();

        handle.push(peer_kick("p2", Facing::Right));
        game.tick(16);

        assert_eq!(game.replicator().local().health().current(), 9);
        let report = handle.sent().into_iter().find_map(|m| match m {
            ClientMessage::PlayerAction(PlayerAction::HealthUpdate(h)) => Some(h),
            _ => None,
        });
        assert_eq!(
            report,
            Some(HealthReport {
                health: 9,
                max_health: Some(10)
            })
        );
        assert!(game
            .presentation()
            .events
            .contains(&SceneEvent::HealthChanged {
                player_id: "p1".to_string(),
                is_local: true,
                current: 9,
                max: 10
            }));
    }

    #[tokio::test]
    async fn test_own_action_echo_ignored() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", -40.0, 0.0));
        handle.push(peer_kick("p1", Facing::Left));
        game.tick(0);
        assert_eq!(game.combat().active_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_health_update_applies_to_proxy() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", 300.0, 0.0));
        handle.push(ServerMessage::PlayerAction(RemoteAction {
            player_id: "p2".to_string(),
            action: PlayerAction::HealthUpdate(HealthReport {
                health: 6,
                max_health: Some(10),
            }),
        }));
        game.tick(0);
        assert_eq!(game.replicator().remote("p2").unwrap().health().current(), 6);
    }

    #[tokio::test]
    async fn test_player_left_removes_proxy() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", 300.0, 0.0));
        game.tick(0);
        handle.push(ServerMessage::PlayerLeft(MemberChange {
            player_id: "p2".to_string(),
            player_data: None,
        }));
        game.tick(16);

        assert!(game.replicator().remote("p2").is_none());
        assert_eq!(game.presentation().destroyed, vec!["p2".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_tears_down_remote_state() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", 300.0, 0.0));
        handle.push(peer_snapshot("p3", 600.0, 0.0));
        handle.push(peer_kick("p2", Facing::Left));
        game.tick(0);
        game.input_sender().kick().unwrap();
        game.tick(16);
        assert_eq!(game.combat().active_count(), 2);

        handle.drop_connection("server gone");
        let outcome = game.tick(32);

        assert_eq!(
            outcome,
            TickOutcome::Ended(GameEnd::Disconnected {
                reason: Some("server gone".to_string())
            })
        );
        assert_eq!(game.replicator().remote_count(), 0);
        assert_eq!(game.combat().active_count(), 1);
        assert!(!game.connection().unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_leave_sends_leave_room() {
        let (mut game, handle) = in_room().await;
        handle.push(peer_snapshot("p2", 300.0, 0.0));
        game.tick(0);
        handle.clear_sent();

        game.leave();
        assert_eq!(handle.sent_events(), vec!["leaveRoom"]);
        assert_eq!(game.replicator().remote_count(), 0);
        assert_eq!(handle.closes(), 1);
    }

    #[tokio::test]
    async fn test_movement_from_input() {
        let (mut game, _handle) = in_room().await;
        game.input_sender()
            .keys(LocalInput {
                left: true,
                ..Default::default()
            })
            .unwrap();
        game.tick(0);
        game.tick(16);

        let local = game.replicator().local();
        assert!(local.position.x < 0.0);
        assert!(!local.flip_x);
        assert_eq!(local.animation(), animation::WALK);
    }

    #[tokio::test]
    async fn test_offline_session_runs_without_connection() {
        let handoff: GameStartHandoff<MockTransport> = GameStartHandoff {
            context: SessionContext {
                mode: GameMode::Local,
                sprite: "vanoSprite".to_string(),
                player_name: "A".to_string(),
                local_identity: None,
                room_id: None,
            },
            session: None,
            pending_events: Vec::new(),
        };
        let mut game = GameSession::new(handoff, Recording::default(), Vec2::ZERO);
        game.input_sender().kick().unwrap();
        assert_eq!(game.tick(0), TickOutcome::Continue);
        assert_eq!(game.replicator().local_id(), OFFLINE_IDENTITY);
        assert_eq!(game.combat().active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown_leaves_room() {
        let (game, handle) = in_room().await;
        let shutdown = tokio::time::sleep(Duration::from_millis(200));

        let (end, game) = game.run(shutdown).await;
        assert_eq!(end, GameEnd::Left);
        assert!(game.tick_count() >= 10);
        assert!(handle.sent_events().contains(&"playerUpdate"));
        assert_eq!(handle.sent_events().last(), Some(&"leaveRoom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_on_transport_loss() {
        let (game, handle) = in_room().await;
        handle.drop_connection("reset");

        let (end, _game) = game.run(std::future::pending()).await;
        assert_eq!(
            end,
            GameEnd::Disconnected {
                reason: Some("reset".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_respawn_restores_health() {
        let (mut game, handle) = in_room().await;
        game.world.replicator.local_mut().take_damage(10, 0);
        assert!(game.replicator().local().is_dead());

        game.respawn(Vec2::new(5.0, 5.0));
        assert_eq!(game.replicator().local().health().current(), 10);
        assert!(handle.sent_events().contains(&"playerAction"));
    }
}
