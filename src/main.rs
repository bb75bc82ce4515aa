//! Headless bot client
//!
//! Hosts or joins a room according to the environment, then wanders and
//! kicks until Ctrl+C. A dropped connection sends it back to the menu.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cgc_netplay::config::{BotMode, ClientConfig};
use cgc_netplay::game::player::LocalInput;
use cgc_netplay::game::input_buffer::InputSender;
use cgc_netplay::game::presentation::Headless;
use cgc_netplay::lobby::driver::{LobbyDriver, LobbyView};
use cgc_netplay::lobby::machine::{GameMode, LobbyInput, LobbyMachine, LobbySettings, LobbyState};
use cgc_netplay::net::connection::{ConnectionSettings, SessionConnection};
use cgc_netplay::net::game_session::{GameEnd, GameSession};
use cgc_netplay::net::transport::WebTransportClient;
use cgc_netplay::util::vec2::Vec2;

const SPAWN: Vec2 = Vec2 { x: 400.0, y: 500.0 };
const RESPAWN_DELAY_MS: u64 = 3_000;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REFRESH_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("CGC Netplay bot v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} as {} ({:?})",
        config.server_url, config.player_name, config.bot_mode
    );

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    tokio::pin!(ctrl_c);

    loop {
        let transport =
            WebTransportClient::new(config.server_url.clone(), config.server_cert_hash.clone());
        let connection = SessionConnection::new(transport, ConnectionSettings::from(&config));
        let machine = LobbyMachine::new(
            config.player_name.clone(),
            config.player_sprite.clone(),
            LobbySettings {
                request_timeout_ms: config.join_timeout_ms,
                ..Default::default()
            },
        );
        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let (driver, view) = LobbyDriver::new(machine, connection, inputs_rx);

        let handoff = tokio::select! {
            (result, ()) = async { tokio::join!(driver.run(), drive_menu(config.bot_mode, inputs, view)) } => result,
            _ = &mut ctrl_c => {
                info!("Stopped in the menu");
                return Ok(());
            }
        };
        let handoff = match handoff {
            Ok(handoff) => handoff,
            Err(e) => {
                warn!("{}", e);
                return Ok(());
            }
        };

        let game = GameSession::new(handoff, Headless, SPAWN);
        let mut bot = Wanderer::new(game.input_sender());
        let (end, _game) = game
            .run_with(&mut ctrl_c, |game| bot.drive(game))
            .await;

        match end {
            GameEnd::Left => {
                info!("Bot stopped");
                return Ok(());
            }
            GameEnd::Disconnected { reason } => {
                warn!(?reason, "Back to the menu");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Press the menu buttons a player would for `mode`
async fn drive_menu(
    mode: BotMode,
    inputs: mpsc::UnboundedSender<LobbyInput>,
    mut view: watch::Receiver<LobbyView>,
) {
    let mut last_state = None;
    loop {
        let current = view.borrow_and_update().clone();
        let entered = last_state.as_ref() != Some(&current.state.name());
        last_state = Some(current.state.name());

        let input = match &current.state {
            LobbyState::ModeSelect if entered => Some(LobbyInput::SelectMode(match mode {
                BotMode::Host => GameMode::Host,
                BotMode::Join => GameMode::Join,
            })),
            LobbyState::PlayerSelect { .. } if entered => Some(LobbyInput::Confirm),
            LobbyState::RoomList {
                rooms,
                refreshing: false,
            } => match rooms.iter().find(|r| !r.is_full()) {
                Some(room) => {
                    info!(room_id = %room.id, players = room.player_count, "Joining room");
                    Some(LobbyInput::SelectRoom(room.id.clone()))
                }
                None => {
                    info!("No open rooms, refreshing");
                    tokio::time::sleep(REFRESH_DELAY).await;
                    Some(LobbyInput::Refresh)
                }
            },
            LobbyState::Lobby { is_host: true, .. } if current.room.player_count >= 2 => {
                Some(LobbyInput::Start)
            }
            _ => None,
        };

        if let Some(input) = input {
            if inputs.send(input).is_err() {
                return;
            }
        }
        if view.changed().await.is_err() {
            return;
        }
    }
}

/// Random wandering and kicking
struct Wanderer {
    input: InputSender,
    change_at: u64,
    next_kick_at: u64,
    dead_since: Option<u64>,
}

impl Wanderer {
    fn new(input: InputSender) -> Self {
        Self {
            input,
            change_at: 0,
            next_kick_at: 1_000,
            dead_since: None,
        }
    }

    fn drive(&mut self, game: &mut GameSession<WebTransportClient, Headless>) {
        let now = game.now_ms();
        if game.replicator().local().is_dead() {
            let since = *self.dead_since.get_or_insert(now);
            if now.saturating_sub(since) >= RESPAWN_DELAY_MS {
                info!("Respawning");
                game.respawn(SPAWN);
                self.dead_since = None;
            }
            return;
        }

        let mut rng = rand::thread_rng();
        if now >= self.change_at {
            let keys = LocalInput {
                left: rng.gen_bool(0.3),
                right: rng.gen_bool(0.3),
                up: rng.gen_bool(0.25),
                down: rng.gen_bool(0.25),
            };
            if self.input.keys(keys).is_err() {
                return;
            }
            self.change_at = now + rng.gen_range(400..1_500);
        }

        let local = game.replicator().local().position;
        let target_near = game
            .replicator()
            .remotes()
            .any(|p| !p.is_dead() && p.position.distance_to(local) < 80.0);
        if now >= self.next_kick_at && (target_near || rng.gen_bool(0.02)) {
            let _ = self.input.kick();
            self.next_kick_at = now + rng.gen_range(300..900);
        }
    }
}
