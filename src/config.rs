use std::str::FromStr;

use crate::game::constants::{net, player};

/// How the headless client enters a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    Host,
    Join,
}

impl FromStr for BotMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(BotMode::Host),
            "join" => Ok(BotMode::Join),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("server_url must start with https://")]
    InsecureUrl,
    #[error("player_name cannot be empty")]
    EmptyName,
    #[error("max_players must be between 2 and {0}")]
    MaxPlayers(u8),
    #[error("{0} must be greater than 0")]
    ZeroTimeout(&'static str),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebTransport endpoint of the session server
    pub server_url: String,
    /// Base64 SHA-256 of a self-signed server certificate
    pub server_cert_hash: Option<String>,
    pub player_name: String,
    pub player_sprite: String,
    pub bot_mode: BotMode,
    /// Room size requested when hosting
    pub max_players: u8,
    pub connect_timeout_ms: u64,
    pub room_list_timeout_ms: u64,
    /// Create/join room request timeout
    pub join_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "https://localhost:4433".to_string(),
            server_cert_hash: None,
            player_name: "Player".to_string(),
            player_sprite: player::DEFAULT_SPRITE.to_string(),
            bot_mode: BotMode::Join,
            max_players: net::MAX_PLAYERS,
            connect_timeout_ms: net::CONNECT_TIMEOUT_MS,
            room_list_timeout_ms: net::ROOM_LIST_TIMEOUT_MS,
            join_timeout_ms: net::ROOM_REQUEST_TIMEOUT_MS,
        }
    }
}

const MAX_ROOM_SIZE: u8 = 16;

impl ClientConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SERVER_URL") {
            config.server_url = url;
        }

        if let Ok(hash) = std::env::var("SERVER_CERT_HASH") {
            if !hash.trim().is_empty() {
                config.server_cert_hash = Some(hash.trim().to_string());
            }
        }

        if let Ok(name) = std::env::var("PLAYER_NAME") {
            if name.trim().is_empty() {
                tracing::warn!("PLAYER_NAME is empty, using default");
            } else {
                config.player_name = name.trim().to_string();
            }
        }

        if let Ok(sprite) = std::env::var("PLAYER_SPRITE") {
            config.player_sprite = sprite;
        }

        if let Ok(mode) = std::env::var("BOT_MODE") {
            match mode.parse() {
                Ok(parsed) => config.bot_mode = parsed,
                Err(()) => tracing::warn!("Invalid BOT_MODE '{}', using default", mode),
            }
        }

        if let Ok(max_players) = std::env::var("MAX_PLAYERS") {
            match max_players.parse::<u8>() {
                Ok(parsed) if (2..=MAX_ROOM_SIZE).contains(&parsed) => config.max_players = parsed,
                Ok(_) => tracing::warn!("MAX_PLAYERS must be 2-{}, using default", MAX_ROOM_SIZE),
                Err(_) => tracing::warn!("Invalid MAX_PLAYERS '{}', using default", max_players),
            }
        }

        config.connect_timeout_ms = env_millis("CONNECT_TIMEOUT_MS", config.connect_timeout_ms);
        config.room_list_timeout_ms = env_millis("ROOM_LIST_TIMEOUT_MS", config.room_list_timeout_ms);
        config.join_timeout_ms = env_millis("JOIN_TIMEOUT_MS", config.join_timeout_ms);

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("https://") {
            return Err(ConfigError::InsecureUrl);
        }
        if self.player_name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !(2..=MAX_ROOM_SIZE).contains(&self.max_players) {
            return Err(ConfigError::MaxPlayers(MAX_ROOM_SIZE));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_ms"));
        }
        if self.room_list_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("room_list_timeout_ms"));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("join_timeout_ms"));
        }
        Ok(())
    }
}

fn env_millis(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => match value.parse::<u64>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                tracing::warn!("Invalid {} '{}', using default", key, value);
                default
            }
        },
        Err(_) => default,
    }
}
