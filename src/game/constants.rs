/// Session and lobby timing. All durations in milliseconds.
pub mod net {
    /// Upper bound on establishing the transport session
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
    /// Room list requests resolve to an empty list after this long
    pub const ROOM_LIST_TIMEOUT_MS: u64 = 5_000;
    /// Create/join room requests fail after this long without a reply
    pub const ROOM_REQUEST_TIMEOUT_MS: u64 = 8_000;
    /// How long a failure stays on screen before the lobby moves on
    pub const ERROR_DISPLAY_MS: u64 = 2_000;
    /// Lifetime of transient notices ("need more players", ...)
    pub const NOTICE_MS: u64 = 2_000;
    /// Room size requested when hosting
    pub const MAX_PLAYERS: u8 = 4;
    /// Members required before the host may start
    pub const MIN_PLAYERS_TO_START: usize = 2;
    /// Menu tick (room events are polled at this cadence)
    pub const MENU_TICK_MS: u64 = 50;
    /// Largest frame accepted from the server
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
}

/// Replication cadence
pub mod replication {
    /// Client simulation rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 60.0;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Outbound snapshot cadence (20 Hz)
    pub const SNAPSHOT_INTERVAL_MS: u64 = 50;
    /// Remote proxies tween toward each new snapshot over this window
    pub const INTERPOLATION_MS: u64 = 100;
}

/// Player body and movement
pub mod player {
    pub const WALK_VELOCITY: f32 = 200.0;
    /// Per-axis scale applied when moving diagonally (sqrt(2)/2)
    pub const DIAGONAL_SCALE: f32 = 0.707;
    pub const MAX_HEALTH: i32 = 10;
    pub const BODY_WIDTH: f32 = 48.0;
    pub const BODY_HEIGHT: f32 = 60.0;
    pub const DEFAULT_SPRITE: &str = "vanoSprite";
}

/// Animation labels understood by the presentation layer
pub mod animation {
    pub const IDLE: &str = "playeridle";
    pub const WALK: &str = "playerwalk";
    pub const ATTACK: &str = "playerhammer";
    pub const DEAD: &str = "playerdead";
}

/// Hit-volume defaults
pub mod combat {
    /// Sustained overlap cannot damage the same entity more often than this
    pub const DAMAGE_COOLDOWN_MS: u64 = 150;

    pub const DEFAULT_WIDTH: f32 = 48.0;
    pub const DEFAULT_HEIGHT: f32 = 32.0;
    pub const DEFAULT_TTL_MS: u64 = 200;
    pub const DEFAULT_DAMAGE: u32 = 1;

    pub const KICK_WIDTH: f32 = 54.0;
    pub const KICK_HEIGHT: f32 = 40.0;
    pub const KICK_OFFSET_Y: f32 = -10.0;
    pub const KICK_TTL_MS: u64 = 180;
    pub const KICK_DAMAGE: u32 = 1;
}
