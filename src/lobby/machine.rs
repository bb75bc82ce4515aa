//! Pre-game menu flow as a synchronous state machine
//!
//! The machine never performs IO. It consumes [`LobbyInput`]s stamped with
//! an explicit clock and returns [`LobbyEffect`]s for the driver to run.
//! Every timer it schedules belongs to the state that scheduled it and is
//! cancelled on the way out. Async completions carry a [`RequestId`]; a
//! completion for anything but the outstanding request is dropped.

use tracing::{debug, info, warn};

use crate::error::{Operation, SessionError};
use crate::game::constants::net;
use crate::lobby::room::RoomSummary;
use crate::net::connection::ConnectError;
use crate::net::dispatch::SessionEvent;
use crate::net::protocol::{PlayerId, RoomId};
use crate::net::session::Session;
use crate::util::timer::{TimerHandle, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// Single player, no network
    Local,
    Host,
    Join,
}

/// Why we are connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectPurpose {
    /// Fetch the room list
    Discover,
    CreateRoom,
    JoinRoom(RoomId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Opening,
    ListingRooms,
    AwaitingRoom,
}

/// Where a failure display returns to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Refresh the room list
    RoomList,
    /// Disconnect and start over
    ModeSelect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyState {
    ModeSelect,
    PlayerSelect {
        mode: GameMode,
        room: Option<RoomId>,
    },
    Connecting {
        purpose: ConnectPurpose,
        stage: ConnectStage,
    },
    RoomList {
        rooms: Vec<RoomSummary>,
        refreshing: bool,
    },
    Lobby {
        room_id: RoomId,
        is_host: bool,
    },
    /// Error on screen; resumes when the display window closes
    Failed {
        error: SessionError,
        resume: Resume,
    },
    GameStart,
}

impl LobbyState {
    pub fn name(&self) -> &'static str {
        match self {
            LobbyState::ModeSelect => "mode-select",
            LobbyState::PlayerSelect { .. } => "player-select",
            LobbyState::Connecting { .. } => "connecting",
            LobbyState::RoomList { .. } => "room-list",
            LobbyState::Lobby { .. } => "lobby",
            LobbyState::Failed { .. } => "failed",
            LobbyState::GameStart => "game-start",
        }
    }

    /// States reachable only with a live connection
    fn is_online(&self) -> bool {
        match self {
            LobbyState::ModeSelect | LobbyState::GameStart => false,
            LobbyState::PlayerSelect { mode, .. } => *mode == GameMode::Join,
            _ => true,
        }
    }
}

/// Token tying an async completion to the request that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyInput {
    SelectMode(GameMode),
    SelectCharacter(String),
    SelectRoom(RoomId),
    Refresh,
    Confirm,
    Start,
    Back,
    ConnectFinished {
        request: RequestId,
        result: Result<(), ConnectError>,
    },
    RoomListLoaded {
        request: RequestId,
        rooms: Vec<RoomSummary>,
    },
    Session(SessionEvent),
}

/// Work the driver performs on the machine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEffect {
    Connect { request: RequestId },
    RequestRoomList { request: RequestId },
    CreateRoom { name: String, sprite: String },
    JoinRoom { room_id: RoomId, name: String, sprite: String },
    StartGame,
    LeaveRoom,
    /// Leave a room whose reply came too late, keeping the current one
    AbandonRoom { room_id: RoomId },
    Disconnect,
    EnterGame(SessionContext),
}

/// What gameplay needs to know about the menu's choices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub mode: GameMode,
    pub sprite: String,
    pub player_name: String,
    pub local_identity: Option<PlayerId>,
    pub room_id: Option<RoomId>,
}

/// Auto-dismissing message for the menu
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Error(SessionError),
    Info(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LobbyTimer {
    RequestTimeout,
    ErrorDismiss,
    NoticeDismiss,
}

#[derive(Debug, Clone, Copy)]
pub struct LobbySettings {
    pub request_timeout_ms: u64,
    pub error_display_ms: u64,
    pub notice_ms: u64,
    pub min_players: usize,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: net::ROOM_REQUEST_TIMEOUT_MS,
            error_display_ms: net::ERROR_DISPLAY_MS,
            notice_ms: net::NOTICE_MS,
            min_players: net::MIN_PLAYERS_TO_START,
        }
    }
}

pub struct LobbyMachine {
    state: LobbyState,
    settings: LobbySettings,
    player_name: String,
    sprite: String,
    /// Last room list received, shown again on back navigation
    rooms: Vec<RoomSummary>,
    timers: TimerQueue<LobbyTimer>,
    state_timers: Vec<TimerHandle>,
    notice: Option<(Notice, TimerHandle)>,
    outstanding: Option<RequestId>,
    next_request: u64,
}

impl LobbyMachine {
    pub fn new(player_name: impl Into<String>, sprite: impl Into<String>, settings: LobbySettings) -> Self {
        Self {
            state: LobbyState::ModeSelect,
            settings,
            player_name: player_name.into(),
            sprite: sprite.into(),
            rooms: Vec::new(),
            timers: TimerQueue::new(),
            state_timers: Vec::new(),
            notice: None,
            outstanding: None,
            next_request: 1,
        }
    }

    pub fn state(&self) -> &LobbyState {
        &self.state
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().map(|(notice, _)| notice)
    }

    pub fn sprite(&self) -> &str {
        &self.sprite
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn cached_rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    pub fn is_finished(&self) -> bool {
        self.state == LobbyState::GameStart
    }

    /// Earliest pending timer, for drivers that sleep until it
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Feed one input
    pub fn handle(&mut self, now: u64, input: LobbyInput, session: &Session) -> Vec<LobbyEffect> {
        let mut effects = Vec::new();
        match input {
            LobbyInput::SelectMode(mode) => self.on_select_mode(mode, &mut effects),
            LobbyInput::SelectCharacter(sprite) => {
                if matches!(self.state, LobbyState::PlayerSelect { .. }) {
                    self.sprite = sprite;
                }
            }
            LobbyInput::SelectRoom(room_id) => self.on_select_room(now, room_id),
            LobbyInput::Refresh => self.on_refresh(&mut effects),
            LobbyInput::Confirm => self.on_confirm(session, &mut effects),
            LobbyInput::Start => self.on_start(now, session, &mut effects),
            LobbyInput::Back => self.on_back(&mut effects),
            LobbyInput::ConnectFinished { request, result } => {
                if self.accept_completion(request) {
                    self.on_connected(now, result, &mut effects);
                }
            }
            LobbyInput::RoomListLoaded { request, rooms } => {
                if self.accept_completion(request) {
                    self.on_rooms(rooms);
                }
            }
            LobbyInput::Session(event) => self.on_session_event(now, event, session, &mut effects),
        }
        effects
    }

    /// Advance the clock and fire due timers
    pub fn tick(&mut self, now: u64) -> Vec<LobbyEffect> {
        let mut effects = Vec::new();
        for (handle, timer) in self.timers.expire(now) {
            match timer {
                LobbyTimer::RequestTimeout => {
                    let resume = match &self.state {
                        LobbyState::Connecting {
                            purpose: ConnectPurpose::CreateRoom,
                            ..
                        } => Some((Operation::CreateRoom, Resume::ModeSelect)),
                        LobbyState::Connecting {
                            purpose: ConnectPurpose::JoinRoom(_),
                            ..
                        } => Some((Operation::JoinRoom, Resume::RoomList)),
                        _ => None,
                    };
                    if let Some((operation, resume)) = resume {
                        self.fail(now, SessionError::Timeout(operation), resume);
                    }
                }
                LobbyTimer::ErrorDismiss => {
                    if let LobbyState::Failed { resume, .. } = self.state {
                        self.resume(resume, &mut effects);
                    }
                }
                LobbyTimer::NoticeDismiss => {
                    if matches!(self.notice, Some((_, h)) if h == handle) {
                        self.notice = None;
                    }
                }
            }
        }
        effects
    }

    fn on_select_mode(&mut self, mode: GameMode, effects: &mut Vec<LobbyEffect>) {
        if self.state != LobbyState::ModeSelect {
            debug!(state = self.state.name(), "Mode selection ignored");
            return;
        }
        match mode {
            GameMode::Local | GameMode::Host => {
                self.transition(LobbyState::PlayerSelect { mode, room: None });
            }
            GameMode::Join => {
                self.transition(LobbyState::Connecting {
                    purpose: ConnectPurpose::Discover,
                    stage: ConnectStage::Opening,
                });
                let request = self.issue_request();
                effects.push(LobbyEffect::Connect { request });
            }
        }
    }

    fn on_select_room(&mut self, now: u64, room_id: RoomId) {
        let LobbyState::RoomList { rooms, .. } = &self.state else {
            return;
        };
        let full = rooms.iter().find(|r| r.id == room_id).map(RoomSummary::is_full);
        match full {
            Some(true) => {
                self.show_notice(now, Notice::Info("Room is full".to_string()));
            }
            Some(false) => {
                self.transition(LobbyState::PlayerSelect {
                    mode: GameMode::Join,
                    room: Some(room_id),
                });
            }
            None => debug!(room_id = %room_id, "Selected room not in list"),
        }
    }

    fn on_refresh(&mut self, effects: &mut Vec<LobbyEffect>) {
        if let LobbyState::RoomList { refreshing, .. } = &mut self.state {
            *refreshing = true;
            let request = self.issue_request();
            effects.push(LobbyEffect::RequestRoomList { request });
        }
    }

    fn on_confirm(&mut self, session: &Session, effects: &mut Vec<LobbyEffect>) {
        let LobbyState::PlayerSelect { mode, room } = self.state.clone() else {
            return;
        };
        match (mode, room) {
            (GameMode::Local, _) => self.enter_game(GameMode::Local, session, effects),
            (GameMode::Host, _) => {
                self.transition(LobbyState::Connecting {
                    purpose: ConnectPurpose::CreateRoom,
                    stage: ConnectStage::Opening,
                });
                let request = self.issue_request();
                effects.push(LobbyEffect::Connect { request });
            }
            (GameMode::Join, Some(room_id)) => {
                self.transition(LobbyState::Connecting {
                    purpose: ConnectPurpose::JoinRoom(room_id),
                    stage: ConnectStage::Opening,
                });
                let request = self.issue_request();
                effects.push(LobbyEffect::Connect { request });
            }
            (GameMode::Join, None) => warn!("Join confirmed without a room"),
        }
    }

    fn on_start(&mut self, now: u64, session: &Session, effects: &mut Vec<LobbyEffect>) {
        let LobbyState::Lobby { is_host, .. } = self.state else {
            return;
        };
        if !is_host {
            debug!("Only the host can start the game");
            return;
        }
        let members = session.member_count();
        if members < self.settings.min_players {
            info!(members, "Start refused: not enough players");
            self.show_notice(
                now,
                Notice::Error(SessionError::Logic(format!(
                    "Need at least {} players to start",
                    self.settings.min_players
                ))),
            );
            return;
        }
        effects.push(LobbyEffect::StartGame);
        self.enter_game(GameMode::Host, session, effects);
    }

    fn on_back(&mut self, effects: &mut Vec<LobbyEffect>) {
        match self.state.clone() {
            LobbyState::ModeSelect | LobbyState::GameStart => {}
            LobbyState::PlayerSelect { mode, .. } => match mode {
                GameMode::Local | GameMode::Host => self.transition(LobbyState::ModeSelect),
                GameMode::Join => self.transition(LobbyState::RoomList {
                    rooms: self.rooms.clone(),
                    refreshing: false,
                }),
            },
            LobbyState::Connecting { purpose, .. } => match purpose {
                ConnectPurpose::Discover => {
                    self.transition(LobbyState::ModeSelect);
                    effects.push(LobbyEffect::Disconnect);
                }
                ConnectPurpose::CreateRoom => {
                    self.transition(LobbyState::PlayerSelect {
                        mode: GameMode::Host,
                        room: None,
                    });
                    effects.push(LobbyEffect::Disconnect);
                }
                ConnectPurpose::JoinRoom(_) => {
                    effects.push(LobbyEffect::LeaveRoom);
                    self.refresh_room_list(effects);
                }
            },
            LobbyState::RoomList { .. } => {
                self.transition(LobbyState::ModeSelect);
                effects.push(LobbyEffect::Disconnect);
            }
            LobbyState::Lobby { is_host: true, .. } => {
                self.transition(LobbyState::PlayerSelect {
                    mode: GameMode::Host,
                    room: None,
                });
                effects.push(LobbyEffect::LeaveRoom);
                effects.push(LobbyEffect::Disconnect);
            }
            LobbyState::Lobby { is_host: false, .. } => {
                effects.push(LobbyEffect::LeaveRoom);
                self.refresh_room_list(effects);
            }
            LobbyState::Failed { resume, .. } => self.resume(resume, effects),
        }
    }

    fn on_connected(&mut self, now: u64, result: Result<(), ConnectError>, effects: &mut Vec<LobbyEffect>) {
        let LobbyState::Connecting {
            purpose,
            stage: ConnectStage::Opening,
        } = self.state.clone()
        else {
            return;
        };

        if let Err(e) = result {
            self.fail(now, e.into(), Resume::ModeSelect);
            return;
        }

        match purpose {
            ConnectPurpose::Discover => {
                self.state = LobbyState::Connecting {
                    purpose,
                    stage: ConnectStage::ListingRooms,
                };
                let request = self.issue_request();
                effects.push(LobbyEffect::RequestRoomList { request });
            }
            ConnectPurpose::CreateRoom => {
                self.state = LobbyState::Connecting {
                    purpose,
                    stage: ConnectStage::AwaitingRoom,
                };
                self.schedule_for_state(now, self.settings.request_timeout_ms, LobbyTimer::RequestTimeout);
                effects.push(LobbyEffect::CreateRoom {
                    name: self.player_name.clone(),
                    sprite: self.sprite.clone(),
                });
            }
            ConnectPurpose::JoinRoom(room_id) => {
                self.state = LobbyState::Connecting {
                    purpose: ConnectPurpose::JoinRoom(room_id.clone()),
                    stage: ConnectStage::AwaitingRoom,
                };
                self.schedule_for_state(now, self.settings.request_timeout_ms, LobbyTimer::RequestTimeout);
                effects.push(LobbyEffect::JoinRoom {
                    room_id,
                    name: self.player_name.clone(),
                    sprite: self.sprite.clone(),
                });
            }
        }
    }

    fn on_rooms(&mut self, rooms: Vec<RoomSummary>) {
        let listing = matches!(
            self.state,
            LobbyState::Connecting {
                purpose: ConnectPurpose::Discover,
                stage: ConnectStage::ListingRooms,
            } | LobbyState::RoomList { .. }
        );
        if !listing {
            return;
        }
        debug!(count = rooms.len(), "Room list updated");
        self.rooms = rooms.clone();
        self.transition(LobbyState::RoomList {
            rooms,
            refreshing: false,
        });
    }

    fn on_session_event(
        &mut self,
        now: u64,
        event: SessionEvent,
        session: &Session,
        effects: &mut Vec<LobbyEffect>,
    ) {
        match event {
            SessionEvent::RoomCreated(room) => {
                if self.awaiting(|p| *p == ConnectPurpose::CreateRoom) {
                    info!(room_id = %room.room_id, "Room created");
                    self.transition(LobbyState::Lobby {
                        room_id: room.room_id,
                        is_host: true,
                    });
                } else {
                    self.drop_late_room(&room.room_id, effects);
                }
            }
            SessionEvent::RoomJoined(room) => {
                if self.awaiting(|p| matches!(p, ConnectPurpose::JoinRoom(id) if *id == room.room_id)) {
                    info!(room_id = %room.room_id, "Room joined");
                    self.transition(LobbyState::Lobby {
                        room_id: room.room_id,
                        is_host: false,
                    });
                } else {
                    self.drop_late_room(&room.room_id, effects);
                }
            }
            SessionEvent::GameStarted => {
                if matches!(self.state, LobbyState::Lobby { .. }) {
                    self.enter_game(GameMode::Join, session, effects);
                }
            }
            SessionEvent::RoomError { message } | SessionEvent::Error { message } => {
                let resume = match &self.state {
                    LobbyState::Connecting {
                        purpose: ConnectPurpose::CreateRoom,
                        ..
                    } => Some(Resume::ModeSelect),
                    LobbyState::Connecting {
                        purpose: ConnectPurpose::JoinRoom(_),
                        ..
                    } => Some(Resume::RoomList),
                    _ => None,
                };
                match resume {
                    Some(resume) => self.fail(now, SessionError::Protocol(message), resume),
                    None => self.show_notice(now, Notice::Error(SessionError::Protocol(message))),
                }
            }
            SessionEvent::Disconnected { reason } => {
                if self.state.is_online() {
                    warn!(?reason, state = self.state.name(), "Connection lost in menu");
                    self.transition(LobbyState::ModeSelect);
                    let detail = reason.unwrap_or_else(|| "connection lost".to_string());
                    self.show_notice(now, Notice::Error(SessionError::Transport(detail)));
                }
            }
            SessionEvent::PlayerJoined(change) => {
                if matches!(self.state, LobbyState::Lobby { .. }) {
                    let name = change
                        .player_data
                        .map(|p| p.name)
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| "A player".to_string());
                    self.show_notice(now, Notice::Info(format!("{} joined", name)));
                }
            }
            SessionEvent::PlayerLeft(_) => {
                if matches!(self.state, LobbyState::Lobby { .. }) {
                    self.show_notice(now, Notice::Info("A player left".to_string()));
                }
            }
            SessionEvent::PlayerSnapshot(_)
            | SessionEvent::GameObjectUpdate(_)
            | SessionEvent::PlayerAction(_) => {}
        }
    }

    fn awaiting(&self, purpose_matches: impl Fn(&ConnectPurpose) -> bool) -> bool {
        matches!(
            &self.state,
            LobbyState::Connecting { purpose, stage: ConnectStage::AwaitingRoom } if purpose_matches(purpose)
        )
    }

    /// A room reply nobody is waiting for: leave it again
    fn drop_late_room(&mut self, room_id: &str, effects: &mut Vec<LobbyEffect>) {
        if let LobbyState::Lobby { room_id: current, .. } = &self.state {
            if current == room_id {
                return;
            }
        }
        warn!(room_id, state = self.state.name(), "Late room reply dropped");
        effects.push(LobbyEffect::AbandonRoom {
            room_id: room_id.to_string(),
        });
    }

    fn enter_game(&mut self, mode: GameMode, session: &Session, effects: &mut Vec<LobbyEffect>) {
        let context = SessionContext {
            mode,
            sprite: self.sprite.clone(),
            player_name: self.player_name.clone(),
            local_identity: session.player_id().map(str::to_string),
            room_id: session.room_id().map(str::to_string),
        };
        info!(?mode, room_id = ?context.room_id, "Entering game");
        self.transition(LobbyState::GameStart);
        effects.push(LobbyEffect::EnterGame(context));
    }

    fn refresh_room_list(&mut self, effects: &mut Vec<LobbyEffect>) {
        self.transition(LobbyState::RoomList {
            rooms: self.rooms.clone(),
            refreshing: true,
        });
        let request = self.issue_request();
        effects.push(LobbyEffect::RequestRoomList { request });
    }

    fn fail(&mut self, now: u64, error: SessionError, resume: Resume) {
        warn!(%error, ?resume, "Lobby operation failed");
        self.transition(LobbyState::Failed { error, resume });
        self.schedule_for_state(now, self.settings.error_display_ms, LobbyTimer::ErrorDismiss);
    }

    fn resume(&mut self, resume: Resume, effects: &mut Vec<LobbyEffect>) {
        match resume {
            Resume::RoomList => self.refresh_room_list(effects),
            Resume::ModeSelect => {
                self.transition(LobbyState::ModeSelect);
                effects.push(LobbyEffect::Disconnect);
            }
        }
    }

    fn show_notice(&mut self, now: u64, notice: Notice) {
        if let Some((_, previous)) = self.notice.take() {
            self.timers.cancel(previous);
        }
        let handle = self
            .timers
            .schedule(now, self.settings.notice_ms, LobbyTimer::NoticeDismiss);
        self.notice = Some((notice, handle));
    }

    fn schedule_for_state(&mut self, now: u64, delay_ms: u64, timer: LobbyTimer) {
        let handle = self.timers.schedule(now, delay_ms, timer);
        self.state_timers.push(handle);
    }

    fn issue_request(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.outstanding = Some(id);
        id
    }

    fn accept_completion(&mut self, request: RequestId) -> bool {
        if self.outstanding == Some(request) {
            self.outstanding = None;
            true
        } else {
            debug!(?request, "Stale completion dropped");
            false
        }
    }

    /// Leave the current state: its timers and request die with it
    fn transition(&mut self, next: LobbyState) {
        for handle in self.state_timers.drain(..) {
            self.timers.cancel(handle);
        }
        self.outstanding = None;
        debug!(from = self.state.name(), to = next.name(), "Lobby transition");
        self.state = next;
    }
}
