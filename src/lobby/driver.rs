//! Async executor for the lobby state machine
//!
//! Runs the machine's effects against a [`SessionConnection`], polls session
//! events every menu tick and publishes a [`LobbyView`] on a watch channel.
//! Suspended operations (connect, room list) race against user input so a
//! `Back` drops the in-flight future.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::constants::net;
use crate::lobby::machine::{GameMode, LobbyEffect, LobbyInput, LobbyMachine, LobbyState, Notice, SessionContext};
use crate::lobby::room::PlayerRecord;
use crate::net::connection::SessionConnection;
use crate::net::dispatch::SessionEvent;
use crate::net::session::RoomInfo;
use crate::net::transport::Transport;
use crate::util::unix_millis;

/// What the menu renders
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyView {
    pub state: LobbyState,
    pub notice: Option<Notice>,
    pub room: RoomInfo,
    pub sprite: String,
}

/// Everything gameplay needs from the menu
pub struct GameStartHandoff<T: Transport> {
    pub context: SessionContext,
    /// `None` for local play
    pub session: Option<SessionConnection<T>>,
    /// Events polled in the same batch as the game start
    pub pending_events: Vec<SessionEvent>,
}

#[derive(Debug, thiserror::Error)]
#[error("Lobby input channel closed")]
pub struct LobbyClosed;

/// Result of racing an operation against user input
struct Raced<O> {
    output: Option<O>,
    deferred: Vec<LobbyInput>,
    closed: bool,
}

/// Poll `operation` until it completes or the user presses back.
/// Other inputs are held until the race ends.
async fn race_input<F: Future>(
    inputs: &mut mpsc::UnboundedReceiver<LobbyInput>,
    operation: F,
) -> Raced<F::Output> {
    tokio::pin!(operation);
    let mut deferred = Vec::new();
    loop {
        tokio::select! {
            output = &mut operation => {
                return Raced { output: Some(output), deferred, closed: false };
            }
            input = inputs.recv() => match input {
                Some(LobbyInput::Back) => {
                    debug!("Back pressed; in-flight request dropped");
                    deferred.push(LobbyInput::Back);
                    return Raced { output: None, deferred, closed: false };
                }
                Some(other) => deferred.push(other),
                None => return Raced { output: None, deferred, closed: true },
            }
        }
    }
}

enum Step {
    Continue(Vec<LobbyEffect>),
    Enter(SessionContext),
    Closed,
}

pub struct LobbyDriver<T: Transport> {
    machine: LobbyMachine,
    connection: SessionConnection<T>,
    inputs: mpsc::UnboundedReceiver<LobbyInput>,
    view: watch::Sender<LobbyView>,
    started: Instant,
    menu_tick: Duration,
    carry_over: Vec<SessionEvent>,
}

impl<T: Transport> LobbyDriver<T> {
    pub fn new(
        machine: LobbyMachine,
        connection: SessionConnection<T>,
        inputs: mpsc::UnboundedReceiver<LobbyInput>,
    ) -> (Self, watch::Receiver<LobbyView>) {
        let initial = LobbyView {
            state: machine.state().clone(),
            notice: machine.notice().cloned(),
            room: connection.room_info(),
            sprite: machine.sprite().to_string(),
        };
        let (view, view_rx) = watch::channel(initial);
        (
            Self {
                machine,
                connection,
                inputs,
                view,
                started: Instant::now(),
                menu_tick: Duration::from_millis(net::MENU_TICK_MS),
                carry_over: Vec::new(),
            },
            view_rx,
        )
    }

    /// Drive the menu until the game starts or the input side goes away
    pub async fn run(mut self) -> Result<GameStartHandoff<T>, LobbyClosed> {
        let mut ticker = tokio::time::interval(self.menu_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut queue: VecDeque<LobbyEffect> = VecDeque::new();

        loop {
            while let Some(effect) = queue.pop_front() {
                match self.execute(effect).await {
                    Step::Continue(more) => queue.extend(more),
                    Step::Enter(context) => return Ok(self.handoff(context)),
                    Step::Closed => {
                        self.connection.disconnect();
                        return Err(LobbyClosed);
                    }
                }
                self.publish();
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let mut events = self.connection.poll_events().into_iter();
                    while let Some(event) = events.next() {
                        queue.extend(self.feed(LobbyInput::Session(event)));
                        if self.machine.is_finished() {
                            self.carry_over.extend(events.by_ref());
                            break;
                        }
                    }
                    let now = self.now();
                    queue.extend(self.machine.tick(now));
                }
                input = self.inputs.recv() => match input {
                    Some(input) => queue.extend(self.feed(input)),
                    None => {
                        info!("Menu input closed");
                        self.connection.disconnect();
                        return Err(LobbyClosed);
                    }
                }
            }
            self.publish();
        }
    }

    async fn execute(&mut self, effect: LobbyEffect) -> Step {
        match effect {
            LobbyEffect::Connect { request } => {
                let raced = race_input(&mut self.inputs, self.connection.connect()).await;
                let mut effects = Vec::new();
                if let Some(result) = raced.output {
                    effects.extend(self.feed(LobbyInput::ConnectFinished { request, result }));
                }
                self.finish_race(raced.deferred, raced.closed, effects)
            }
            LobbyEffect::RequestRoomList { request } => {
                let raced = race_input(&mut self.inputs, self.connection.request_room_list()).await;
                let mut effects = Vec::new();
                if let Some(rooms) = raced.output {
                    effects.extend(self.feed(LobbyInput::RoomListLoaded { request, rooms }));
                }
                self.finish_race(raced.deferred, raced.closed, effects)
            }
            LobbyEffect::CreateRoom { name, sprite } => {
                self.connection
                    .create_room(PlayerRecord::new(name, sprite, unix_millis()));
                Step::Continue(Vec::new())
            }
            LobbyEffect::JoinRoom { room_id, name, sprite } => {
                self.connection
                    .join_room(room_id, PlayerRecord::new(name, sprite, unix_millis()));
                Step::Continue(Vec::new())
            }
            LobbyEffect::StartGame => {
                self.connection.start_game();
                Step::Continue(Vec::new())
            }
            LobbyEffect::LeaveRoom => {
                self.connection.leave_room();
                Step::Continue(Vec::new())
            }
            LobbyEffect::AbandonRoom { room_id } => {
                self.connection.abandon_room(&room_id);
                Step::Continue(Vec::new())
            }
            LobbyEffect::Disconnect => {
                self.connection.disconnect();
                Step::Continue(Vec::new())
            }
            LobbyEffect::EnterGame(context) => Step::Enter(context),
        }
    }

    fn finish_race(&mut self, deferred: Vec<LobbyInput>, closed: bool, mut effects: Vec<LobbyEffect>) -> Step {
        for input in deferred {
            effects.extend(self.feed(input));
        }
        if closed {
            Step::Closed
        } else {
            Step::Continue(effects)
        }
    }

    fn feed(&mut self, input: LobbyInput) -> Vec<LobbyEffect> {
        let now = self.now();
        self.machine.handle(now, input, self.connection.session())
    }

    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn publish(&self) {
        self.view.send_replace(LobbyView {
            state: self.machine.state().clone(),
            notice: self.machine.notice().cloned(),
            room: self.connection.room_info(),
            sprite: self.machine.sprite().to_string(),
        });
    }

    fn handoff(mut self, context: SessionContext) -> GameStartHandoff<T> {
        self.publish();
        let session = if context.mode == GameMode::Local {
            self.connection.disconnect();
            None
        } else {
            Some(self.connection)
        };
        GameStartHandoff {
            context,
            session,
            pending_events: self.carry_over,
        }
    }
}
