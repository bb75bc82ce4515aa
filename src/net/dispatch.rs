//! Typed session events and the handler table that routes them
//!
//! Handlers are registered per [`EventKind`] and run in registration order
//! with mutable access to a caller-chosen context, on the same tick the
//! event was polled.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::net::protocol::{
    MemberChange, RemoteAction, RemoteObjectUpdate, RemoteSnapshot, RoomSnapshot, ServerMessage,
};

/// Everything a `SessionConnection` can report
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RoomCreated(RoomSnapshot),
    RoomJoined(RoomSnapshot),
    PlayerJoined(MemberChange),
    PlayerLeft(MemberChange),
    GameStarted,
    PlayerSnapshot(RemoteSnapshot),
    GameObjectUpdate(RemoteObjectUpdate),
    PlayerAction(RemoteAction),
    Error { message: String },
    RoomError { message: String },
    /// Transport-level loss; never emitted for a local disconnect
    Disconnected { reason: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoomCreated,
    RoomJoined,
    PlayerJoined,
    PlayerLeft,
    GameStarted,
    PlayerSnapshot,
    GameObjectUpdate,
    PlayerAction,
    Error,
    RoomError,
    Disconnected,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::RoomCreated(_) => EventKind::RoomCreated,
            SessionEvent::RoomJoined(_) => EventKind::RoomJoined,
            SessionEvent::PlayerJoined(_) => EventKind::PlayerJoined,
            SessionEvent::PlayerLeft(_) => EventKind::PlayerLeft,
            SessionEvent::GameStarted => EventKind::GameStarted,
            SessionEvent::PlayerSnapshot(_) => EventKind::PlayerSnapshot,
            SessionEvent::GameObjectUpdate(_) => EventKind::GameObjectUpdate,
            SessionEvent::PlayerAction(_) => EventKind::PlayerAction,
            SessionEvent::Error { .. } => EventKind::Error,
            SessionEvent::RoomError { .. } => EventKind::RoomError,
            SessionEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }

    /// Convert a server message into an event. `roomList` is a request
    /// reply, not an event, and yields `None`.
    pub fn from_server(message: ServerMessage) -> Option<Self> {
        let event = match message {
            ServerMessage::RoomCreated(room) => SessionEvent::RoomCreated(room),
            ServerMessage::RoomJoined(room) => SessionEvent::RoomJoined(room),
            ServerMessage::PlayerJoined(change) => SessionEvent::PlayerJoined(change),
            ServerMessage::PlayerLeft(change) => SessionEvent::PlayerLeft(change),
            ServerMessage::GameStarted(_) => SessionEvent::GameStarted,
            ServerMessage::PlayerUpdate(snapshot) => SessionEvent::PlayerSnapshot(snapshot),
            ServerMessage::GameObjectUpdate(update) => SessionEvent::GameObjectUpdate(update),
            ServerMessage::PlayerAction(action) => SessionEvent::PlayerAction(action),
            ServerMessage::Error(e) => SessionEvent::Error { message: e.message },
            ServerMessage::RoomError(e) => SessionEvent::RoomError { message: e.error },
            ServerMessage::RoomList(_) => return None,
        };
        Some(event)
    }
}

pub type Handler<C> = Box<dyn FnMut(&mut C, &SessionEvent)>;

/// Handlers keyed by event kind
pub struct HandlerTable<C> {
    handlers: FxHashMap<EventKind, Vec<Handler<C>>>,
}

impl<C> HandlerTable<C> {
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }

    /// Register a handler for one kind
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: FnMut(&mut C, &SessionEvent) + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Drop every handler for one kind
    pub fn clear(&mut self, kind: EventKind) {
        self.handlers.remove(&kind);
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|h| !h.is_empty())
    }

    /// Run the handlers for `event`; returns how many ran
    pub fn dispatch(&mut self, context: &mut C, event: &SessionEvent) -> usize {
        let kind = event.kind();
        match self.handlers.get_mut(&kind) {
            Some(handlers) if !handlers.is_empty() => {
                trace!(?kind, count = handlers.len(), "Dispatching event");
                for handler in handlers.iter_mut() {
                    handler(context, event);
                }
                handlers.len()
            }
            _ => {
                debug!(?kind, "No handler for event");
                0
            }
        }
    }

    /// Dispatch a batch in order
    pub fn dispatch_all(&mut self, context: &mut C, events: &[SessionEvent]) -> usize {
        events.iter().map(|event| self.dispatch(context, event)).sum()
    }
}

impl<C> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
