use std::fmt;

use crate::net::connection::ConnectError;

/// Operations that can time out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    RoomList,
    CreateRoom,
    JoinRoom,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "Connect",
            Operation::RoomList => "Room list",
            Operation::CreateRoom => "Create room",
            Operation::JoinRoom => "Join room",
        };
        f.write_str(name)
    }
}

/// Failures surfaced to the player. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Connect or send failure, or the connection dropped
    #[error("Connection problem: {0}")]
    Transport(String),
    #[error("{0} timed out")]
    Timeout(Operation),
    /// `roomError` or a generic server `error`
    #[error("Server error: {0}")]
    Protocol(String),
    /// Rejected locally, e.g. starting with too few players
    #[error("{0}")]
    Logic(String),
}

impl SessionError {
    /// Whether the lobby should offer another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SessionError::Logic(_))
    }
}

impl From<ConnectError> for SessionError {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::Timeout(_) => SessionError::Timeout(Operation::Connect),
            ConnectError::Transport(reason) => SessionError::Transport(reason),
        }
    }
}
