pub mod connection;
pub mod dispatch;
pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;
