//! CGC Netplay client library
//!
//! Multiplayer session layer for a small brawler: a WebTransport session
//! connection, the room lobby state machine, player replication and
//! hit-volume combat.

pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod net;
pub mod util;
