//! Pre-game menu flow: room discovery, creation, joining and game start

pub mod driver;
pub mod machine;
pub mod room;
