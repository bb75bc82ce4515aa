pub mod combat;
pub mod constants;
pub mod input_buffer;
pub mod player;
pub mod presentation;
pub mod replicator;
