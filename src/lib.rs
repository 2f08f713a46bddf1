pub mod app;
pub mod candidates;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod rcon;
pub mod tailer;
pub mod tally;
pub mod utils;
