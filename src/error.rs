//! Typed errors for the pieces that callers need to tell apart. Everything else is a
//! `color_eyre::Report`.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    #[error("failed to read map rotation: {0}")]
    Io(#[from] io::Error),

    #[error("map rotation has no entries")]
    EmptyRotation,
}

#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("rcon io error: {0}")]
    Io(#[from] io::Error),

    #[error("rcon authentication rejected")]
    AuthRejected,

    #[error("rcon connection closed by server")]
    Closed,

    #[error("rcon request timed out")]
    Timeout,

    #[error("malformed rcon packet: {0}")]
    Malformed(String),
}
