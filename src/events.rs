//! Turns raw log lines into the events the vote coordinator cares about.
//!
//! Server log lines only ever produce [`LogEvent::RoundTransition`]. Chat log lines are split on
//! a four-space separator into `[timestamp, channel, sender, message]` and scanned for the
//! `!vote` and `!mapvote` commands.

use std::fmt;

/// Appears in the server log whenever the server travels to the next layer
pub const ROUND_TRANSITION_MARKER: &str = "LogWorld: SeamlessTravel to:";

pub const CHAT_FIELD_SEPARATOR: &str = "    ";

pub const ADMIN_CHANNEL: &str = "ChatAdmin";

pub const VOTE_COMMAND: &str = "!vote";

pub const START_VOTE_COMMAND: &str = "!mapvote";

/// Number of characters after `!vote` that make up the choice
const RAW_CHOICE_LEN: usize = 2;

pub type VoterId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    RoundTransition,
    /// `raw_choice` is left unvalidated; the coordinator decides whether it names a candidate
    VoteCast { voter: VoterId, raw_choice: String },
    VoteInitiate { actor_id: VoterId, is_admin: bool },
}

/// Which log a line came from, and therefore how to read it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Server,
    Chat,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Server => write!(f, "server log"),
            LogSource::Chat => write!(f, "chat log"),
        }
    }
}

impl LogSource {
    pub fn classify(&self, line: &str) -> Vec<LogEvent> {
        match self {
            LogSource::Server => classify_server_line(line).into_iter().collect(),
            LogSource::Chat => classify_chat_line(line),
        }
    }
}

pub fn classify_server_line(line: &str) -> Option<LogEvent> {
    line.contains(ROUND_TRANSITION_MARKER)
        .then_some(LogEvent::RoundTransition)
}

/// Both commands are checked independently, so in principle one line could yield two events
pub fn classify_chat_line(line: &str) -> Vec<LogEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(CHAT_FIELD_SEPARATOR).collect();
    let [_timestamp, channel, sender, message, ..] = fields.as_slice() else {
        tracing::debug!("Discarding chat line with {} fields: {}", fields.len(), line);
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(pos) = message.find(VOTE_COMMAND) {
        let raw_choice: String = message[pos + VOTE_COMMAND.len()..]
            .chars()
            .take(RAW_CHOICE_LEN)
            .collect();
        events.push(LogEvent::VoteCast {
            voter: sender.to_string(),
            raw_choice: raw_choice.trim().to_string(),
        });
    }
    if message.contains(START_VOTE_COMMAND) {
        events.push(LogEvent::VoteInitiate {
            actor_id: sender.to_string(),
            is_admin: *channel == ADMIN_CHANNEL,
        });
    }
    events
}
