//! Game Session Management
//!
//! Owns the mutable side of a game: current state, history, timer, chat
//! and seats. Rules stay pure; a [`GameSession`] applies their patches,
//! records them, and rewinds when a resolution fails.
//!
//! [`SessionManager`] keeps many sessions behind async locks so that every
//! submit or tick runs read-state, compute-patch, write-state under the
//! session's own mutex.

pub mod driver;
pub mod manager;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::game::{GameKind, GameOptions, GameResult, MoveError, OptionsError, ResolutionError, Seat};
use crate::history::HistoryError;

pub use driver::GameSession;
pub use manager::SessionManager;

/// Unique game identifier.
pub type GameId = Uuid;

/// Lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Waiting for seats to fill.
    Created,
    /// Accepting moves and advancing.
    Active,
    /// Frozen by an operator.
    Paused,
    /// A result was reached.
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::Created => "created",
            GameStatus::Active => "active",
            GameStatus::Paused => "paused",
            GameStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// When it was posted.
    pub timestamp: DateTime<Utc>,
    /// Author; `system` for engine messages.
    pub user: String,
    /// Text.
    pub message: String,
}

/// Author name used for engine messages.
pub const SYSTEM_USER: &str = "system";

/// Configuration for sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum concurrent sessions in a manager.
    pub max_sessions: usize,
    /// Chat lines included in a snapshot.
    pub chat_tail: usize,
    /// Upper bound on advances per poll.
    pub max_advances_per_poll: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            chat_tail: 50,
            max_advances_per_poll: 16,
        }
    }
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Applied and recorded.
    Accepted,
    /// The move was valid but its patch failed; the game was rewound.
    RolledBack {
        /// Message posted to chat.
        reason: String,
    },
}

/// Result of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do yet.
    Idle,
    /// State advanced by one patch.
    Advanced {
        /// A new history keyframe was opened.
        keyframe: bool,
        /// The game ended with this patch.
        finished: Option<GameResult>,
    },
    /// Resolution failed; the game was rewound.
    RolledBack {
        /// Message posted to chat.
        reason: String,
    },
}

/// What a client sees of a game.
#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    /// Game identifier.
    pub id: GameId,
    /// Game type.
    pub kind: GameKind,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Seconds between timed advances; -1 when no timer runs.
    pub timer_duration: i64,
    /// Seconds left on the timer.
    pub time_remaining: i64,
    /// State as visible to the requesting seat.
    pub state: Value,
    /// Latest chat lines.
    pub chat: Vec<ChatEntry>,
    /// Game options.
    pub options: GameOptions,
    /// Seat names.
    pub seats: [Option<String>; 2],
    /// Final result, once reached.
    pub result: Option<GameResult>,
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Seat already has a player.
    #[error("seat {0} is taken")]
    SeatTaken(Seat),

    /// Move rejected; nothing changed.
    #[error(transparent)]
    InvalidMove(#[from] MoveError),

    /// Option overrides rejected.
    #[error(transparent)]
    Options(#[from] OptionsError),

    /// Initial state could not be built.
    #[error("setup failed: {0}")]
    Setup(#[from] ResolutionError),

    /// History could not be updated.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// No session with this id.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// Manager is at capacity.
    #[error("too many games (limit {0})")]
    Capacity(usize),

    /// Operation not allowed in the current status.
    #[error("not allowed while {0}")]
    InvalidState(GameStatus),
}
