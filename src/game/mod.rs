//! Game logic (deterministic).
//!
//! Each game type implements [`Rules`]: a pure state machine that reads the
//! current state (plus history for look-backs) and answers with a
//! [`Patch`]. Nothing here mutates shared state; the session driver owns
//! application, history and recovery.
//!
//! State crosses this boundary as JSON. Inside, every rules implementation
//! decodes it into its own typed model.

pub mod error;
pub mod liar;
pub mod options;
pub mod rps;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::patch::Patch;
use crate::history::HistoryLog;

pub use error::{MoveError, ResolutionError};
pub use options::{GameOptions, OptionsError};

// =============================================================================
// SEATS
// =============================================================================

/// One of the two player seats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    /// First seat.
    P1,
    /// Second seat.
    P2,
}

impl Seat {
    /// Both seats in resolution order.
    pub const ALL: [Seat; 2] = [Seat::P1, Seat::P2];

    /// The other seat.
    #[inline]
    pub fn opp(self) -> Seat {
        match self {
            Seat::P1 => Seat::P2,
            Seat::P2 => Seat::P1,
        }
    }

    /// State key for this seat's sub-state.
    #[inline]
    pub fn key(self) -> &'static str {
        match self {
            Seat::P1 => "p1",
            Seat::P2 => "p2",
        }
    }

    /// Zero-based seat index.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Seat::P1 => 0,
            Seat::P2 => 1,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// GAME KINDS
// =============================================================================

/// Closed registry of game types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    /// Card battle.
    Rps,
    /// Statement writing and betting.
    Liar,
}

impl GameKind {
    /// Rules implementation for this kind.
    pub fn rules(self) -> &'static dyn Rules {
        match self {
            GameKind::Rps => &rps::RpsRules,
            GameKind::Liar => &liar::LiarRules,
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Rps => f.write_str("rps"),
            GameKind::Liar => f.write_str("liar"),
        }
    }
}

/// Final result of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    /// One seat won.
    Winner(Seat),
    /// Nobody won.
    Draw,
}

// =============================================================================
// TICK CLOCK
// =============================================================================

/// Timer bookkeeping owned by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickClock {
    /// When the state last advanced.
    pub last_tick: Option<DateTime<Utc>>,
    /// Seconds until the next timed advance.
    pub next_tick: Option<u32>,
}

impl TickClock {
    /// True once more than `next_tick` seconds passed since `last_tick`.
    pub fn has_ticked(&self, now: DateTime<Utc>) -> bool {
        match (self.last_tick, self.next_tick) {
            (Some(last), Some(secs)) => now - last > Duration::seconds(secs as i64),
            _ => false,
        }
    }

    /// Seconds left on the timer (0 once elapsed or unset).
    pub fn remaining(&self, now: DateTime<Utc>) -> i64 {
        match (self.last_tick, self.next_tick) {
            (Some(last), Some(secs)) => (secs as i64 - (now - last).num_seconds()).max(0),
            _ => 0,
        }
    }

    /// Restart the timer.
    pub fn reset(&mut self, now: DateTime<Utc>, next_tick: Option<u32>) {
        self.last_tick = Some(now);
        self.next_tick = next_tick;
    }
}

// =============================================================================
// RULES
// =============================================================================

/// Turn-resolution state machine of one game type.
///
/// Every method is a pure function of its arguments.
pub trait Rules: Send + Sync {
    /// Which game this is.
    fn kind(&self) -> GameKind;

    /// Path of the field whose change opens a new history interval.
    fn keyframe_field(&self) -> &'static [&'static str] {
        &["meta", "round"]
    }

    /// Options used when the creator overrides nothing.
    fn default_options(&self) -> GameOptions;

    /// Initial state.
    fn start_state(&self, options: &GameOptions) -> Result<Value, ResolutionError>;

    /// Whether the driver should call [`Rules::advance`] now.
    fn should_advance(&self, options: &GameOptions, state: &Value, clock: &TickClock, now: DateTime<Utc>) -> bool;

    /// Finalize the current stage and prepare the next.
    fn advance(&self, options: &GameOptions, state: &Value, history: &HistoryLog) -> Result<Patch, ResolutionError>;

    /// Validate a move and describe its effect. Rejections have no side effects.
    fn submit_move(&self, options: &GameOptions, state: &Value, seat: Seat, mv: &Value) -> Result<Patch, MoveError>;

    /// Seconds until the next timed advance.
    fn next_tick(&self, options: &GameOptions, state: &Value) -> Option<u32>;

    /// Final result, once the game is decided.
    fn winner(&self, state: &Value) -> Result<Option<GameResult>, ResolutionError>;

    /// What `seat` is allowed to see (`None` for spectators).
    fn view(&self, state: &Value, history: &HistoryLog, seat: Option<Seat>) -> Result<Value, ResolutionError>;

    /// Current value of the keyframe field.
    fn keyframe_value<'a>(&self, state: &'a Value) -> Option<&'a Value> {
        self.keyframe_field().iter().try_fold(state, |node, key| node.get(*key))
    }
}

// =============================================================================
// TESTS
// =============================================================================
