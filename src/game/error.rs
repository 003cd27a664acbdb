//! Game error taxonomy.
//!
//! [`MoveError`] is user-facing and recoverable: the move is rejected and
//! nothing changes. [`ResolutionError`] is internal and fatal to the
//! current resolution attempt; the driver answers it with a rewind.

use thiserror::Error;

use crate::core::patch::PatchError;
use crate::history::HistoryError;

use super::rps::cards::CardId;
use super::Seat;

/// A submission failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Moves are only accepted while the game is active.
    #[error("game is {0}")]
    GameNotActive(String),

    /// Stage 4 is resolving; wait for the next round.
    #[error("between rounds")]
    BetweenRounds,

    /// An active restriction blocks this move.
    #[error("Move rejected due to {origin}")]
    Restricted {
        /// Who imposed the restriction, and when.
        origin: String,
    },

    /// The chosen slot is not unlocked in the current stage.
    #[error("that move is not available yet")]
    NotAvailable,

    /// Only one pick per round in timed games.
    #[error("already submitted")]
    AlreadySubmitted,

    /// Identical to the pending submission.
    #[error("duplicate submission")]
    Duplicate,

    /// Selection outside the selectable slots.
    #[error("selection {0} is out of range")]
    OutOfRange(i64),

    /// Payload has the wrong shape for the current stage.
    #[error("expecting {expected}; got {got}")]
    WrongShape {
        /// What the stage accepts.
        expected: &'static str,
        /// What arrived.
        got: String,
    },

    /// Bets exceed the per-stage cap.
    #[error("bets total {total}, over the cap of {cap}")]
    OverCap {
        /// Submitted total.
        total: u64,
        /// Configured cap.
        cap: u32,
    },

    /// Statement id does not exist (or is not eligible here).
    #[error("no statement {0}")]
    UnknownStatement(usize),

    /// Statement text is empty or too long.
    #[error("statements must be between 1 and {max} characters")]
    BadStatement {
        /// Character limit.
        max: usize,
    },

    /// Statement already on the table.
    #[error("don't submit an existing statement, that's boring")]
    ExistingStatement,

    /// Card is not in the submitting seat's hand.
    #[error("card {0} is not in your hand")]
    NotInHand(u8),

    /// Adjudication must cover every statement.
    #[error("adjudicate every statement; missing {0:?}")]
    Incomplete(Vec<usize>),

    /// No more stages to play.
    #[error("game is over")]
    GameOver,

    /// Stored state could not be decoded.
    #[error("state unreadable: {0}")]
    Unreadable(String),
}

/// Fatal failure while computing an advance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Card identifier or slot does not resolve to a card.
    #[error("unknown card {0}")]
    UnknownCard(String),

    /// Deck option does not fit the slot layout.
    #[error("invalid deck: {0}")]
    InvalidDeck(String),

    /// The resolving seat has no selection.
    #[error("{seat} has no selection to resolve")]
    NoSelection {
        /// Resolving seat.
        seat: Seat,
    },

    /// Ability counter points past the card's steps.
    #[error("{card:?} has no ability step {step}")]
    InvalidStep {
        /// Card being resolved.
        card: CardId,
        /// Requested step.
        step: u32,
    },

    /// State does not decode into the game's model.
    #[error("malformed state: {0}")]
    MalformedState(String),

    /// Patch construction or application failed.
    #[error("malformed patch: {0}")]
    Patch(#[from] PatchError),

    /// History lookup failed.
    #[error("history: {0}")]
    History(#[from] HistoryError),
}

impl From<serde_json::Error> for ResolutionError {
    fn from(err: serde_json::Error) -> Self {
        ResolutionError::MalformedState(err.to_string())
    }
}
