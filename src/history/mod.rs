//! History Log
//!
//! Append-only sequence of intervals. Each interval opens with a keyframe
//! (full snapshot) when the game's keyframe field changes, and collects the
//! patches applied until the next one. Any recorded state can be rebuilt by
//! folding patches from its keyframe.
//!
//! Rewind never deletes: it flags trailing intervals as rewound, which
//! hides them from the canonical line while keeping the audit trail.

pub mod interval;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::patch::PatchError;

pub use interval::{EventKind, HistoryEvent, Interval, Keyframe};

/// History log failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// No keyframe has been recorded yet.
    #[error("history is empty")]
    Empty,

    /// Interval index has no canonical counterpart.
    #[error("interval {index} out of range ({canonical} canonical intervals)")]
    OutOfRange {
        /// Requested index (negative counts from the end).
        index: isize,
        /// Canonical interval count.
        canonical: usize,
    },

    /// Rewind depth is zero or exceeds the canonical line.
    #[error("cannot rewind {requested} intervals ({canonical} canonical intervals)")]
    InvalidRewind {
        /// Requested depth.
        requested: usize,
        /// Canonical interval count.
        canonical: usize,
    },

    /// Stored patch no longer applies.
    #[error("replay failed: {0}")]
    Patch(#[from] PatchError),
}

/// Result of [`HistoryLog::reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstructed {
    /// Keyframe state followed by every intermediate state.
    Sequence(Vec<Value>),
    /// Only the last state.
    Final(Value),
}

impl Reconstructed {
    /// The last state in either form.
    pub fn into_final(self) -> Option<Value> {
        match self {
            Reconstructed::Sequence(mut states) => states.pop(),
            Reconstructed::Final(state) => Some(state),
        }
    }
}

/// Keyframed, rewindable event log of one game.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    intervals: Vec<Interval>,
}

impl HistoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a log with its first keyframe.
    pub fn starting_at(state: Value, timestamp: DateTime<Utc>) -> Self {
        let mut log = Self::new();
        log.open_keyframe(state, timestamp);
        log
    }

    /// Close the current interval and open a new one at `snapshot`.
    pub fn open_keyframe(&mut self, snapshot: Value, timestamp: DateTime<Utc>) {
        debug!(interval = self.intervals.len(), "keyframe");
        self.intervals.push(Interval::new(snapshot, timestamp));
    }

    /// Record an event in the current interval.
    pub fn append_event(&mut self, event: HistoryEvent) -> Result<(), HistoryError> {
        let current = self.intervals.last_mut().ok_or(HistoryError::Empty)?;
        current.events.push(event);
        Ok(())
    }

    /// Every interval, rewound ones included.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Intervals on the canonical line, oldest first.
    pub fn canonical(&self) -> impl Iterator<Item = &Interval> + '_ {
        self.intervals.iter().filter(|i| !i.is_rewound())
    }

    /// Interval count including rewound ones.
    pub fn raw_len(&self) -> usize {
        self.intervals.len()
    }

    /// Canonical interval count.
    pub fn canonical_len(&self) -> usize {
        self.canonical().count()
    }

    /// Keyframe of the open interval.
    pub fn current_keyframe(&self) -> Option<&Keyframe> {
        self.intervals.last().map(|i| &i.keyframe)
    }

    /// Canonical interval by index; negative indices count from the end.
    pub fn canonical_interval(&self, index: isize) -> Result<&Interval, HistoryError> {
        let canonical: Vec<&Interval> = self.canonical().collect();
        let len = canonical.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|i| *i < len)
        };
        resolved
            .and_then(|i| canonical.get(i).copied())
            .ok_or(HistoryError::OutOfRange { index, canonical: len })
    }

    /// Rebuild states of one canonical interval.
    ///
    /// Folds the first `count` patch-carrying events (all when `None`)
    /// onto the keyframe. With `last_only` only the final state is
    /// returned, otherwise the keyframe and every intermediate state.
    pub fn reconstruct(
        &self,
        index: isize,
        count: Option<usize>,
        last_only: bool,
    ) -> Result<Reconstructed, HistoryError> {
        let interval = self.canonical_interval(index)?;
        if last_only {
            Ok(Reconstructed::Final(interval.final_state(count)?))
        } else {
            Ok(Reconstructed::Sequence(interval.states(count)?))
        }
    }

    /// Final state of a canonical interval, if it exists and replays.
    ///
    /// Read-only accessor for "what happened last turn" lookups.
    pub fn last_state(&self, index: isize) -> Option<Value> {
        self.canonical_interval(index).ok()?.final_state(None).ok()
    }

    /// Roll the canonical line back `n` intervals.
    ///
    /// The trailing `n` canonical intervals are flagged rewound, a new
    /// interval opens at the keyframe the earliest of them started from,
    /// and a rewind event carrying `reason` is recorded in it. Returns the
    /// restored state. `n = 1` restores the start of the open interval.
    pub fn rewind(&mut self, n: usize, reason: &str, now: DateTime<Utc>) -> Result<Value, HistoryError> {
        let canonical: Vec<usize> = self
            .intervals
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_rewound())
            .map(|(idx, _)| idx)
            .collect();

        if n == 0 || n > canonical.len() {
            return Err(HistoryError::InvalidRewind { requested: n, canonical: canonical.len() });
        }

        let trailing = &canonical[canonical.len() - n..];
        let target = self.intervals[trailing[0]].keyframe.state.clone();
        for idx in trailing {
            self.intervals[*idx].keyframe.rewound = true;
        }

        warn!(intervals = n, reason, "history rewound");
        self.open_keyframe(target.clone(), now);
        self.append_event(HistoryEvent::rewind(reason, now))?;
        Ok(target)
    }
}

// =============================================================================
// TESTS
// =============================================================================
