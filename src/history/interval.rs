//! History intervals: one keyframe plus the events recorded after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::patch::{apply, Patch, PatchError};
use crate::game::Seat;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Full state snapshot anchoring an interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// State at the moment the interval opened.
    pub state: Value,
    /// When the interval opened.
    pub timestamp: DateTime<Utc>,
    /// Excluded from canonical reconstruction.
    #[serde(default, skip_serializing_if = "is_false")]
    pub rewound: bool,
}

/// What produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A player submission.
    Move,
    /// A stage advance that did not change the keyframe field.
    Time,
    /// A recovery rewind; the payload carries the reason.
    Rewind,
}

/// One entry after a keyframe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Submitting seat, for moves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<Seat>,
    /// Raw move JSON or rewind reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// State change this event applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEvent {
    /// A submitted move and the patch it produced.
    pub fn player_move(seat: Seat, payload: Value, patch: Patch, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Move,
            seat: Some(seat),
            payload: Some(payload),
            patch: Some(patch),
            timestamp,
        }
    }

    /// A timed advance within the same interval.
    pub fn time(patch: Patch, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Time,
            seat: None,
            payload: None,
            patch: Some(patch),
            timestamp,
        }
    }

    /// A system rewind marker.
    pub fn rewind(reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Rewind,
            seat: None,
            payload: Some(Value::String(reason.to_string())),
            patch: None,
            timestamp,
        }
    }
}

/// A keyframe followed by its events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Anchoring snapshot.
    pub keyframe: Keyframe,
    /// Events in recording order.
    pub events: Vec<HistoryEvent>,
}

impl Interval {
    /// Open a new interval at `state`.
    pub fn new(state: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            keyframe: Keyframe { state, timestamp, rewound: false },
            events: Vec::new(),
        }
    }

    /// Excluded from the canonical line.
    pub fn is_rewound(&self) -> bool {
        self.keyframe.rewound
    }

    /// Keyframe state followed by the state after each of the first
    /// `count` patch-carrying events (all of them when `None`).
    pub fn states(&self, count: Option<usize>) -> Result<Vec<Value>, PatchError> {
        let patches = self.events.iter().filter_map(|e| e.patch.as_ref());
        let limit = count.unwrap_or(usize::MAX);

        let mut states = vec![self.keyframe.state.clone()];
        for patch in patches.take(limit) {
            let next = match states.last() {
                Some(prev) => apply(prev, patch)?,
                None => break,
            };
            states.push(next);
        }
        Ok(states)
    }

    /// Final state after the first `count` patch-carrying events.
    pub fn final_state(&self, count: Option<usize>) -> Result<Value, PatchError> {
        let limit = count.unwrap_or(usize::MAX);
        self.events
            .iter()
            .filter_map(|e| e.patch.as_ref())
            .take(limit)
            .try_fold(self.keyframe.state.clone(), |state, patch| apply(&state, patch))
    }
}
