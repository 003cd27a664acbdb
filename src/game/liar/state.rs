//! Liar state definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::error::ResolutionError;
use crate::game::{GameResult, Seat};

/// Longest accepted statement, in characters.
pub const MAX_STATEMENT_LEN: usize = 280;

/// Written for a seat that submitted nothing.
pub const DEFAULT_STATEMENT: &str = "One equals one";

/// Cards dealt per hand.
pub const HAND_SIZE: usize = 5;

/// Kind of stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiarStage {
    /// Each seat writes a statement.
    Write,
    /// Seats flag ambiguous statements.
    Clarify,
    /// Seats bet on statements being true or false.
    Bet,
    /// Each seat reveals a card from hand.
    Reveal,
    /// Seats agree on the truth of every statement.
    Adjudicate,
}

/// Stage played at each value of `meta.round`.
pub const ROUND_STRUCTURE: [LiarStage; 12] = [
    LiarStage::Write,
    LiarStage::Clarify,
    LiarStage::Bet,
    LiarStage::Write,
    LiarStage::Clarify,
    LiarStage::Bet,
    LiarStage::Write,
    LiarStage::Clarify,
    LiarStage::Bet,
    LiarStage::Reveal,
    LiarStage::Bet,
    LiarStage::Adjudicate,
];

/// Bet amounts placed on one statement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// On the statement being true.
    #[serde(rename = "true", default)]
    pub yes: u32,
    /// On the statement being false.
    #[serde(rename = "false", default)]
    pub no: u32,
}

impl Bet {
    /// Total staked.
    pub fn total(&self) -> u64 {
        self.yes as u64 + self.no as u64
    }
}

/// Bet history of one seat on one statement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    /// Amounts bet on true, one entry per betting stage.
    #[serde(rename = "true", default)]
    pub yes: Vec<u32>,
    /// Amounts bet on false.
    #[serde(rename = "false", default)]
    pub no: Vec<u32>,
}

impl Votes {
    /// Sum staked on `truth`.
    pub fn on(&self, truth: bool) -> u64 {
        let bets = if truth { &self.yes } else { &self.no };
        bets.iter().map(|v| *v as u64).sum()
    }
}

/// Votes of both seats.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatVotes {
    /// First seat.
    pub p1: Votes,
    /// Second seat.
    pub p2: Votes,
}

impl SeatVotes {
    /// Votes of `seat`.
    pub fn of(&self, seat: Seat) -> &Votes {
        match seat {
            Seat::P1 => &self.p1,
            Seat::P2 => &self.p2,
        }
    }
}

/// A statement on the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement text.
    pub text: String,
    /// Writer.
    pub author: Seat,
    /// Round of the WRITE stage that produced it.
    pub written_in: u32,
    /// Bets per seat.
    #[serde(default)]
    pub votes: SeatVotes,
    /// Agreed truth; absent until adjudicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth: Option<bool>,
}

/// A revealed card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revealed {
    /// Owner.
    pub seat: Seat,
    /// Card value.
    pub card: u8,
}

/// Pending submission of a seat, shaped by the stage it answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "value", rename_all = "UPPERCASE")]
pub enum LiarSubmission {
    /// Statement text.
    Write(String),
    /// Ids flagged as ambiguous.
    Clarify(Vec<usize>),
    /// Bets by statement id.
    Bet(BTreeMap<usize, Bet>),
    /// Card to reveal.
    Reveal(u8),
    /// Verdict by statement id.
    Adjudicate(BTreeMap<usize, bool>),
}

/// One seat's sub-state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiarPlayer {
    /// Cards in hand.
    pub hand: Vec<u8>,
    /// Submission for the current stage.
    #[serde(default)]
    pub submission: Option<LiarSubmission>,
}

/// Round bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiarMeta {
    /// Index into [`ROUND_STRUCTURE`] (keyframe field).
    pub round: u32,
    /// Messages produced by the last advance.
    #[serde(default)]
    pub message: Vec<String>,
    /// Set once the last stage resolves.
    #[serde(default)]
    pub winner: Option<GameResult>,
}

/// Whole Liar state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiarState {
    /// Round bookkeeping.
    pub meta: LiarMeta,
    /// Statements in writing order; the index is the statement id.
    pub statements: Vec<Statement>,
    /// Cards revealed so far.
    pub revealed: Vec<Revealed>,
    /// First seat.
    pub p1: LiarPlayer,
    /// Second seat.
    pub p2: LiarPlayer,
}

impl LiarState {
    /// Decode from the boundary representation.
    pub fn from_value(value: &Value) -> Result<Self, ResolutionError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Encode to the boundary representation.
    pub fn to_value(&self) -> Result<Value, ResolutionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Stage being played, or `None` once the game is over.
    pub fn stage(&self) -> Option<LiarStage> {
        ROUND_STRUCTURE.get(self.meta.round as usize).copied()
    }

    /// Seat sub-state.
    pub fn player(&self, seat: Seat) -> &LiarPlayer {
        match seat {
            Seat::P1 => &self.p1,
            Seat::P2 => &self.p2,
        }
    }

    /// Ids written in the most recent WRITE stage.
    pub fn latest_written(&self) -> Vec<usize> {
        let latest = self.statements.iter().map(|s| s.written_in).max();
        self.statements
            .iter()
            .enumerate()
            .filter(|(_, s)| Some(s.written_in) == latest)
            .map(|(id, _)| id)
            .collect()
    }

    /// Σ (own bets on the truth) × (opponent bets on the falsehood).
    pub fn score(&self, seat: Seat) -> u64 {
        self.statements
            .iter()
            .filter_map(|s| s.truth.map(|truth| (s, truth)))
            .map(|(s, truth)| s.votes.of(seat).on(truth) * s.votes.of(seat.opp()).on(!truth))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_wire_format() {
        let mut bets = BTreeMap::new();
        bets.insert(2, Bet { yes: 3, no: 0 });
        let value = serde_json::to_value(LiarSubmission::Bet(bets.clone())).unwrap();
        assert_eq!(value, json!({"stage": "BET", "value": {"2": {"true": 3, "false": 0}}}));
        let back: LiarSubmission = serde_json::from_value(value).unwrap();
        assert_eq!(back, LiarSubmission::Bet(bets));
    }

    #[test]
    fn test_score() {
        let statement = |truth, p1: Votes, p2: Votes| Statement {
            text: "x".into(),
            author: Seat::P1,
            written_in: 0,
            votes: SeatVotes { p1, p2 },
            truth,
        };
        let state = LiarState {
            meta: LiarMeta { round: 12, message: vec![], winner: None },
            statements: vec![
                statement(Some(true), Votes { yes: vec![3, 1], no: vec![] }, Votes { yes: vec![], no: vec![2] }),
                statement(Some(false), Votes { yes: vec![], no: vec![1] }, Votes { yes: vec![5], no: vec![] }),
                statement(None, Votes { yes: vec![9], no: vec![] }, Votes { yes: vec![], no: vec![9] }),
            ],
            revealed: vec![],
            p1: LiarPlayer::default(),
            p2: LiarPlayer::default(),
        };
        assert_eq!(state.score(Seat::P1), 4 * 2 + 5);
        assert_eq!(state.score(Seat::P2), 0);
    }
}
