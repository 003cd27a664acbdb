//! Liar: a statement writing and betting game.
//!
//! Twelve stages, indexed by `meta.round`:
//!
//! ```text
//! WRITE CLARIFY BET  x3     statements go on the table, bets are placed
//! REVEAL BET               one card from each hand, one more betting stage
//! ADJUDICATE               both seats settle the truth of every statement
//! ```
//!
//! A flag in CLARIFY drops the statements just written and sends the game
//! back to WRITE. Disagreement in ADJUDICATE repeats the stage.

pub mod state;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::core::patch::{apply, Patch};
use crate::core::rng::DeterministicRng;
use crate::history::HistoryLog;

use super::error::{MoveError, ResolutionError};
use super::options::GameOptions;
use super::{GameKind, GameResult, Rules, Seat, TickClock};

use state::{
    Bet, LiarMeta, LiarPlayer, LiarStage, LiarState, LiarSubmission, Revealed, Statement, DEFAULT_STATEMENT,
    HAND_SIZE, MAX_STATEMENT_LEN,
};

fn parse<T: DeserializeOwned>(mv: &Value, expected: &'static str) -> Result<T, MoveError> {
    serde_json::from_value(mv.clone()).map_err(|_| MoveError::WrongShape { expected, got: mv.to_string() })
}

fn unreadable(err: impl ToString) -> MoveError {
    MoveError::Unreadable(err.to_string())
}

/// Rules of the Liar game.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiarRules;

impl LiarRules {
    fn validate(&self, options: &GameOptions, state: &LiarState, mv: &Value) -> Result<LiarSubmission, MoveError> {
        let stage = state.stage().ok_or(MoveError::GameOver)?;
        match stage {
            LiarStage::Write => {
                let text = mv.as_str().ok_or_else(|| MoveError::WrongShape {
                    expected: "a statement",
                    got: mv.to_string(),
                })?;
                let len = text.trim().chars().count();
                if len == 0 || len > MAX_STATEMENT_LEN {
                    return Err(MoveError::BadStatement { max: MAX_STATEMENT_LEN });
                }
                if state.statements.iter().any(|s| s.text == text) {
                    return Err(MoveError::ExistingStatement);
                }
                Ok(LiarSubmission::Write(text.to_string()))
            }
            LiarStage::Clarify => {
                let ids: Vec<usize> = parse(mv, "a list of statement ids")?;
                let eligible = state.latest_written();
                if let Some(id) = ids.iter().find(|id| !eligible.contains(id)) {
                    return Err(MoveError::UnknownStatement(*id));
                }
                Ok(LiarSubmission::Clarify(ids))
            }
            LiarStage::Bet => {
                let bets: BTreeMap<usize, Bet> = parse(mv, "bets by statement id")?;
                if let Some(id) = bets.keys().find(|id| **id >= state.statements.len()) {
                    return Err(MoveError::UnknownStatement(*id));
                }
                let total: u64 = bets.values().map(Bet::total).sum();
                if total > options.bet_cap as u64 {
                    return Err(MoveError::OverCap { total, cap: options.bet_cap });
                }
                Ok(LiarSubmission::Bet(bets))
            }
            LiarStage::Reveal => Ok(LiarSubmission::Reveal(parse(mv, "a card from your hand")?)),
            LiarStage::Adjudicate => {
                let verdicts: BTreeMap<usize, bool> = parse(mv, "a verdict for every statement")?;
                if let Some(id) = verdicts.keys().find(|id| **id >= state.statements.len()) {
                    return Err(MoveError::UnknownStatement(*id));
                }
                let missing: Vec<usize> = (0..state.statements.len())
                    .filter(|id| !verdicts.contains_key(id))
                    .collect();
                if !missing.is_empty() {
                    return Err(MoveError::Incomplete(missing));
                }
                Ok(LiarSubmission::Adjudicate(verdicts))
            }
        }
    }

    fn finish_write(&self, state: &LiarState, patch: &mut Patch) -> Result<u32, ResolutionError> {
        let round = state.meta.round;
        let mut written = Vec::new();
        for seat in Seat::ALL {
            let text = match &state.player(seat).submission {
                Some(LiarSubmission::Write(text)) => text.clone(),
                _ => DEFAULT_STATEMENT.to_string(),
            };
            let statement = Statement { text, author: seat, written_in: round, votes: Default::default(), truth: None };
            written.push(serde_json::to_value(statement)?);
        }
        patch.list_insert(&["statements"], written)?;
        Ok(round + 1)
    }

    fn finish_clarify(&self, state: &LiarState, patch: &mut Patch) -> Result<u32, ResolutionError> {
        let flagged: Vec<usize> = Seat::ALL
            .iter()
            .filter_map(|seat| match &state.player(*seat).submission {
                Some(LiarSubmission::Clarify(ids)) => Some(ids.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        if flagged.is_empty() {
            return Ok(state.meta.round + 1);
        }

        let dropped = state.latest_written();
        debug!(?flagged, ?dropped, "statements flagged; rewriting");
        patch.list_delete(&["statements"], dropped)?;
        patch.set_serialized(&["meta", "message"], &["statements were unclear; write again"])?;
        Ok(state.meta.round.saturating_sub(1))
    }

    fn finish_bet(&self, state: &LiarState, patch: &mut Patch) -> Result<u32, ResolutionError> {
        for seat in Seat::ALL {
            let bets = match &state.player(seat).submission {
                Some(LiarSubmission::Bet(bets)) => bets,
                _ => continue,
            };
            for (id, bet) in bets {
                let mut votes = Patch::empty();
                votes.list_insert(&["votes", seat.key(), "true"], vec![json!(bet.yes)])?;
                votes.list_insert(&["votes", seat.key(), "false"], vec![json!(bet.no)])?;
                patch.list_update(&["statements"], *id, votes)?;
            }
        }
        Ok(state.meta.round + 1)
    }

    fn finish_reveal(&self, state: &LiarState, patch: &mut Patch) -> Result<u32, ResolutionError> {
        for seat in Seat::ALL {
            let player = state.player(seat);
            let card = match &player.submission {
                Some(LiarSubmission::Reveal(card)) => Some(*card),
                _ => player.hand.first().copied(),
            };
            if let Some(card) = card {
                patch.list_insert(&["revealed"], vec![serde_json::to_value(Revealed { seat, card })?])?;
                patch.list_delete_values(&[seat.key(), "hand"], vec![json!(card)])?;
            }
        }
        Ok(state.meta.round + 1)
    }

    fn finish_adjudicate(&self, state: &LiarState, patch: &mut Patch) -> Result<u32, ResolutionError> {
        let verdicts = |seat: Seat| match &state.player(seat).submission {
            Some(LiarSubmission::Adjudicate(v)) => Some(v),
            _ => None,
        };
        let (p1, p2) = (verdicts(Seat::P1), verdicts(Seat::P2));

        let mut truths = Vec::with_capacity(state.statements.len());
        let mut disputed = Vec::new();
        for id in 0..state.statements.len() {
            let a = p1.and_then(|v| v.get(&id)).copied();
            let b = p2.and_then(|v| v.get(&id)).copied();
            match (a, b) {
                (Some(x), Some(y)) if x == y => truths.push(x),
                (Some(x), None) | (None, Some(x)) => truths.push(x),
                (Some(_), Some(_)) => disputed.push(id),
                // Nobody ruled before the timer ran out.
                (None, None) => truths.push(false),
            }
        }

        if !disputed.is_empty() {
            info!(?disputed, "adjudication disputed; repeating stage");
            patch.set_serialized(&["meta", "message"], &[format!("no agreement on statements {disputed:?}")])?;
            return Ok(state.meta.round);
        }

        for (id, truth) in truths.iter().enumerate() {
            patch.list_update(&["statements"], id, Patch::at(&["truth"], Patch::Value(json!(truth))))?;
        }

        // Score against the settled statements.
        let mut settled = state.clone();
        for (statement, truth) in settled.statements.iter_mut().zip(&truths) {
            statement.truth = Some(*truth);
        }
        let (s1, s2) = (settled.score(Seat::P1), settled.score(Seat::P2));
        let result = match s1.cmp(&s2) {
            std::cmp::Ordering::Greater => GameResult::Winner(Seat::P1),
            std::cmp::Ordering::Less => GameResult::Winner(Seat::P2),
            std::cmp::Ordering::Equal => GameResult::Draw,
        };
        info!(p1 = s1, p2 = s2, ?result, "liar game settled");
        patch.set_serialized(&["meta", "winner"], &result)?;
        patch.set_serialized(&["meta", "message"], &[format!("final score {s1} to {s2}")])?;
        Ok(state.meta.round + 1)
    }
}

impl Rules for LiarRules {
    fn kind(&self) -> GameKind {
        GameKind::Liar
    }

    fn default_options(&self) -> GameOptions {
        GameOptions { timer: 180, ..GameOptions::default() }
    }

    fn start_state(&self, options: &GameOptions) -> Result<Value, ResolutionError> {
        let mut deck: Vec<u8> = (0..5).flat_map(|_| 1..=9).collect();
        DeterministicRng::for_turn(options.seed, 0, b"liar-deck").shuffle(&mut deck);
        LiarState {
            meta: LiarMeta { round: 0, message: vec!["Game Start".to_string()], winner: None },
            statements: Vec::new(),
            revealed: Vec::new(),
            p1: LiarPlayer { hand: deck[..HAND_SIZE].to_vec(), submission: None },
            p2: LiarPlayer { hand: deck[HAND_SIZE..2 * HAND_SIZE].to_vec(), submission: None },
        }
        .to_value()
    }

    fn should_advance(&self, options: &GameOptions, state: &Value, clock: &TickClock, now: DateTime<Utc>) -> bool {
        let state = match LiarState::from_value(state) {
            Ok(state) if state.stage().is_some() => state,
            _ => return false,
        };
        let submitted = state.p1.submission.is_some() && state.p2.submission.is_some();
        (options.timed && clock.has_ticked(now)) || submitted
    }

    fn advance(&self, _options: &GameOptions, state: &Value, _history: &HistoryLog) -> Result<Patch, ResolutionError> {
        let typed = LiarState::from_value(state)?;
        let stage = typed
            .stage()
            .ok_or_else(|| ResolutionError::MalformedState("the game is over".into()))?;

        let mut patch = Patch::empty();
        patch.set_serialized(&["meta", "message"], &[format!("{stage:?} finished")])?;
        let next = match stage {
            LiarStage::Write => self.finish_write(&typed, &mut patch)?,
            LiarStage::Clarify => self.finish_clarify(&typed, &mut patch)?,
            LiarStage::Bet => self.finish_bet(&typed, &mut patch)?,
            LiarStage::Reveal => self.finish_reveal(&typed, &mut patch)?,
            LiarStage::Adjudicate => self.finish_adjudicate(&typed, &mut patch)?,
        };
        patch.set(&["meta", "round"], next)?;
        for seat in Seat::ALL {
            patch.set(&[seat.key(), "submission"], Value::Null)?;
        }

        // Check the result decodes before handing it to the driver.
        LiarState::from_value(&apply(state, &patch)?)?;
        Ok(patch)
    }

    fn submit_move(&self, options: &GameOptions, state: &Value, seat: Seat, mv: &Value) -> Result<Patch, MoveError> {
        let state = LiarState::from_value(state).map_err(unreadable)?;
        let submission = self.validate(options, &state, mv)?;
        if let LiarSubmission::Reveal(card) = submission {
            if !state.player(seat).hand.contains(&card) {
                return Err(MoveError::NotInHand(card));
            }
        }
        if state.player(seat).submission.as_ref() == Some(&submission) {
            return Err(MoveError::Duplicate);
        }
        if let LiarSubmission::Write(text) = &submission {
            if matches!(&state.player(seat.opp()).submission, Some(LiarSubmission::Write(other)) if other == text) {
                return Err(MoveError::ExistingStatement);
            }
        }

        let mut patch = Patch::empty();
        patch
            .set_serialized(&[seat.key(), "submission"], &submission)
            .map_err(unreadable)?;
        Ok(patch)
    }

    fn next_tick(&self, options: &GameOptions, _state: &Value) -> Option<u32> {
        Some(options.timer)
    }

    fn winner(&self, state: &Value) -> Result<Option<GameResult>, ResolutionError> {
        let state = LiarState::from_value(state)?;
        Ok(state.meta.winner)
    }

    fn view(&self, state: &Value, _history: &HistoryLog, seat: Option<Seat>) -> Result<Value, ResolutionError> {
        let mut view = state.clone();
        if let (Some(seat), Some(fields)) = (seat, view.as_object_mut()) {
            fields.remove(seat.opp().key());
        }
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options() -> GameOptions {
        GameOptions { seed: 11, ..LiarRules.default_options() }
    }

    struct Table {
        options: GameOptions,
        state: Value,
        history: HistoryLog,
    }

    impl Table {
        fn new() -> Self {
            let options = options();
            let state = LiarRules.start_state(&options).unwrap();
            let history = HistoryLog::starting_at(state.clone(), Utc.timestamp_opt(0, 0).single().unwrap());
            Self { options, state, history }
        }

        fn submit(&mut self, seat: Seat, mv: Value) -> Result<(), MoveError> {
            let patch = LiarRules.submit_move(&self.options, &self.state, seat, &mv)?;
            self.state = apply(&self.state, &patch).unwrap();
            Ok(())
        }

        fn advance(&mut self) {
            let patch = LiarRules.advance(&self.options, &self.state, &self.history).unwrap();
            self.state = apply(&self.state, &patch).unwrap();
        }

        fn typed(&self) -> LiarState {
            LiarState::from_value(&self.state).unwrap()
        }

        fn round(&self) -> u32 {
            self.typed().meta.round
        }
    }

    #[test]
    fn test_start_deals_seeded_hands() {
        let a = LiarState::from_value(&LiarRules.start_state(&options()).unwrap()).unwrap();
        let b = LiarState::from_value(&LiarRules.start_state(&options()).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.p1.hand.len(), HAND_SIZE);
        assert_eq!(a.p2.hand.len(), HAND_SIZE);
        assert!(a.p1.hand.iter().all(|c| (1..=9).contains(c)));
        assert_eq!(a.stage(), Some(LiarStage::Write));
    }

    #[test]
    fn test_write_stage() {
        let mut table = Table::new();
        table.submit(Seat::P1, json!("the sky is green")).unwrap();
        assert_eq!(table.submit(Seat::P1, json!("the sky is green")), Err(MoveError::Duplicate));
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.round, 1);
        assert_eq!(state.statements.len(), 2);
        assert_eq!(state.statements[0].text, "the sky is green");
        assert_eq!(state.statements[1].text, DEFAULT_STATEMENT);
        assert_eq!(state.statements[1].author, Seat::P2);
        assert_eq!(state.p1.submission, None);
    }

    #[test]
    fn test_write_validation() {
        let mut table = Table::new();
        assert!(matches!(table.submit(Seat::P1, json!(3)), Err(MoveError::WrongShape { .. })));
        assert_eq!(table.submit(Seat::P1, json!("  ")), Err(MoveError::BadStatement { max: MAX_STATEMENT_LEN }));
        assert!(table.submit(Seat::P1, json!("x".repeat(281))).is_err());

        table.advance();
        table.advance();
        table.advance();
        assert_eq!(table.typed().stage(), Some(LiarStage::Write));
        assert_eq!(table.submit(Seat::P2, json!(DEFAULT_STATEMENT)), Err(MoveError::ExistingStatement));
    }

    #[test]
    fn test_clarify_flag_sends_back_to_write() {
        let mut table = Table::new();
        table.submit(Seat::P1, json!("a")).unwrap();
        table.submit(Seat::P2, json!("b")).unwrap();
        table.advance();
        assert_eq!(table.submit(Seat::P2, json!([5])), Err(MoveError::UnknownStatement(5)));
        table.submit(Seat::P2, json!([0])).unwrap();
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.round, 0);
        assert!(state.statements.is_empty());
        table.submit(Seat::P1, json!("a")).unwrap();
    }

    #[test]
    fn test_bets() {
        let mut table = Table::new();
        table.advance();
        table.advance();
        assert_eq!(table.typed().stage(), Some(LiarStage::Bet));

        assert_eq!(
            table.submit(Seat::P1, json!({"0": {"true": 8, "false": 3}})),
            Err(MoveError::OverCap { total: 11, cap: 10 })
        );
        assert_eq!(table.submit(Seat::P1, json!({"7": {"true": 1}})), Err(MoveError::UnknownStatement(7)));
        table.submit(Seat::P1, json!({"0": {"true": 4}, "1": {"false": 2}})).unwrap();
        table.advance();

        let state = table.typed();
        assert_eq!(state.statements[0].votes.p1.yes, vec![4]);
        assert_eq!(state.statements[0].votes.p1.no, vec![0]);
        assert_eq!(state.statements[1].votes.p1.no, vec![2]);
        assert!(state.statements[0].votes.p2.yes.is_empty());
    }

    #[test]
    fn test_reveal() {
        let mut table = Table::new();
        while table.typed().stage() != Some(LiarStage::Reveal) {
            table.advance();
        }
        let hand = table.typed().p1.hand;
        let missing = (1..=9).find(|c| !hand.contains(c)).unwrap_or(0);
        assert_eq!(table.submit(Seat::P1, json!(missing)), Err(MoveError::NotInHand(missing)));

        table.submit(Seat::P1, json!(hand[2])).unwrap();
        let p2_first = table.typed().p2.hand[0];
        table.advance();

        let state = table.typed();
        assert_eq!(
            state.revealed,
            vec![Revealed { seat: Seat::P1, card: hand[2] }, Revealed { seat: Seat::P2, card: p2_first }]
        );
        assert_eq!(state.p1.hand.len(), HAND_SIZE - 1);
        assert_eq!(state.p2.hand.len(), HAND_SIZE - 1);
    }

    #[test]
    fn test_full_game_scoring() {
        let mut table = Table::new();
        table.submit(Seat::P1, json!("a")).unwrap();
        table.submit(Seat::P2, json!("b")).unwrap();
        table.advance(); // WRITE
        table.advance(); // CLARIFY
        table.submit(Seat::P1, json!({"0": {"true": 3}})).unwrap();
        table.submit(Seat::P2, json!({"0": {"false": 2}})).unwrap();
        table.advance(); // BET
        while table.typed().stage() != Some(LiarStage::Adjudicate) {
            table.advance();
        }
        assert_eq!(table.round(), 11);

        let count = table.typed().statements.len();
        assert_eq!(count, 6);
        let all_true: BTreeMap<String, bool> = (0..count).map(|i| (i.to_string(), true)).collect();
        assert_eq!(
            table.submit(Seat::P1, json!({"0": true})),
            Err(MoveError::Incomplete((1..count).collect()))
        );
        table.submit(Seat::P1, json!(all_true)).unwrap();

        let mut disputed = all_true.clone();
        disputed.insert("3".into(), false);
        table.submit(Seat::P2, json!(disputed)).unwrap();
        table.advance();
        assert_eq!(table.round(), 11);
        assert_eq!(LiarRules.winner(&table.state), Ok(None));

        // P2 stays silent this time and defers to P1.
        table.submit(Seat::P1, json!(all_true)).unwrap();
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.round, 12);
        assert!(state.statements.iter().all(|s| s.truth == Some(true)));
        assert_eq!(state.score(Seat::P1), 6);
        assert_eq!(LiarRules.winner(&table.state), Ok(Some(GameResult::Winner(Seat::P1))));
        assert_eq!(table.submit(Seat::P1, json!("more")), Err(MoveError::GameOver));
        assert!(LiarRules.advance(&table.options, &table.state, &table.history).is_err());
    }

    #[test]
    fn test_write_rejects_opponent_pending_text() {
        let mut table = Table::new();
        table.submit(Seat::P1, json!("cats can fly")).unwrap();
        assert_eq!(table.submit(Seat::P2, json!("cats can fly")), Err(MoveError::ExistingStatement));
        table.submit(Seat::P2, json!("dogs can fly")).unwrap();
    }

    #[test]
    fn test_unanswered_adjudication_settles_as_false() {
        let mut table = Table::new();
        table.submit(Seat::P1, json!("a")).unwrap();
        table.advance(); // WRITE
        table.advance(); // CLARIFY
        table.submit(Seat::P1, json!({"0": {"false": 3}})).unwrap();
        table.submit(Seat::P2, json!({"0": {"true": 2}})).unwrap();
        while table.typed().stage() != Some(LiarStage::Adjudicate) {
            table.advance();
        }

        // The timer fires with no verdicts on the table.
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.round, 12);
        assert!(state.statements.iter().all(|s| s.truth == Some(false)));
        assert_eq!(state.score(Seat::P1), 6);
        assert_eq!(LiarRules.winner(&table.state), Ok(Some(GameResult::Winner(Seat::P1))));
    }

    #[test]
    fn test_should_advance() {
        let mut table = Table::new();
        let start = Utc.timestamp_opt(0, 0).single().unwrap();
        let clock = TickClock { last_tick: Some(start), next_tick: Some(180) };
        let late = start + chrono::Duration::seconds(200);

        assert!(!LiarRules.should_advance(&table.options, &table.state, &clock, late));
        let timed = GameOptions { timed: true, ..table.options.clone() };
        assert!(LiarRules.should_advance(&timed, &table.state, &clock, late));

        table.submit(Seat::P1, json!("a")).unwrap();
        table.submit(Seat::P2, json!("b")).unwrap();
        assert!(LiarRules.should_advance(&table.options, &table.state, &clock, start));
    }

    #[test]
    fn test_view_removes_opponent() {
        let table = Table::new();
        let view = LiarRules.view(&table.state, &table.history, Some(Seat::P1)).unwrap();
        assert!(view.get("p1").is_some());
        assert!(view.get("p2").is_none());
        assert_eq!(LiarRules.view(&table.state, &table.history, None).unwrap(), table.state);
    }
}
