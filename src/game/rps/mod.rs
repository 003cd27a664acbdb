//! RPS card battle.
//!
//! A round runs through four stages:
//!
//! ```text
//! stage 1..=3   picks (timed: one pick total, slot 3k..3k+3 unlocks in stage k+1)
//! stage 3 end   picks compared, outcome decided, selections prepared
//! stage 4       one ability step per advance, outcome player first
//! round end     counters reset, round + 1 (opens a history keyframe)
//! ```
//!
//! Untimed games skip straight to stage 3 and wait for both seats to pick
//! (or pass) before comparing.

pub mod ability;
pub mod badges;
pub mod cards;
pub mod state;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::patch::{ListOp, Patch};
use crate::core::rng::DeterministicRng;
use crate::history::HistoryLog;

use super::error::{MoveError, ResolutionError};
use super::options::GameOptions;
use super::{GameKind, GameResult, Rules, Seat, TickClock};

use state::{
    CardState, Meta, Outcome, OutcomeKind, PlayerState, Restriction, RpsState, Selection, StagedAction,
    INCOME_SLOT, PICK_STAGES, RESOLUTION_STAGE, SELECTABLE_SLOTS, TRUCE_SLOT,
};

// =============================================================================
// MOVES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MoveKind {
    #[default]
    Selection,
    Coin,
}

/// Wire shape of an RPS move.
#[derive(Debug, Deserialize)]
struct RpsMove {
    #[serde(rename = "type", default)]
    kind: MoveKind,
    #[serde(default)]
    selection: Option<i64>,
}

// =============================================================================
// OUTCOME PLANNING
// =============================================================================

/// A seat's first pick of the round.
#[derive(Clone, Copy)]
struct Pick<'a> {
    seat: Seat,
    stage: usize,
    card: &'a CardState,
}

/// What a seat resolves in stage 4.
struct Plan {
    seat: Seat,
    slot: usize,
    level: i64,
    timing: u32,
}

impl Plan {
    fn full(pick: &Pick<'_>) -> Self {
        Self { seat: pick.seat, slot: pick.card.slot, level: pick.card.level, timing: 0 }
    }

    fn fixed(state: &RpsState, seat: Seat, slot: usize) -> Result<Self, ResolutionError> {
        let level = state.player(seat).card(slot)?.level;
        Ok(Self { seat, slot, level, timing: 0 })
    }

    fn selection(&self, state: &RpsState) -> Result<Selection, ResolutionError> {
        let card = state.player(self.seat).card(self.slot)?;
        Ok(Selection {
            slot: self.slot,
            ability_number: card.name.def().ability_count(),
            timing: self.timing,
            level: self.level,
        })
    }
}

fn pick_of(state: &RpsState, seat: Seat) -> Result<Option<Pick<'_>>, ResolutionError> {
    match state.player(seat).first_pick() {
        Some((stage, action)) => Ok(Some(Pick { seat, stage, card: state.player(seat).card(action.slot)? })),
        None => Ok(None),
    }
}

/// Order two same-stage picks: health, then coins, then a seeded coin flip.
fn tie_order<'a>(options: &GameOptions, state: &RpsState, a: Pick<'a>, b: Pick<'a>) -> (Pick<'a>, Pick<'a>) {
    let (pa, pb) = (state.player(a.seat), state.player(b.seat));
    let a_first = if pa.hp != pb.hp {
        pa.hp > pb.hp
    } else if pa.coins != pb.coins {
        pa.coins > pb.coins
    } else {
        DeterministicRng::for_turn(options.seed, state.meta.round as u64, b"tiebreak").next_coin()
    };
    if a_first {
        (a, b)
    } else {
        (b, a)
    }
}

/// Restrictions after one more turn has passed.
fn tick_restrictions(player: &PlayerState) -> Vec<Restriction> {
    player
        .restrictions
        .iter()
        .filter(|r| r.duration > 1)
        .map(|r| Restriction { duration: r.duration - 1, ..r.clone() })
        .collect()
}

// =============================================================================
// RULES
// =============================================================================

/// Rules of the card battle.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpsRules;

impl RpsRules {
    fn start_stage(options: &GameOptions) -> u8 {
        if options.timed {
            1
        } else {
            PICK_STAGES as u8
        }
    }

    /// Stage-3 finalization: compare picks, decide the outcome.
    fn finalize_picks(&self, options: &GameOptions, state: &RpsState) -> Result<Patch, ResolutionError> {
        let (first, second, idle, kind) = match (pick_of(state, Seat::P1)?, pick_of(state, Seat::P2)?) {
            (None, None) => (
                Plan::fixed(state, Seat::P1, TRUCE_SLOT)?,
                Some(Plan::fixed(state, Seat::P2, TRUCE_SLOT)?),
                None,
                OutcomeKind::Truce,
            ),
            (Some(picked), None) | (None, Some(picked)) => (
                Plan::fixed(state, picked.seat.opp(), INCOME_SLOT)?,
                Some(Plan::full(&picked)),
                None,
                OutcomeKind::Default,
            ),
            (Some(a), Some(b)) if a.card.kind == b.card.kind => {
                if a.stage == b.stage {
                    let (x, y) = tie_order(options, state, a, b);
                    (Plan::full(&x), Some(Plan::full(&y)), None, OutcomeKind::Tie)
                } else {
                    let (w, l) = if a.stage < b.stage { (a, b) } else { (b, a) };
                    let plan = Plan {
                        seat: w.seat,
                        slot: w.card.slot,
                        level: w.card.level / 2,
                        timing: if l.stage - w.stage == 2 { 1 } else { 0 },
                    };
                    (plan, None, Some(l), OutcomeKind::Ambush)
                }
            }
            (Some(a), Some(b)) => {
                let (w, l) = if a.card.kind.beats(b.card.kind) { (a, b) } else { (b, a) };
                let plan = Plan {
                    seat: w.seat,
                    slot: w.card.slot,
                    level: w.card.level,
                    timing: l.stage.saturating_sub(w.stage) as u32,
                };
                (plan, None, Some(l), OutcomeKind::Win)
            }
        };

        let message = match kind {
            OutcomeKind::Truce => "Truce! Everyone loses 1 health.".to_string(),
            OutcomeKind::Default => format!("{} wins by default", first.seat.opp()),
            OutcomeKind::Tie => format!("Tie! {} resolves first", first.seat),
            OutcomeKind::Ambush => format!("{} ambushes", first.seat),
            OutcomeKind::Win => format!("{} wins", first.seat),
        };
        debug!(round = state.meta.round, outcome = ?kind, first = %first.seat, "picks compared");

        let mut patch = Patch::empty();
        patch.set(&["meta", "stage"], RESOLUTION_STAGE)?;
        patch.set_serialized(&["meta", "outcome"], &Outcome { player: first.seat, kind })?;
        patch.set_serialized(&["meta", "message"], &[message])?;
        patch.set_serialized(&[first.seat.key(), "selection"], &first.selection(state)?)?;
        if let Some(second) = second {
            patch.set_serialized(&[second.seat.key(), "selection"], &second.selection(state)?)?;
        }
        if let Some(loser) = idle {
            let selection = Selection { slot: loser.card.slot, ability_number: 0, timing: 0, level: loser.card.level };
            patch.set_serialized(&[loser.seat.key(), "selection"], &selection)?;
        }
        for seat in Seat::ALL {
            patch.set_serialized(&[seat.key(), "restrictions"], &tick_restrictions(state.player(seat)))?;
        }
        Ok(patch)
    }

    /// Close the round and reset per-round fields.
    fn end_round(&self, options: &GameOptions, state: &RpsState) -> Result<Patch, ResolutionError> {
        let round = state.meta.round + 1;
        let mut patch = Patch::empty();
        patch.set(&["meta", "round"], round)?;
        patch.set(&["meta", "stage"], Self::start_stage(options))?;
        patch.set(&["meta", "outcome"], Value::Null)?;
        patch.set_serialized(&["meta", "message"], &[format!("round {} ends", state.meta.round)])?;
        for seat in Seat::ALL {
            let key = seat.key();
            patch.set(&[key, "stages"], json!([[], [], []]))?;
            patch.set(&[key, "selection"], Value::Null)?;
            patch.set(&[key, "passed"], false)?;
            patch.set(&[key, "shields", "this_turn"], 0)?;
        }
        debug!(round, "round closed");
        Ok(patch)
    }
}

impl Rules for RpsRules {
    fn kind(&self) -> GameKind {
        GameKind::Rps
    }

    fn default_options(&self) -> GameOptions {
        GameOptions { timer: 7, ..GameOptions::default() }
    }

    fn start_state(&self, options: &GameOptions) -> Result<Value, ResolutionError> {
        let deck = cards::resolve_deck(options)?;
        RpsState {
            meta: Meta {
                round: 1,
                stage: Self::start_stage(options),
                outcome: None,
                message: vec!["Game Start".to_string()],
            },
            p1: PlayerState::new(&deck),
            p2: PlayerState::new(&deck),
        }
        .to_value()
    }

    fn should_advance(&self, options: &GameOptions, state: &Value, clock: &TickClock, now: DateTime<Utc>) -> bool {
        let state = match RpsState::from_value(state) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "undecodable state; not advancing");
                return false;
            }
        };
        let stage = state.meta.stage;
        let timer_due = (options.timed || stage == RESOLUTION_STAGE) && clock.has_ticked(now);
        let picks_in = stage < RESOLUTION_STAGE && state.p1.has_submitted() && state.p2.has_submitted();
        timer_due || picks_in
    }

    fn advance(&self, options: &GameOptions, state: &Value, history: &HistoryLog) -> Result<Patch, ResolutionError> {
        let typed = RpsState::from_value(state)?;
        match typed.meta.stage {
            stage @ (1 | 2) => {
                let mut patch = Patch::empty();
                patch.set(&["meta", "stage"], stage + 1)?;
                patch.set_serialized(&["meta", "message"], &[format!("stage {}", stage + 1)])?;
                Ok(patch)
            }
            3 => self.finalize_picks(options, &typed),
            RESOLUTION_STAGE => {
                let outcome = typed
                    .meta
                    .outcome
                    .as_ref()
                    .ok_or_else(|| ResolutionError::MalformedState("resolution stage without an outcome".into()))?;
                let first = outcome.player;
                let resolving = [first, first.opp()]
                    .into_iter()
                    .find(|seat| typed.player(*seat).remaining_steps() > 0);
                match resolving {
                    Some(seat) => ability::apply_ability(state, &typed, options, history, seat),
                    None => self.end_round(options, &typed),
                }
            }
            other => Err(ResolutionError::MalformedState(format!("unknown stage {other}"))),
        }
    }

    fn submit_move(&self, options: &GameOptions, state: &Value, seat: Seat, mv: &Value) -> Result<Patch, MoveError> {
        let state = RpsState::from_value(state).map_err(unreadable)?;
        let mv: RpsMove = serde_json::from_value(mv.clone()).map_err(|e| MoveError::WrongShape {
            expected: "{\"type\": \"selection\" | \"coin\", \"selection\": int}",
            got: e.to_string(),
        })?;
        let stage = state.meta.stage;
        if stage > PICK_STAGES as u8 {
            return Err(MoveError::BetweenRounds);
        }

        let player = state.player(seat);
        if let Some(sel) = mv.selection {
            if let Some(r) = player.restrictions.iter().find(|r| r.blocks(sel)) {
                return Err(MoveError::Restricted { origin: r.source.clone() });
            }
        }

        if matches!(mv.kind, MoveKind::Coin) {
            return Ok(Patch::empty());
        }
        let sel = mv.selection.ok_or(MoveError::WrongShape {
            expected: "a selection",
            got: "nothing".into(),
        })?;

        let mut patch = Patch::empty();
        if options.timed {
            if player.has_submitted() {
                return Err(MoveError::AlreadySubmitted);
            }
            let slot = selectable(sel)?;
            if slot / PICK_STAGES > (stage as usize).saturating_sub(1) {
                return Err(MoveError::NotAvailable);
            }
            let action = serde_json::to_value(StagedAction::pick(slot)).map_err(unreadable)?;
            let insert = Patch::List(vec![ListOp::Insert(vec![action])]);
            patch
                .list_update(&[seat.key(), "stages"], stage as usize - 1, insert)
                .map_err(unreadable)?;
            return Ok(patch);
        }

        if sel == -1 {
            if player.passed {
                return Err(MoveError::Duplicate);
            }
            patch.set(&[seat.key(), "stages"], json!([[], [], []])).map_err(unreadable)?;
            patch.set(&[seat.key(), "passed"], true).map_err(unreadable)?;
            return Ok(patch);
        }

        let slot = selectable(sel)?;
        let mut stages: [Vec<StagedAction>; PICK_STAGES] = Default::default();
        stages[slot / PICK_STAGES].push(StagedAction::pick(slot));
        if stages == player.stages && !player.passed {
            return Err(MoveError::Duplicate);
        }
        patch.set_serialized(&[seat.key(), "stages"], &stages).map_err(unreadable)?;
        patch.set(&[seat.key(), "passed"], false).map_err(unreadable)?;
        Ok(patch)
    }

    fn next_tick(&self, options: &GameOptions, state: &Value) -> Option<u32> {
        let stage = state.get("meta")?.get("stage")?.as_u64()?;
        if stage <= PICK_STAGES as u64 {
            Some(options.timer)
        } else {
            Some(options.resolution_tick)
        }
    }

    fn winner(&self, state: &Value) -> Result<Option<GameResult>, ResolutionError> {
        let state = RpsState::from_value(state)?;
        let (h1, h2) = (state.p1.hp, state.p2.hp);
        Ok(match (h1 <= 0, h2 <= 0) {
            (false, false) => None,
            (true, false) => Some(GameResult::Winner(Seat::P2)),
            (false, true) => Some(GameResult::Winner(Seat::P1)),
            (true, true) if h1 > h2 => Some(GameResult::Winner(Seat::P1)),
            (true, true) if h2 > h1 => Some(GameResult::Winner(Seat::P2)),
            (true, true) => Some(GameResult::Draw),
        })
    }

    fn view(&self, state: &Value, history: &HistoryLog, seat: Option<Seat>) -> Result<Value, ResolutionError> {
        let seat = match seat {
            Some(seat) => seat,
            None => return Ok(state.clone()),
        };
        let mut typed = RpsState::from_value(state)?;
        if typed.meta.stage >= RESOLUTION_STAGE {
            return Ok(state.clone());
        }

        let other = seat.opp();
        let keyframe = history
            .current_keyframe()
            .map(|k| RpsState::from_value(&k.state))
            .transpose()?;
        let hidden = typed.player_mut(other);
        if let Some(keyframe) = keyframe {
            for card in hidden.cards.iter_mut().filter(|c| !c.revealed) {
                if let Some(old) = keyframe.player(other).cards.get(card.slot) {
                    *card = old.clone();
                }
            }
        }
        hidden.selection = None;
        hidden.stages = Default::default();
        hidden.passed = false;
        typed.to_value()
    }
}

fn unreadable(err: impl ToString) -> MoveError {
    MoveError::Unreadable(err.to_string())
}

fn selectable(sel: i64) -> Result<usize, MoveError> {
    if (0..SELECTABLE_SLOTS as i64).contains(&sel) {
        Ok(sel as usize)
    } else {
        Err(MoveError::OutOfRange(sel))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::cards::CardId;
    use super::state::{ActionType, Badge, BadgeKind, RestrictionKind, Shields, STARTING_HP};
    use super::*;
    use crate::core::patch::apply;
    use crate::history::HistoryEvent;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn standard_deck() -> Vec<CardId> {
        use CardId::*;
        vec![Pebble, Napkin, ButterKnife, Boulder, Book, Wirecutter, Mountain, Contract, TwoHander, Truce, PassiveIncome]
    }

    fn options(seed: u64) -> GameOptions {
        GameOptions { seed, deck: standard_deck(), ..GameOptions::default() }
    }

    /// Minimal driver: applies patches and records history like a session.
    struct Table {
        options: GameOptions,
        state: Value,
        history: HistoryLog,
    }

    impl Table {
        fn new(options: GameOptions) -> Self {
            let state = RpsRules.start_state(&options).unwrap();
            let history = HistoryLog::starting_at(state.clone(), t0());
            Self { options, state, history }
        }

        fn edit(&mut self, f: impl FnOnce(&mut RpsState)) {
            let mut typed = self.typed();
            f(&mut typed);
            self.state = typed.to_value().unwrap();
            self.history = HistoryLog::starting_at(self.state.clone(), t0());
        }

        fn typed(&self) -> RpsState {
            RpsState::from_value(&self.state).unwrap()
        }

        fn submit(&mut self, seat: Seat, mv: Value) -> Result<(), MoveError> {
            let patch = RpsRules.submit_move(&self.options, &self.state, seat, &mv)?;
            self.state = apply(&self.state, &patch).unwrap();
            self.history
                .append_event(HistoryEvent::player_move(seat, mv, patch, t0()))
                .unwrap();
            Ok(())
        }

        fn pick(&mut self, seat: Seat, slot: i64) {
            self.submit(seat, json!({"selection": slot})).unwrap();
        }

        fn advance(&mut self) -> Patch {
            let patch = RpsRules.advance(&self.options, &self.state, &self.history).unwrap();
            let next = apply(&self.state, &patch).unwrap();
            if next["meta"]["round"] != self.state["meta"]["round"] {
                self.history.open_keyframe(next.clone(), t0());
            } else {
                self.history
                    .append_event(HistoryEvent::time(patch.clone(), t0()))
                    .unwrap();
            }
            self.state = next;
            patch
        }

        /// Advance until the round counter moves; returns every patch.
        fn finish_round(&mut self) -> Vec<Patch> {
            let round = self.typed().meta.round;
            let mut patches = Vec::new();
            while self.typed().meta.round == round {
                patches.push(self.advance());
                assert!(patches.len() < 64, "round never ended");
            }
            patches
        }

        fn hp(&self, seat: Seat) -> i64 {
            self.typed().player(seat).hp
        }
    }

    #[test]
    fn test_start_state() {
        let table = Table::new(options(1));
        let state = table.typed();
        assert_eq!(state.meta.round, 1);
        assert_eq!(state.meta.stage, 3);
        assert_eq!(state.p1.hp, STARTING_HP);
        assert_eq!(state.p2.cards.len(), 11);
        assert_eq!(state.p2.cards[6].name, CardId::Mountain);

        let timed = RpsRules.start_state(&GameOptions { timed: true, ..options(1) }).unwrap();
        assert_eq!(timed["meta"]["stage"], json!(1));
    }

    #[test]
    fn test_should_advance_untimed_waits_for_both() {
        let mut table = Table::new(options(1));
        let clock = TickClock { last_tick: Some(t0()), next_tick: Some(7) };
        let later = t0() + chrono::Duration::seconds(60);

        assert!(!RpsRules.should_advance(&table.options, &table.state, &clock, later));
        table.pick(Seat::P1, 0);
        assert!(!RpsRules.should_advance(&table.options, &table.state, &clock, t0()));
        table.submit(Seat::P2, json!({"selection": -1})).unwrap();
        assert!(RpsRules.should_advance(&table.options, &table.state, &clock, t0()));
    }

    #[test]
    fn test_default_win() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 0);
        table.submit(Seat::P2, json!({"selection": -1})).unwrap();

        let patch = table.advance();
        let state = table.typed();
        assert_eq!(state.meta.stage, 4);
        assert_eq!(state.meta.outcome, Some(Outcome { player: Seat::P2, kind: OutcomeKind::Default }));
        assert_eq!(state.meta.message, vec!["p1 wins by default".to_string()]);
        assert_eq!(
            state.p2.selection,
            Some(Selection { slot: INCOME_SLOT, ability_number: 4, timing: 0, level: 1 })
        );
        assert_eq!(state.p1.selection, Some(Selection { slot: 0, ability_number: 5, timing: 0, level: 1 }));
        assert!(patch.get(&["p2", "selection"]).is_some());

        // Income resolves first, then the pick at full level without timing bonus.
        let patches = table.finish_round();
        assert_eq!(patches.len(), 4 + 5 + 1);
        assert_eq!(patches[1].numeric_total(&["p2", "hp"]), Some(2));
        assert_eq!(patches[5].numeric_total(&["p2", "hp"]), Some(-6));

        let state = table.typed();
        assert_eq!(state.meta.round, 2);
        assert_eq!(state.meta.stage, 3);
        assert_eq!(state.p1.hp, STARTING_HP);
        assert_eq!(state.p2.hp, STARTING_HP + 2 - 6);
        assert_eq!(state.p1.cards[0].level, 1);
        assert_eq!(state.p1.selection, None);
        assert!(!state.p2.passed);
    }

    #[test]
    fn test_truce() {
        let mut table = Table::new(options(1));
        table.submit(Seat::P1, json!({"selection": -1})).unwrap();
        table.submit(Seat::P2, json!({"selection": -1})).unwrap();
        table.advance();
        assert_eq!(table.typed().meta.outcome.map(|o| o.kind), Some(OutcomeKind::Truce));
        table.finish_round();
        assert_eq!(table.hp(Seat::P1), STARTING_HP - 1);
        assert_eq!(table.hp(Seat::P2), STARTING_HP - 1);
    }

    #[test]
    fn test_win_resolves_only_the_winner() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 2); // ButterKnife, scissors
        table.pick(Seat::P2, 1); // Napkin, paper
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.outcome, Some(Outcome { player: Seat::P1, kind: OutcomeKind::Win }));
        assert_eq!(state.p2.selection, Some(Selection { slot: 1, ability_number: 0, timing: 0, level: 1 }));

        table.finish_round();
        let state = table.typed();
        assert_eq!(state.p2.hp, STARTING_HP - 12);
        assert_eq!(state.p1.hp, STARTING_HP);
        assert_eq!(state.p1.cards[2].level, 2);
        assert!(state.p2.cards[1].cracked);

        // ButterKnife disabled the Napkin for the next round.
        assert_eq!(state.p2.restrictions.len(), 1);
        assert_eq!(state.p2.restrictions[0].name, RestrictionKind::Disabled);
        let err = RpsRules
            .submit_move(&table.options, &table.state, Seat::P2, &json!({"selection": 1}))
            .unwrap_err();
        assert_eq!(err, MoveError::Restricted { origin: "p1's ButterKnife @ round 1".into() });
    }

    #[test]
    fn test_restriction_expires_after_a_full_turn() {
        let mut table = Table::new(options(1));
        table.edit(|s| {
            s.p1.restrictions.push(Restriction {
                name: RestrictionKind::Disabled,
                arg: 3,
                source: "p2's ButterKnife @ round 0".into(),
                duration: 1,
            })
        });

        assert!(matches!(
            table.submit(Seat::P1, json!({"selection": 3})),
            Err(MoveError::Restricted { .. })
        ));

        table.submit(Seat::P1, json!({"selection": -1})).unwrap();
        table.submit(Seat::P2, json!({"selection": -1})).unwrap();
        table.finish_round();

        assert!(table.typed().p1.restrictions.is_empty());
        table.submit(Seat::P1, json!({"selection": 3})).unwrap();
    }

    #[test]
    fn test_timing_from_stage_gap() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 1); // Napkin, stage 1
        table.pick(Seat::P2, 3); // Boulder, stage 2
        table.advance();
        let selection = table.typed().p1.selection.unwrap();
        assert_eq!(selection.timing, 1);
        assert_eq!(selection.ability_number, 6);
    }

    #[test]
    fn test_ambush_halves_level() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 0); // Pebble, rock, stage 1
        table.pick(Seat::P2, 6); // Mountain, rock, stage 3
        table.advance();

        let state = table.typed();
        assert_eq!(state.meta.outcome, Some(Outcome { player: Seat::P1, kind: OutcomeKind::Ambush }));
        assert_eq!(state.p1.selection, Some(Selection { slot: 0, ability_number: 5, timing: 1, level: 0 }));
        assert_eq!(state.p2.selection.map(|s| s.ability_number), Some(0));
    }

    #[test]
    fn test_tie_break_by_health_then_coin() {
        for seed in 0..20 {
            let mut table = Table::new(options(seed));
            table.edit(|s| s.p2.hp = 200);
            table.pick(Seat::P1, 0);
            table.pick(Seat::P2, 0);
            table.advance();
            let outcome = table.typed().meta.outcome.unwrap();
            assert_eq!(outcome.kind, OutcomeKind::Tie);
            assert_eq!(outcome.player, Seat::P1);
        }

        let mut table = Table::new(options(3));
        table.edit(|s| s.p2.coins = 5);
        table.pick(Seat::P1, 0);
        table.pick(Seat::P2, 0);
        table.advance();
        assert_eq!(table.typed().meta.outcome.unwrap().player, Seat::P2);

        let mut p1_first = 0;
        for seed in 0..400 {
            let mut table = Table::new(options(seed));
            table.pick(Seat::P1, 0);
            table.pick(Seat::P2, 0);
            table.advance();
            let state = table.typed();
            if state.meta.outcome.unwrap().player == Seat::P1 {
                p1_first += 1;
            }
            // Both seats resolve on a tie.
            assert!(state.p1.remaining_steps() > 0 && state.p2.remaining_steps() > 0);
        }
        assert!((120..=280).contains(&p1_first), "p1 first {p1_first} of 400");
    }

    #[test]
    fn test_shield_absorbs_first_hit_only() {
        let deck = {
            let mut deck = standard_deck();
            deck[0] = CardId::Slingshot;
            deck
        };
        let mut table = Table::new(GameOptions { deck, ..options(1) });
        table.edit(|s| s.p2.shields = Shields { n: 1, this_turn: 0 });
        table.pick(Seat::P1, 0); // Slingshot, rock
        table.pick(Seat::P2, 2); // ButterKnife, scissors
        table.advance();

        table.advance(); // start
        let first = table.advance();
        assert_eq!(first.numeric_total(&["p2", "hp"]), Some(0));
        assert_eq!(table.hp(Seat::P2), STARTING_HP);
        assert_eq!(table.typed().p2.shields.n, 0);

        table.advance();
        assert_eq!(table.hp(Seat::P2), STARTING_HP - 4);
    }

    #[test]
    fn test_badges_apply_from_the_next_round() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 3); // Boulder, rock, stage 2
        table.pick(Seat::P2, 2); // ButterKnife, scissors, stage 1
        table.finish_round();

        let state = table.typed();
        assert_eq!(state.p1.badges, vec![Badge { name: BadgeKind::DmgBonus, arg: 30, round: 1 }]);
        assert_eq!(state.p2.hp, STARTING_HP);

        table.pick(Seat::P1, 0); // Pebble
        table.pick(Seat::P2, 2); // ButterKnife, same stage: no timing bonus
        table.finish_round();

        let state = table.typed();
        assert_eq!(state.p2.hp, STARTING_HP - 6 - 30);
        assert!(state.p1.badges.is_empty());
        assert!(state.p1.badges_used.is_empty());
    }

    #[test]
    fn test_book_follows_last_pick() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 0); // Pebble beats ButterKnife
        table.pick(Seat::P2, 2);
        table.finish_round();
        assert_eq!(table.typed().p1.cards[0].level, 2);

        table.pick(Seat::P1, 4); // Book, paper, stage 2
        table.pick(Seat::P2, 0); // Pebble, rock, stage 1
        table.finish_round();

        let state = table.typed();
        // Paper levels at damage time: 3 per seat.
        assert_eq!(state.p2.hp, STARTING_HP - 6 - 43);
        assert_eq!(state.p1.cards[4].kind, ActionType::Rock);
        assert_eq!(state.p1.cards[4].level, 2);
        assert_eq!(state.p1.cards[0].level, 3);
    }

    #[test]
    fn test_contract_curse_and_shield() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 7); // Contract, paper, stage 3
        table.pick(Seat::P2, 3); // Boulder, rock, stage 2
        table.finish_round();

        let state = table.typed();
        assert_eq!(state.p2.hp, STARTING_HP - 7);
        assert_eq!(state.p1.shields, Shields { n: 1, this_turn: 0 });
        assert_eq!(state.p2.badges, vec![Badge { name: BadgeKind::RockCurse, arg: 30, round: 1 }]);

        table.pick(Seat::P1, 2); // ButterKnife
        table.pick(Seat::P2, 0); // Pebble beats it, but is cursed
        table.finish_round();

        let state = table.typed();
        assert_eq!(state.p1.hp, STARTING_HP);
        assert_eq!(state.p1.shields.n, 0);
        assert_eq!(state.p2.hp, STARTING_HP - 7 - 30);
        assert!(state.p2.badges.is_empty());
    }

    #[test]
    fn test_untimed_move_validation() {
        let mut table = Table::new(options(1));
        assert_eq!(
            RpsRules.submit_move(&table.options, &table.state, Seat::P1, &json!({"selection": 9})),
            Err(MoveError::OutOfRange(9))
        );
        table.pick(Seat::P1, 4);
        assert_eq!(table.submit(Seat::P1, json!({"selection": 4})), Err(MoveError::Duplicate));
        table.pick(Seat::P1, 5);
        assert_eq!(table.typed().p1.first_pick().map(|(_, a)| a.slot), Some(5));

        table.submit(Seat::P2, json!({"selection": -1})).unwrap();
        assert_eq!(table.submit(Seat::P2, json!({"selection": -1})), Err(MoveError::Duplicate));

        let coin = RpsRules
            .submit_move(&table.options, &table.state, Seat::P1, &json!({"type": "coin"}))
            .unwrap();
        assert!(coin.is_empty());
    }

    #[test]
    fn test_timed_move_validation() {
        let mut table = Table::new(GameOptions { timed: true, ..options(1) });
        assert_eq!(table.submit(Seat::P1, json!({"selection": 3})), Err(MoveError::NotAvailable));
        table.pick(Seat::P1, 1);
        assert_eq!(table.typed().p1.stages[0], vec![StagedAction::pick(1)]);
        assert_eq!(table.submit(Seat::P1, json!({"selection": 2})), Err(MoveError::AlreadySubmitted));

        table.advance();
        table.pick(Seat::P2, 4);
        assert_eq!(table.typed().p2.first_pick().map(|(stage, _)| stage), Some(2));

        table.edit(|s| s.meta.stage = 4);
        assert_eq!(table.submit(Seat::P2, json!({"selection": 0})), Err(MoveError::BetweenRounds));
    }

    #[test]
    fn test_winner() {
        let mut table = Table::new(options(1));
        assert_eq!(RpsRules.winner(&table.state), Ok(None));
        table.edit(|s| s.p2.hp = 0);
        assert_eq!(RpsRules.winner(&table.state), Ok(Some(GameResult::Winner(Seat::P1))));
        table.edit(|s| {
            s.p1.hp = -5;
            s.p2.hp = -3;
        });
        assert_eq!(RpsRules.winner(&table.state), Ok(Some(GameResult::Winner(Seat::P2))));
        table.edit(|s| s.p1.hp = -3);
        assert_eq!(RpsRules.winner(&table.state), Ok(Some(GameResult::Draw)));
    }

    #[test]
    fn test_view_hides_opponent_picks() {
        let mut table = Table::new(options(1));
        table.pick(Seat::P1, 4);

        let theirs = RpsRules.view(&table.state, &table.history, Some(Seat::P2)).unwrap();
        assert_eq!(theirs["p1"]["stages"], json!([[], [], []]));
        let own = RpsRules.view(&table.state, &table.history, Some(Seat::P1)).unwrap();
        assert_eq!(own["p1"]["stages"][1][0]["slot"], json!(4));
        let spectator = RpsRules.view(&table.state, &table.history, None).unwrap();
        assert_eq!(spectator, table.state);
    }
}
