//! Ability Resolution
//!
//! One call to [`apply_ability`] resolves exactly one ability step of one
//! seat and returns the patch describing it. The order of effects inside a
//! step is fixed:
//!
//! 1. counter: the seat's `ability_number` drops by one
//! 2. the step function itself
//! 3. badges of the acting seat whose category matches the step
//! 4. shield check on the opposing seat
//! 5. badge bookkeeping on the final step
//!
//! Badges and shields therefore see the damage the step produced, in the
//! patch, before it is ever applied.

use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::core::numeric::NumericOp;
use crate::core::patch::Patch;
use crate::core::rng::DeterministicRng;
use crate::game::error::ResolutionError;
use crate::game::options::GameOptions;
use crate::game::Seat;
use crate::history::HistoryLog;

use super::badges;
use super::cards::Category;
use super::state::{
    Badge, BadgeKind, CardState, OutcomeKind, PlayerState, Restriction, RestrictionKind, RpsState, Selection,
};

// =============================================================================
// RESOLUTION CONTEXT
// =============================================================================

/// Everything a step function may read, plus the patch it writes into.
///
/// Reads always see the state as it was before this step; writes go to
/// [`ResolutionContext::patch`] only.
pub struct ResolutionContext<'a> {
    /// Typed state before this step.
    pub state: &'a RpsState,
    /// Same state in boundary form (for projections).
    pub state_value: &'a Value,
    /// History, for look-backs.
    pub history: &'a HistoryLog,
    /// Game options.
    pub options: &'a GameOptions,
    /// Seat resolving the step.
    pub acting_seat: Seat,
    /// The other seat.
    pub opposing_seat: Seat,
    /// Acting seat's selection.
    pub selection: Selection,
    /// Effective level.
    pub level: i64,
    /// Timing bonus (0..=2).
    pub timing_bonus: u32,
    /// The acting seat won the round outright.
    pub badges_apply: bool,
    /// Output.
    pub patch: Patch,
    /// Messages for `meta.message`.
    pub messages: Vec<String>,
    /// Badges consumed by this step.
    pub badges_used: Vec<Badge>,
    /// Randomness for this step only.
    pub rng: DeterministicRng,
}

impl<'a> ResolutionContext<'a> {
    /// Acting seat's state.
    pub fn player(&self) -> &'a PlayerState {
        self.state.player(self.acting_seat)
    }

    /// Opposing seat's state.
    pub fn other(&self) -> &'a PlayerState {
        self.state.player(self.opposing_seat)
    }

    /// Current round.
    pub fn round(&self) -> u32 {
        self.state.meta.round
    }

    /// Card being resolved.
    pub fn card(&self) -> Result<&'a CardState, ResolutionError> {
        self.player().card(self.selection.slot)
    }

    /// Card the opposing seat selected this round.
    pub fn other_card(&self) -> Result<&'a CardState, ResolutionError> {
        self.other().selected_card(self.opposing_seat)
    }

    /// State at the end of the previous round, if there was one.
    pub fn previous_round(&self) -> Result<Option<RpsState>, ResolutionError> {
        self.history
            .last_state(-2)
            .map(|value| RpsState::from_value(&value))
            .transpose()
    }

    /// Message attributed to the acting seat.
    pub fn say(&mut self, message: impl AsRef<str>) {
        let seat = self.acting_seat;
        self.say_for(seat, message);
    }

    /// Message attributed to `seat`.
    pub fn say_for(&mut self, seat: Seat, message: impl AsRef<str>) {
        self.messages.push(format!("{seat}: {}", message.as_ref()));
    }

    /// Queue `amount` damage on `seat`.
    pub fn damage(&mut self, seat: Seat, amount: i64) -> Result<(), ResolutionError> {
        self.patch.push_numeric(&[seat.key(), "hp"], NumericOp::Add(-amount))?;
        Ok(())
    }

    /// Queue `amount` healing on `seat`.
    pub fn heal(&mut self, seat: Seat, amount: i64) -> Result<(), ResolutionError> {
        self.patch.push_numeric(&[seat.key(), "hp"], NumericOp::Add(amount))?;
        Ok(())
    }

    /// Grant a shield, usable from the next turn.
    pub fn grant_shield(&mut self, seat: Seat) -> Result<(), ResolutionError> {
        self.patch.push_numeric(&[seat.key(), "shields", "n"], NumericOp::Add(1))?;
        self.patch.push_numeric(&[seat.key(), "shields", "this_turn"], NumericOp::Add(1))?;
        Ok(())
    }

    /// Grant a badge earned this round.
    pub fn grant_badge(&mut self, seat: Seat, name: BadgeKind, arg: i64) -> Result<(), ResolutionError> {
        let badge = Badge { name, arg, round: self.round() };
        self.patch
            .list_insert(&[seat.key(), "badges"], vec![serde_json::to_value(badge)?])?;
        Ok(())
    }

    /// Disable `slot` of `seat` for `duration` turns.
    pub fn disable(&mut self, seat: Seat, slot: usize, duration: u32, card: &str) -> Result<(), ResolutionError> {
        let restriction = Restriction {
            name: RestrictionKind::Disabled,
            arg: slot,
            source: format!("{}'s {card} @ round {}", self.acting_seat, self.round()),
            duration,
        };
        self.patch
            .list_insert(&[seat.key(), "restrictions"], vec![serde_json::to_value(restriction)?])?;
        Ok(())
    }

    /// Overwrite one card of `seat`.
    pub fn set_card(&mut self, seat: Seat, card: &CardState) -> Result<(), ResolutionError> {
        self.patch
            .list_set(&[seat.key(), "cards"], card.slot, serde_json::to_value(card)?)?;
        Ok(())
    }

    /// Replace every card of `seat`.
    pub fn replace_cards(&mut self, seat: Seat, cards: &[CardState]) -> Result<(), ResolutionError> {
        let values = cards.iter().map(serde_json::to_value).collect::<Result<Vec<_>, _>>()?;
        self.patch.list_replace(&[seat.key(), "cards"], values)?;
        Ok(())
    }
}

// =============================================================================
// STEP RESOLUTION
// =============================================================================

/// Resolve the next ability step of `seat`.
pub fn apply_ability(
    state_value: &Value,
    state: &RpsState,
    options: &GameOptions,
    history: &HistoryLog,
    seat: Seat,
) -> Result<Patch, ResolutionError> {
    let player = state.player(seat);
    let selection = player.selection.clone().ok_or(ResolutionError::NoSelection { seat })?;
    let card = player.card(selection.slot)?;
    let def = card.name.def();
    let step_number = selection.ability_number;
    let step = def
        .step(step_number)
        .ok_or(ResolutionError::InvalidStep { card: card.name, step: step_number })?;

    let round = state.meta.round;
    let badges_apply = state
        .meta
        .outcome
        .as_ref()
        .is_some_and(|o| o.kind == OutcomeKind::Win && o.player == seat);
    let salt = format!("ability:{seat}:{step_number}");

    let mut ctx = ResolutionContext {
        state,
        state_value,
        history,
        options,
        acting_seat: seat,
        opposing_seat: seat.opp(),
        level: selection.level,
        timing_bonus: selection.timing,
        selection,
        badges_apply,
        patch: Patch::empty(),
        messages: Vec::new(),
        badges_used: Vec::new(),
        rng: DeterministicRng::for_turn(options.seed, round as u64, salt.as_bytes()),
    };

    debug!(%seat, card = %card.name, step = step.name, number = step_number, "resolving ability step");

    ctx.patch
        .set(&[seat.key(), "selection", "ability_number"], step_number - 1)?;
    (step.run)(&mut ctx)?;

    // Badges earned in earlier rounds, once per multiplier pass.
    if ctx.badges_apply {
        let eligible: Vec<&Badge> = player
            .badges
            .iter()
            .filter(|b| b.round < round && step.categories.contains(&b.name.category()))
            .collect();
        for _ in 0..def.badge_multiplier {
            for badge in &eligible {
                trace!(badge = ?badge.name, arg = badge.arg, "applying badge");
                badges::apply_badge(&mut ctx, badge)?;
                if !ctx.badges_used.contains(*badge) {
                    ctx.badges_used.push((*badge).clone());
                }
            }
        }
    }

    let newly_used = std::mem::take(&mut ctx.badges_used);
    let mut used = player.badges_used.clone();
    for badge in newly_used {
        if !used.contains(&badge) {
            used.push(badge);
        }
    }
    if used != player.badges_used {
        ctx.patch.set_serialized(&[seat.key(), "badges_used"], &used)?;
    }

    if step.has(Category::Damage) {
        absorb_with_shield(&mut ctx)?;
    }

    if step_number == 1 {
        let remaining: Vec<&Badge> = player.badges.iter().filter(|b| !used.contains(b)).collect();
        ctx.patch.set_serialized(&[seat.key(), "badges"], &remaining)?;
        ctx.patch.set(&[seat.key(), "badges_used"], json!([]))?;
    }

    let messages = std::mem::take(&mut ctx.messages);
    ctx.patch.set_serialized(&["meta", "message"], &messages)?;
    Ok(ctx.patch)
}

/// Null all incoming damage of this step if the opposing seat holds a usable shield.
fn absorb_with_shield(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let opp = ctx.opposing_seat;
    let incoming = ctx.patch.numeric_total(&[opp.key(), "hp"]).unwrap_or(0);
    if incoming >= 0 || !ctx.other().shields.available() {
        return Ok(());
    }
    ctx.patch.push_numeric(&[opp.key(), "shields", "n"], NumericOp::Add(-1))?;
    ctx.patch.push_numeric(&[opp.key(), "hp"], NumericOp::Mul(0))?;
    ctx.say_for(opp, format!("Shield prevented {} dmg", -incoming));
    Ok(())
}
