//! Badge effects.
//!
//! Badges act on the patch the current step produced: multipliers and
//! bonuses reshape the numeric damage stacks, level bonuses look at the
//! projected state. A badge that finds nothing to act on is still spent.

use crate::core::numeric::NumericOp;
use crate::core::patch::{apply, Patch};
use crate::game::error::ResolutionError;
use crate::game::Seat;

use super::ability::ResolutionContext;
use super::cards::Category;
use super::state::{ActionType, Badge, BadgeKind, CardState, RpsState};

impl BadgeKind {
    /// Step category this badge attaches to.
    pub fn category(self) -> Category {
        match self {
            BadgeKind::DmgMultiplier | BadgeKind::ScissorsDmgMultiplier | BadgeKind::DmgBonus => Category::Damage,
            BadgeKind::LvlBonus => Category::LevelUp,
            BadgeKind::RockCurse | BadgeKind::PaperCurse | BadgeKind::ScissorsCurse => Category::Start,
        }
    }

    /// Type a curse punishes.
    pub fn cursed_type(self) -> Option<ActionType> {
        match self {
            BadgeKind::RockCurse => Some(ActionType::Rock),
            BadgeKind::PaperCurse => Some(ActionType::Paper),
            BadgeKind::ScissorsCurse => Some(ActionType::Scissors),
            _ => None,
        }
    }
}

/// Apply one badge of the acting seat to the step being resolved.
pub fn apply_badge(ctx: &mut ResolutionContext<'_>, badge: &Badge) -> Result<(), ResolutionError> {
    match badge.name {
        BadgeKind::DmgMultiplier => multiply_damage(ctx, badge),
        BadgeKind::ScissorsDmgMultiplier => {
            let kind = ctx.card()?.kind;
            if kind == ActionType::Scissors {
                multiply_damage(ctx, badge)
            } else {
                ctx.say(format!("ScissorsDmgMultiplier wasted on a {}!", kind.title()));
                Ok(())
            }
        }
        BadgeKind::DmgBonus => {
            for seat in damaged_seats(&ctx.patch) {
                ctx.patch.push_numeric(&[seat.key(), "hp"], NumericOp::Add(-badge.arg))?;
                let total = ctx.patch.numeric_total(&[seat.key(), "hp"]).unwrap_or(0);
                ctx.say(format!("DmgBonus(+{}) applies to {seat}. {}", badge.arg, -total));
            }
            Ok(())
        }
        BadgeKind::LvlBonus => level_bonus(ctx, badge),
        BadgeKind::RockCurse | BadgeKind::PaperCurse | BadgeKind::ScissorsCurse => curse(ctx, badge),
    }
}

/// Seats whose health this step already modifies.
fn damaged_seats(patch: &Patch) -> Vec<Seat> {
    Seat::ALL
        .into_iter()
        .filter(|seat| matches!(patch.get(&[seat.key(), "hp"]), Some(Patch::Numeric(_))))
        .collect()
}

fn multiply_damage(ctx: &mut ResolutionContext<'_>, badge: &Badge) -> Result<(), ResolutionError> {
    for seat in damaged_seats(&ctx.patch) {
        ctx.patch.push_numeric(&[seat.key(), "hp"], NumericOp::Mul(badge.arg))?;
        let total = ctx.patch.numeric_total(&[seat.key(), "hp"]).unwrap_or(0);
        ctx.say(format!("{:?}({}x) applies to {seat}. {}", badge.name, badge.arg, -total));
    }
    Ok(())
}

/// Every card whose level this step raised gains `arg` more.
fn level_bonus(ctx: &mut ResolutionContext<'_>, badge: &Badge) -> Result<(), ResolutionError> {
    let projected = RpsState::from_value(&apply(ctx.state_value, &ctx.patch)?)?;
    for seat in Seat::ALL {
        let before = &ctx.state.player(seat).cards;
        let raised: Vec<CardState> = projected
            .player(seat)
            .cards
            .iter()
            .filter(|card| before.get(card.slot).is_some_and(|old| card.level > old.level))
            .cloned()
            .collect();
        for mut card in raised {
            card.level += badge.arg;
            ctx.set_card(seat, &card)?;
            ctx.say(format!("LvlBonus(+{}) raises {} to level {}", badge.arg, card.name, card.level));
        }
    }
    Ok(())
}

/// The owner takes `arg` damage when resolving the cursed type.
fn curse(ctx: &mut ResolutionContext<'_>, badge: &Badge) -> Result<(), ResolutionError> {
    let kind = ctx.card()?.kind;
    if badge.name.cursed_type() == Some(kind) {
        ctx.damage(ctx.acting_seat, badge.arg)?;
        ctx.say(format!("{:?}({}) applies to {}", badge.name, badge.arg, ctx.acting_seat));
    } else {
        ctx.say(format!("{:?} fades", badge.name));
    }
    Ok(())
}
