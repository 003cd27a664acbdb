//! Card Registry
//!
//! Every card is a static [`CardDef`]: its type, its deck slot and an
//! ordered list of ability steps. Steps are plain function pointers over a
//! [`ResolutionContext`]; adding a card means adding a [`CardId`] variant,
//! a definition and its step functions.
//!
//! ## Step numbering
//!
//! A card with `k` listed steps resolves `k + 3` steps, counting down:
//!
//! ```text
//! k + 3        start
//! k + 2 ..= 3  listed steps, first to last
//! 2            level_damage  (crack or de-level the losing card)
//! 1            level_up      (winning card gains a level)
//! ```
//!
//! Timing bonuses in card text: `T1` needs timing >= 1, `T2` timing == 2.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::rng::DeterministicRng;
use crate::game::error::ResolutionError;
use crate::game::options::GameOptions;

use super::ability::ResolutionContext;
use super::state::{ActionType, BadgeKind, CardState, DECK_SIZE, SELECTABLE_SLOTS};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Card identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CardId {
    /// Rock, slot 0.
    Pebble,
    /// Rock, slot 0 (alternative to Pebble).
    Slingshot,
    /// Paper, slot 1.
    Napkin,
    /// Scissors, slot 2.
    ButterKnife,
    /// Rock, slot 3.
    Boulder,
    /// Paper, slot 4.
    Book,
    /// Scissors, slot 5.
    Wirecutter,
    /// Rock, slot 6.
    Mountain,
    /// Paper, slot 7.
    Contract,
    /// Scissors, slot 8.
    TwoHander,
    /// Resolved when nobody picks.
    Truce,
    /// Resolved for a seat that did not pick.
    PassiveIncome,
}

impl CardId {
    /// Every registered card.
    pub const ALL: [CardId; 12] = [
        CardId::Pebble,
        CardId::Slingshot,
        CardId::Napkin,
        CardId::ButterKnife,
        CardId::Boulder,
        CardId::Book,
        CardId::Wirecutter,
        CardId::Mountain,
        CardId::Contract,
        CardId::TwoHander,
        CardId::Truce,
        CardId::PassiveIncome,
    ];

    /// Static definition.
    pub fn def(self) -> &'static CardDef {
        match self {
            CardId::Pebble => &PEBBLE,
            CardId::Slingshot => &SLINGSHOT,
            CardId::Napkin => &NAPKIN,
            CardId::ButterKnife => &BUTTER_KNIFE,
            CardId::Boulder => &BOULDER,
            CardId::Book => &BOOK,
            CardId::Wirecutter => &WIRECUTTER,
            CardId::Mountain => &MOUNTAIN,
            CardId::Contract => &CONTRACT,
            CardId::TwoHander => &TWO_HANDER,
            CardId::Truce => &TRUCE,
            CardId::PassiveIncome => &PASSIVE_INCOME,
        }
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Effect tag of an ability step, matched against badge categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// First step of every card.
    Start,
    /// Built-in level up.
    LevelUp,
    /// Built-in crack / de-level.
    LevelDamage,
    /// Deals damage.
    Damage,
    /// Grants badges.
    Badge,
    /// Heals.
    Health,
    /// Grants shields.
    Shield,
    /// Imposes restrictions.
    Disable,
    /// Changes card types.
    Respec,
    /// Raises levels.
    Level,
    /// Cracks cards.
    Crack,
    /// Self damage.
    Loss,
}

/// Ability step function.
pub type StepFn = fn(&mut ResolutionContext<'_>) -> Result<(), ResolutionError>;

/// One named step of a card.
#[derive(Debug)]
pub struct AbilityStep {
    /// Step name, for logs.
    pub name: &'static str,
    /// Badge categories this step produces.
    pub categories: &'static [Category],
    /// Effect.
    pub run: StepFn,
}

impl AbilityStep {
    /// True when the step is tagged with `category`.
    pub fn has(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

/// Static card definition.
#[derive(Debug)]
pub struct CardDef {
    /// Identifier.
    pub id: CardId,
    /// Base type.
    pub kind: ActionType,
    /// Deck slot.
    pub slot: usize,
    /// Rules text.
    pub text: &'static str,
    /// Badges apply this many times per step.
    pub badge_multiplier: u32,
    /// Listed steps in resolution order.
    pub steps: &'static [AbilityStep],
}

impl CardDef {
    /// Steps resolved for this card, built-ins included.
    pub fn ability_count(&self) -> u32 {
        self.steps.len() as u32 + 3
    }

    /// Step by countdown number (see module docs).
    pub fn step(&self, number: u32) -> Option<&AbilityStep> {
        let listed = self.steps.len() as u32;
        match number {
            1 => Some(&LEVEL_UP),
            2 => Some(&LEVEL_DAMAGE),
            n if (3..=listed + 2).contains(&n) => self.steps.get((listed + 2 - n) as usize),
            n if n == listed + 3 => Some(&START),
            _ => None,
        }
    }
}

// =============================================================================
// DECKS
// =============================================================================

/// Cards that fit `slot`.
pub fn cards_for_slot(slot: usize) -> Vec<CardId> {
    CardId::ALL.iter().copied().filter(|id| id.def().slot == slot).collect()
}

/// One random card per slot, drawn from `seed`.
pub fn random_deck(seed: u64) -> Vec<CardId> {
    let mut rng = DeterministicRng::for_turn(seed, 0, b"deck");
    (0..DECK_SIZE)
        .filter_map(|slot| rng.choose(&cards_for_slot(slot)).copied())
        .collect()
}

/// Check that slot `i` of the deck holds a card made for slot `i`.
pub fn validate_deck(deck: &[CardId]) -> Result<(), ResolutionError> {
    if deck.len() != DECK_SIZE {
        return Err(ResolutionError::InvalidDeck(format!(
            "expected {DECK_SIZE} cards, got {}",
            deck.len()
        )));
    }
    for (slot, id) in deck.iter().enumerate() {
        if id.def().slot != slot {
            return Err(ResolutionError::InvalidDeck(format!(
                "{id} belongs in slot {}, not {slot}",
                id.def().slot
            )));
        }
    }
    Ok(())
}

/// Deck configured in the options, or a random one.
pub fn resolve_deck(options: &GameOptions) -> Result<Vec<CardId>, ResolutionError> {
    let deck = if options.deck.is_empty() {
        random_deck(options.seed)
    } else {
        options.deck.clone()
    };
    validate_deck(&deck)?;
    Ok(deck)
}

// =============================================================================
// BUILT-IN STEPS
// =============================================================================

static START: AbilityStep = AbilityStep { name: "start", categories: &[Category::Start], run: start };

static LEVEL_DAMAGE: AbilityStep = AbilityStep {
    name: "level_damage",
    categories: &[Category::LevelDamage],
    run: level_damage,
};

static LEVEL_UP: AbilityStep = AbilityStep { name: "level_up", categories: &[Category::LevelUp], run: level_up };

fn start(_ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    Ok(())
}

fn level_up(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if !ctx.badges_apply {
        return Ok(());
    }
    let mut card = ctx.card()?.clone();
    card.level += 1;
    card.cracked = false;
    ctx.set_card(ctx.acting_seat, &card)?;
    ctx.say(format!("{} levels up", card.name));
    Ok(())
}

fn level_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if !ctx.badges_apply {
        return Ok(());
    }
    let opp = ctx.opposing_seat;
    let mut card = ctx.other_card()?.clone();
    if card.cracked {
        card.level = (card.level - 1).max(0);
        card.cracked = false;
        ctx.say_for(opp, format!("{} levels down", card.name));
    } else {
        card.cracked = true;
        ctx.say_for(opp, format!("{} cracks", card.name));
    }
    ctx.set_card(opp, &card)
}

// =============================================================================
// ROCK
// =============================================================================

static PEBBLE: CardDef = CardDef {
    id: CardId::Pebble,
    kind: ActionType::Rock,
    slot: 0,
    text: "5 + L damage. T1: gain a 2x damage badge. T2: +3L damage.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: pebble_damage },
        AbilityStep { name: "badge", categories: &[Category::Badge], run: pebble_badge },
    ],
};

fn pebble_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let level = ctx.level;
    let mut dmg = 5 + level;
    if ctx.timing_bonus == 2 {
        dmg += 3 * level;
    }
    ctx.damage(ctx.opposing_seat, dmg)?;
    ctx.say(format!("Pebble hits! {dmg}"));
    Ok(())
}

fn pebble_badge(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if ctx.timing_bonus == 1 {
        ctx.grant_badge(ctx.acting_seat, BadgeKind::DmgMultiplier, 2)?;
        ctx.say("Pebble grants DmgMultiplier(2x)");
    }
    Ok(())
}

static SLINGSHOT: CardDef = CardDef {
    id: CardId::Slingshot,
    kind: ActionType::Rock,
    slot: 0,
    text: "3 + L damage, twice.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: slingshot_shot },
        AbilityStep { name: "second_shot", categories: &[Category::Damage], run: slingshot_shot },
    ],
};

fn slingshot_shot(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let dmg = 3 + ctx.level;
    ctx.damage(ctx.opposing_seat, dmg)?;
    ctx.say(format!("Slingshot hits! {dmg}"));
    Ok(())
}

static BOULDER: CardDef = CardDef {
    id: CardId::Boulder,
    kind: ActionType::Rock,
    slot: 3,
    text: "gain a +25+5L damage badge. T1: gain a +2 level badge.",
    badge_multiplier: 1,
    steps: &[AbilityStep { name: "badge", categories: &[Category::Badge], run: boulder_badge }],
};

fn boulder_badge(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let total = 25 + 5 * ctx.level;
    ctx.grant_badge(ctx.acting_seat, BadgeKind::DmgBonus, total)?;
    ctx.say(format!("Boulder grants DmgBonus! 25 + 5({}) = {total}", ctx.level));
    if ctx.timing_bonus >= 1 {
        ctx.grant_badge(ctx.acting_seat, BadgeKind::LvlBonus, 2)?;
        ctx.say("Boulder grants LvlBonus(2)!");
    }
    Ok(())
}

static MOUNTAIN: CardDef = CardDef {
    id: CardId::Mountain,
    kind: ActionType::Rock,
    slot: 6,
    text: "15 + 10L damage. crack all opposing abilities. badges apply twice.",
    badge_multiplier: 2,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: mountain_damage },
        AbilityStep { name: "crack", categories: &[Category::Crack], run: mountain_crack },
    ],
};

fn mountain_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let total = 15 + 10 * ctx.level;
    ctx.damage(ctx.opposing_seat, total)?;
    ctx.say(format!("Mountain hits! 15 + {} * 10 = {total}", ctx.level));
    Ok(())
}

fn mountain_crack(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let opp = ctx.opposing_seat;
    let newly: Vec<String> = ctx
        .other()
        .cards
        .iter()
        .filter(|c| !c.cracked)
        .map(|c| c.name.to_string())
        .collect();
    let cracked: Vec<CardState> = ctx
        .other()
        .cards
        .iter()
        .map(|c| CardState { cracked: true, ..c.clone() })
        .collect();
    ctx.replace_cards(opp, &cracked)?;
    ctx.say(format!("Mountain cracks all uncracked {opp} cards! ({})", newly.join(", ")));
    Ok(())
}

// =============================================================================
// PAPER
// =============================================================================

static NAPKIN: CardDef = CardDef {
    id: CardId::Napkin,
    kind: ActionType::Paper,
    slot: 1,
    text: "2L health. T1: +4X damage, where X is opposing level. T2: gain a shield.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "health", categories: &[Category::Health], run: napkin_health },
        AbilityStep { name: "damage", categories: &[Category::Damage], run: napkin_damage },
        AbilityStep { name: "shield", categories: &[Category::Shield], run: napkin_shield },
    ],
};

fn napkin_health(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let amount = 2 * ctx.level;
    ctx.heal(ctx.acting_seat, amount)?;
    ctx.say(format!("Napkin heals! 2({}) = {amount}", ctx.level));
    Ok(())
}

fn napkin_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if ctx.timing_bonus < 1 {
        return Ok(());
    }
    let other_level = ctx.other_card()?.level;
    let total = 4 * other_level;
    ctx.damage(ctx.opposing_seat, total)?;
    ctx.say(format!("Napkin hits! 4({other_level}) = {total}"));
    Ok(())
}

fn napkin_shield(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if ctx.timing_bonus == 2 {
        ctx.grant_shield(ctx.acting_seat)?;
        ctx.say("Napkin grants a shield");
    }
    Ok(())
}

static BOOK: CardDef = CardDef {
    id: CardId::Book,
    kind: ActionType::Paper,
    slot: 4,
    text: "1+7X damage, where X is the total level of all abilities that share a type with this one. \
           then this ability's type becomes the type of the ability you selected last turn, or paper \
           if there is no such type. the ability you selected last turn levels up. \
           T1: the ability you selected last turn levels up two more times.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: book_damage },
        AbilityStep { name: "respec", categories: &[Category::Respec], run: book_respec },
        AbilityStep { name: "level", categories: &[Category::Level], run: book_level },
    ],
};

fn book_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let book_type = ctx.card()?.kind;
    let type_levels = |cards: &[CardState]| -> i64 {
        cards.iter().filter(|c| c.kind == book_type).map(|c| c.level).sum()
    };
    let ours = type_levels(&ctx.player().cards);
    let theirs = type_levels(&ctx.other().cards);
    let total = 1 + 7 * (ours + theirs);
    ctx.damage(ctx.opposing_seat, total)?;
    ctx.say(format!("Book ({}) hits! 1 + 7({ours} + {theirs}) = {total}", book_type.title()));
    Ok(())
}

/// Slot this seat resolved last round, unless it was truce or income.
fn previous_pick(ctx: &ResolutionContext<'_>) -> Result<Option<usize>, ResolutionError> {
    let slot = match ctx.previous_round()? {
        Some(prev) => prev.player(ctx.acting_seat).selection.as_ref().map(|s| s.slot),
        None => None,
    };
    match slot {
        Some(slot) if ctx.player().card(slot)?.kind != ActionType::Default => Ok(Some(slot)),
        _ => Ok(None),
    }
}

fn book_respec(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let mut card = ctx.card()?.clone();
    match previous_pick(ctx)? {
        Some(slot) => {
            let prev = ctx.player().card(slot)?;
            card.kind = prev.kind;
            ctx.say(format!(
                "Book becomes {}, because {} was chosen last turn.",
                prev.kind.title(),
                prev.name
            ));
        }
        None => {
            card.kind = ActionType::Paper;
            ctx.say("Book reverts to paper, since no type was chosen last turn.");
        }
    }
    ctx.set_card(ctx.acting_seat, &card)
}

fn book_level(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let slot = match previous_pick(ctx)? {
        Some(slot) => slot,
        None => {
            ctx.say("Can't level up nothing!");
            return Ok(());
        }
    };
    let mut card = ctx.player().card(slot)?.clone();
    card.cracked = false;
    card.level += 1;
    let mut times = "";
    if ctx.timing_bonus >= 1 {
        card.level += 2;
        times = " three times";
    }
    ctx.set_card(ctx.acting_seat, &card)?;
    ctx.say(format!("{} levels up{times}! (Book)", card.name));
    Ok(())
}

static CONTRACT: CardDef = CardDef {
    id: CardId::Contract,
    kind: ActionType::Paper,
    slot: 7,
    text: "7 damage. gain a shield. your opponent gains an end badge with \"if this is a TYPE ability, \
           you take 20 + 10L damage\", where TYPE is the opposing type.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: contract_damage },
        AbilityStep { name: "shield", categories: &[Category::Shield], run: contract_shield },
        AbilityStep { name: "badge", categories: &[Category::Badge], run: contract_badge },
    ],
};

fn contract_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    ctx.damage(ctx.opposing_seat, 7)?;
    ctx.say("Contract hits! 7");
    Ok(())
}

fn contract_shield(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    ctx.grant_shield(ctx.acting_seat)?;
    ctx.say("Contract grants a shield");
    Ok(())
}

fn contract_badge(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let curse = match ctx.other_card()?.kind {
        ActionType::Rock => BadgeKind::RockCurse,
        ActionType::Paper => BadgeKind::PaperCurse,
        ActionType::Scissors => BadgeKind::ScissorsCurse,
        ActionType::Default => {
            ctx.say("Can't make a Contract with nothing!");
            return Ok(());
        }
    };
    let bonus = 10 * ctx.level;
    let total = 20 + bonus;
    ctx.grant_badge(ctx.opposing_seat, curse, total)?;
    ctx.say(format!("Contract grants {} {curse:?}(20 + {bonus} = {total})", ctx.opposing_seat));
    Ok(())
}

// =============================================================================
// SCISSORS
// =============================================================================

static BUTTER_KNIFE: CardDef = CardDef {
    id: CardId::ButterKnife,
    kind: ActionType::Scissors,
    slot: 2,
    text: "10 + 2L damage. disable opposing ability for 1 turn. \
           T1: disable another random opposing ability for one turn. T2: +10 + 2L damage.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: butter_knife_damage },
        AbilityStep { name: "disable", categories: &[Category::Disable], run: butter_knife_disable },
    ],
};

fn butter_knife_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let mut dmg = 10 + 2 * ctx.level;
    if ctx.timing_bonus >= 2 {
        dmg += 10 + 2 * ctx.level;
    }
    ctx.damage(ctx.opposing_seat, dmg)?;
    ctx.say(format!("ButterKnife hits! {dmg}"));
    Ok(())
}

fn butter_knife_disable(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let opp = ctx.opposing_seat;
    let picked = ctx
        .other()
        .selection
        .as_ref()
        .ok_or(ResolutionError::NoSelection { seat: opp })?
        .slot;

    let mut targets = vec![picked];
    if ctx.timing_bonus >= 1 {
        let pool: Vec<usize> = (0..SELECTABLE_SLOTS).filter(|s| *s != picked).collect();
        if let Some(extra) = ctx.rng.choose(&pool) {
            targets.push(*extra);
        }
    }

    for target in targets {
        if target < SELECTABLE_SLOTS {
            let name = ctx.other().card(target)?.name;
            ctx.disable(opp, target, 1, "ButterKnife")?;
            ctx.say(format!("ButterKnife disables {name} for 1 round!"));
        } else {
            ctx.say("ButterKnife can't disable nothing!");
        }
    }
    Ok(())
}

static WIRECUTTER: CardDef = CardDef {
    id: CardId::Wirecutter,
    kind: ActionType::Scissors,
    slot: 5,
    text: "X damage, where X is the sum of levels of all your scissors abilities. gain a badge with \
           \"if this is a scissors ability, 3x damage.\" T1: a random non-scissors ability of yours \
           becomes scissors",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: wirecutter_damage },
        AbilityStep { name: "badge", categories: &[Category::Badge], run: wirecutter_badge },
        AbilityStep { name: "respec", categories: &[Category::Respec], run: wirecutter_respec },
    ],
};

fn wirecutter_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let levels: Vec<i64> = ctx
        .player()
        .cards
        .iter()
        .filter(|c| c.kind == ActionType::Scissors)
        .map(|c| c.level)
        .collect();
    let total: i64 = levels.iter().sum();
    ctx.damage(ctx.opposing_seat, total)?;
    ctx.say(format!("Wirecutter hits! {levels:?} = {total}"));
    Ok(())
}

fn wirecutter_badge(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    ctx.grant_badge(ctx.acting_seat, BadgeKind::ScissorsDmgMultiplier, 3)?;
    ctx.say("Wirecutter grants ScissorsDmgMultiplier(3)!");
    Ok(())
}

fn wirecutter_respec(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if ctx.timing_bonus < 1 {
        return Ok(());
    }
    let pool: Vec<&CardState> = ctx
        .player()
        .cards
        .iter()
        .filter(|c| c.slot < SELECTABLE_SLOTS && c.kind != ActionType::Scissors)
        .collect();
    let chosen = match ctx.rng.choose(&pool) {
        Some(card) => CardState { kind: ActionType::Scissors, ..(*card).clone() },
        None => {
            ctx.say("Wirecutter finds nothing to sharpen");
            return Ok(());
        }
    };
    ctx.set_card(ctx.acting_seat, &chosen)?;
    ctx.say(format!("{} becomes scissors", chosen.name));
    Ok(())
}

static TWO_HANDER: CardDef = CardDef {
    id: CardId::TwoHander,
    kind: ActionType::Scissors,
    slot: 8,
    text: "5 damage if level 0, otherwise 50 damage. if opposing ability is cracked, disable all \
           opposing abilities for one turn and disable this for three turns.",
    badge_multiplier: 1,
    steps: &[
        AbilityStep { name: "damage", categories: &[Category::Damage], run: two_hander_damage },
        AbilityStep { name: "disable", categories: &[Category::Disable], run: two_hander_disable },
    ],
};

fn two_hander_damage(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    let dmg = if ctx.level == 0 { 5 } else { 50 };
    ctx.damage(ctx.opposing_seat, dmg)?;
    ctx.say(format!("TwoHander hits! {dmg}"));
    Ok(())
}

fn two_hander_disable(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    if !ctx.other_card()?.cracked {
        ctx.say("TwoHander does not sense weakness!");
        return Ok(());
    }
    for slot in 0..SELECTABLE_SLOTS {
        ctx.disable(ctx.opposing_seat, slot, 1, "TwoHander")?;
    }
    ctx.disable(ctx.acting_seat, ctx.selection.slot, 3, "TwoHander")?;
    ctx.say("TwoHander disables everything for 1 round! TwoHander is disabled for 3 rounds.");
    Ok(())
}

// =============================================================================
// DEFAULTS
// =============================================================================

static TRUCE: CardDef = CardDef {
    id: CardId::Truce,
    kind: ActionType::Default,
    slot: 9,
    text: "lose 1 health.",
    badge_multiplier: 1,
    steps: &[AbilityStep { name: "loss", categories: &[Category::Loss], run: truce_loss }],
};

fn truce_loss(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    ctx.damage(ctx.acting_seat, 1)
}

static PASSIVE_INCOME: CardDef = CardDef {
    id: CardId::PassiveIncome,
    kind: ActionType::Default,
    slot: 10,
    text: "gain 2 health.",
    badge_multiplier: 1,
    steps: &[AbilityStep { name: "health", categories: &[Category::Health], run: income_health }],
};

fn income_health(ctx: &mut ResolutionContext<'_>) -> Result<(), ResolutionError> {
    ctx.heal(ctx.acting_seat, 2)?;
    ctx.say("passive income: +2 health");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbering() {
        let book = CardId::Book.def();
        assert_eq!(book.ability_count(), 6);
        assert_eq!(book.step(6).map(|s| s.name), Some("start"));
        assert_eq!(book.step(5).map(|s| s.name), Some("damage"));
        assert_eq!(book.step(4).map(|s| s.name), Some("respec"));
        assert_eq!(book.step(3).map(|s| s.name), Some("level"));
        assert_eq!(book.step(2).map(|s| s.name), Some("level_damage"));
        assert_eq!(book.step(1).map(|s| s.name), Some("level_up"));
        assert!(book.step(0).is_none());
        assert!(book.step(7).is_none());
    }

    #[test]
    fn test_registry_slots() {
        for id in CardId::ALL {
            let def = id.def();
            assert_eq!(def.id, id);
            assert!(def.slot < DECK_SIZE);
            assert!(!def.steps.is_empty());
        }
        assert_eq!(cards_for_slot(0), vec![CardId::Pebble, CardId::Slingshot]);
        assert_eq!(cards_for_slot(9), vec![CardId::Truce]);
    }

    #[test]
    fn test_random_deck_is_valid_and_seeded() {
        for seed in 0..20 {
            let deck = random_deck(seed);
            validate_deck(&deck).unwrap();
            assert_eq!(deck, random_deck(seed));
        }
    }

    #[test]
    fn test_validate_deck_rejects_misplaced_cards() {
        let mut deck = random_deck(1);
        deck.swap(1, 2);
        assert!(matches!(validate_deck(&deck), Err(ResolutionError::InvalidDeck(_))));
        assert!(validate_deck(&deck[..5]).is_err());
    }
}
