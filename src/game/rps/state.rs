//! RPS State Definitions
//!
//! Typed model of the card battle. The engine decodes the JSON state into
//! these structs at the start of every call and emits patches against the
//! same field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::error::ResolutionError;
use crate::game::Seat;

use super::cards::CardId;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Health at game start.
pub const STARTING_HP: i64 = 250;

/// Nominal health cap (`STARTING_HP / 0.75`); heals are not clamped to it.
pub const MAX_HP: i64 = 333;

/// Slots a player can pick from (0..=8).
pub const SELECTABLE_SLOTS: usize = 9;

/// Slot resolved when neither seat picked.
pub const TRUCE_SLOT: usize = 9;

/// Slot resolved for a seat that did not pick.
pub const INCOME_SLOT: usize = 10;

/// Cards per deck.
pub const DECK_SIZE: usize = 11;

/// Picks are spread over three stages; slots `3k..3k+3` unlock in stage `k+1`.
pub const PICK_STAGES: usize = 3;

/// Stage in which abilities resolve.
pub const RESOLUTION_STAGE: u8 = 4;

fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// ACTION TYPES
// =============================================================================

/// Rock / paper / scissors category of a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
    /// Truce and income; never wins a comparison.
    Default,
}

impl ActionType {
    fn ordinal(self) -> Option<u8> {
        match self {
            ActionType::Rock => Some(0),
            ActionType::Paper => Some(1),
            ActionType::Scissors => Some(2),
            ActionType::Default => None,
        }
    }

    /// True when `self` wins against `other`.
    pub fn beats(self, other: ActionType) -> bool {
        match (self.ordinal(), other.ordinal()) {
            (Some(a), Some(b)) => (b + 1) % 3 == a,
            _ => false,
        }
    }

    /// Capitalized name used in messages and curse names.
    pub fn title(self) -> &'static str {
        match self {
            ActionType::Rock => "Rock",
            ActionType::Paper => "Paper",
            ActionType::Scissors => "Scissors",
            ActionType::Default => "Default",
        }
    }
}

// =============================================================================
// PER-SEAT VALUE OBJECTS
// =============================================================================

/// One card in a player's deck.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    /// Card identity.
    pub name: CardId,
    /// Current level.
    pub level: i64,
    /// Cracked cards lose a level on the next crack.
    pub cracked: bool,
    /// Current type (can change through respec effects).
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// Deck slot.
    pub slot: usize,
    /// Visible to the opponent mid-round.
    #[serde(default, skip_serializing_if = "is_false")]
    pub revealed: bool,
}

/// Kind of staged action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// A card pick.
    #[serde(rename = "RPS")]
    Rps,
}

/// A pick recorded in one of the three pick stages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAction {
    /// Action kind.
    pub kind: ActionKind,
    /// Picked slot.
    pub slot: usize,
}

impl StagedAction {
    /// A card pick.
    pub fn pick(slot: usize) -> Self {
        Self { kind: ActionKind::Rps, slot }
    }
}

/// What a seat resolves in stage 4.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Slot being resolved.
    pub slot: usize,
    /// Remaining ability steps; 0 means done.
    pub ability_number: u32,
    /// Timing bonus earned by picking early.
    pub timing: u32,
    /// Effective level for this resolution.
    pub level: i64,
}

/// Shield counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shields {
    /// Shields held.
    pub n: i64,
    /// Shields gained this turn (not usable until the next).
    pub this_turn: i64,
}

impl Shields {
    /// A shield can absorb a hit right now.
    pub fn available(&self) -> bool {
        self.n > 0 && self.n > self.this_turn
    }
}

/// Badge effect tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BadgeKind {
    /// Multiply damage dealt by the step.
    DmgMultiplier,
    /// Multiply damage, but only for scissors cards.
    ScissorsDmgMultiplier,
    /// Flat extra damage.
    DmgBonus,
    /// Extra levels whenever a card levels up.
    LvlBonus,
    /// Owner takes damage when resolving a rock card.
    RockCurse,
    /// Owner takes damage when resolving a paper card.
    PaperCurse,
    /// Owner takes damage when resolving a scissors card.
    ScissorsCurse,
}

/// Deferred modifier on a seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    /// Effect tag.
    pub name: BadgeKind,
    /// Effect strength.
    pub arg: i64,
    /// Round the badge was earned; usable from the next round on.
    pub round: u32,
}

/// Restriction type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestrictionKind {
    /// The slot in `arg` cannot be picked.
    Disabled,
}

/// Temporary block on future moves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Restriction type.
    pub name: RestrictionKind,
    /// Blocked slot.
    pub arg: usize,
    /// Who imposed it, e.g. `p1's ButterKnife @ round 3`.
    pub source: String,
    /// Full turns left.
    pub duration: u32,
}

impl Restriction {
    /// True when this restriction forbids picking `selection`.
    pub fn blocks(&self, selection: i64) -> bool {
        match self.name {
            RestrictionKind::Disabled => selection >= 0 && self.arg as i64 == selection,
        }
    }
}

// =============================================================================
// PLAYER & GAME STATE
// =============================================================================

/// One seat's sub-state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Nominal health cap.
    pub max_hp: i64,
    /// Current health.
    pub hp: i64,
    /// Coins (tie-break after health).
    pub coins: i64,
    /// What this seat resolves in stage 4.
    #[serde(default)]
    pub selection: Option<Selection>,
    /// Earned badges.
    #[serde(default)]
    pub badges: Vec<Badge>,
    /// Badges consumed during the current resolution.
    #[serde(default)]
    pub badges_used: Vec<Badge>,
    /// Shield counters.
    #[serde(default)]
    pub shields: Shields,
    /// Active restrictions.
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
    /// Picks per stage.
    pub stages: [Vec<StagedAction>; PICK_STAGES],
    /// Untimed games: the seat chose not to pick this round.
    #[serde(default)]
    pub passed: bool,
    /// Deck, indexed by slot.
    pub cards: Vec<CardState>,
}

impl PlayerState {
    /// Fresh seat with the given deck.
    pub fn new(deck: &[CardId]) -> Self {
        Self {
            max_hp: MAX_HP,
            hp: STARTING_HP,
            coins: 0,
            selection: None,
            badges: Vec::new(),
            badges_used: Vec::new(),
            shields: Shields::default(),
            restrictions: Vec::new(),
            stages: Default::default(),
            passed: false,
            cards: deck
                .iter()
                .map(|id| {
                    let def = id.def();
                    CardState {
                        name: *id,
                        level: 1,
                        cracked: false,
                        kind: def.kind,
                        slot: def.slot,
                        revealed: false,
                    }
                })
                .collect(),
        }
    }

    /// First staged pick and the stage (1-based) it was made in.
    pub fn first_pick(&self) -> Option<(usize, &StagedAction)> {
        self.stages
            .iter()
            .enumerate()
            .find_map(|(i, actions)| actions.iter().find(|a| a.kind == ActionKind::Rps).map(|a| (i + 1, a)))
    }

    /// Picked or passed this round.
    pub fn has_submitted(&self) -> bool {
        self.passed || self.stages.iter().any(|s| !s.is_empty())
    }

    /// Card by slot.
    pub fn card(&self, slot: usize) -> Result<&CardState, ResolutionError> {
        self.cards
            .get(slot)
            .ok_or_else(|| ResolutionError::UnknownCard(format!("slot {slot}")))
    }

    /// Card the seat is resolving (or lost with).
    pub fn selected_card(&self, seat: Seat) -> Result<&CardState, ResolutionError> {
        let selection = self.selection.as_ref().ok_or(ResolutionError::NoSelection { seat })?;
        self.card(selection.slot)
    }

    /// Remaining ability steps.
    pub fn remaining_steps(&self) -> u32 {
        self.selection.as_ref().map_or(0, |s| s.ability_number)
    }
}

/// Kind of round outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Type advantage.
    Win,
    /// Same type, earlier stage.
    Ambush,
    /// Only one seat picked.
    Default,
    /// Same type, same stage.
    Tie,
    /// Nobody picked.
    Truce,
}

/// Stage-3 verdict driving stage 4.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Seat that resolves first.
    pub player: Seat,
    /// How the round was decided.
    #[serde(rename = "type")]
    pub kind: OutcomeKind,
}

/// Round bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Round counter (keyframe field).
    pub round: u32,
    /// 1..=3 pick stages, 4 resolution.
    pub stage: u8,
    /// Set between stage 3 and the end of the round.
    #[serde(default)]
    pub outcome: Option<Outcome>,
    /// Messages produced by the last advance.
    #[serde(default)]
    pub message: Vec<String>,
}

/// Whole card-battle state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsState {
    /// Round bookkeeping.
    pub meta: Meta,
    /// First seat.
    pub p1: PlayerState,
    /// Second seat.
    pub p2: PlayerState,
}

impl RpsState {
    /// Decode from the boundary representation.
    pub fn from_value(value: &Value) -> Result<Self, ResolutionError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Encode to the boundary representation.
    pub fn to_value(&self) -> Result<Value, ResolutionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Seat sub-state.
    pub fn player(&self, seat: Seat) -> &PlayerState {
        match seat {
            Seat::P1 => &self.p1,
            Seat::P2 => &self.p2,
        }
    }

    /// Mutable seat sub-state.
    pub fn player_mut(&mut self, seat: Seat) -> &mut PlayerState {
        match seat {
            Seat::P1 => &mut self.p1,
            Seat::P2 => &mut self.p2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_wheel() {
        use ActionType::*;
        assert!(Rock.beats(Scissors));
        assert!(Paper.beats(Rock));
        assert!(Scissors.beats(Paper));
        assert!(!Rock.beats(Paper));
        assert!(!Rock.beats(Rock));
        assert!(!Default.beats(Rock));
        assert!(!Rock.beats(Default));
    }

    #[test]
    fn test_first_pick() {
        let mut player = PlayerState::new(&[]);
        assert_eq!(player.first_pick(), None);
        assert!(!player.has_submitted());

        player.stages[2].push(StagedAction::pick(7));
        player.stages[1].push(StagedAction::pick(4));
        assert_eq!(player.first_pick().map(|(stage, a)| (stage, a.slot)), Some((2, 4)));
        assert!(player.has_submitted());
    }

    #[test]
    fn test_shields_available() {
        assert!(!Shields { n: 0, this_turn: 0 }.available());
        assert!(Shields { n: 1, this_turn: 0 }.available());
        assert!(!Shields { n: 1, this_turn: 1 }.available());
    }
}
