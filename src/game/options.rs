//! Per-game configuration, fixed at creation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::patch::{apply, Patch, PatchError};

use super::rps::cards::CardId;

/// Option overrides could not be turned into valid options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Overrides are not a valid patch.
    #[error("invalid overrides: {0}")]
    Overrides(#[from] PatchError),

    /// Merged options do not decode.
    #[error("invalid options: {0}")]
    Decode(#[from] serde_json::Error),

    /// Merged options decode but make no sense.
    #[error("invalid options: {0}")]
    Invalid(String),
}

/// Configuration of one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameOptions {
    /// Stages advance on a timer instead of waiting for both seats.
    pub timed: bool,
    /// Seconds per submission stage.
    pub timer: u32,
    /// Seconds between resolution steps.
    pub resolution_tick: u32,
    /// Seats in the game.
    pub player_count: usize,
    /// Card per slot; empty means a random deck from `seed`.
    pub deck: Vec<CardId>,
    /// Seed for every random decision in the game.
    pub seed: u64,
    /// Maximum total bet per betting stage.
    pub bet_cap: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            timed: false,
            timer: 7,
            resolution_tick: 2,
            player_count: 2,
            deck: Vec::new(),
            seed: 0,
            bet_cap: 10,
        }
    }
}

impl GameOptions {
    /// Merge creator overrides (a patch in wire form) into these options.
    pub fn with_overrides(&self, overrides: &Value) -> Result<Self, OptionsError> {
        let patch = Patch::try_from(overrides.clone())?;
        let merged = apply(&serde_json::to_value(self)?, &patch)?;
        let options: GameOptions = serde_json::from_value(merged)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.player_count != 2 {
            return Err(OptionsError::Invalid(format!(
                "player_count must be 2, got {}",
                self.player_count
            )));
        }
        if self.timed && self.timer == 0 {
            return Err(OptionsError::Invalid("timed games need a timer".into()));
        }
        if self.resolution_tick == 0 {
            return Err(OptionsError::Invalid("resolution_tick must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_merge_into_defaults() {
        let options = GameOptions::default()
            .with_overrides(&json!({"timed": true, "seed": 99}))
            .unwrap();
        assert!(options.timed);
        assert_eq!(options.seed, 99);
        assert_eq!(options.timer, 7);
        assert_eq!(options.bet_cap, 10);
    }

    #[test]
    fn test_deck_override() {
        let options = GameOptions::default()
            .with_overrides(&json!({"deck": ["Pebble", "Napkin"]}))
            .unwrap();
        assert_eq!(options.deck, vec![CardId::Pebble, CardId::Napkin]);
    }

    #[test]
    fn test_rejects_bad_options() {
        assert!(matches!(
            GameOptions::default().with_overrides(&json!({"player_count": 3})),
            Err(OptionsError::Invalid(_))
        ));
        assert!(matches!(
            GameOptions::default().with_overrides(&json!({"deck": ["Spoon"]})),
            Err(OptionsError::Decode(_))
        ));
        assert!(GameOptions::default().with_overrides(&json!({"$bad": 1})).is_err());
    }
}
