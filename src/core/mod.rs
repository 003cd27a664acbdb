//! Core deterministic primitives.
//!
//! Everything in this module is a pure function of its inputs. The patch
//! algebra and the numeric modifier stack define how state changes; the RNG
//! and hasher make those changes reproducible and checkable on replay.

pub mod hash;
pub mod numeric;
pub mod patch;
pub mod rng;

// Re-export core types
pub use hash::{compute_state_hash, fingerprint, StateHash};
pub use numeric::{NumericModifier, NumericOp};
pub use patch::{apply, diff, ListOp, Patch, PatchError};
pub use rng::{derive_turn_seed, DeterministicRng};
