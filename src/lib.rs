//! # Tipr Engine
//!
//! Versioned, replayable game-state engine for asynchronous two-seat games.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TIPR ENGINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── patch.rs    - Patch algebra (merge, apply, diff)        │
//! │  ├── numeric.rs  - Ordered numeric modifier stacks           │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State fingerprints                        │
//! │                                                              │
//! │  history/        - Keyframed, rewindable event log           │
//! │                                                              │
//! │  game/           - Turn resolution (pure)                    │
//! │  ├── mod.rs      - Rules trait, seats, game registry         │
//! │  ├── options.rs  - Game options and overrides                │
//! │  ├── rps/        - Card battle: cards, abilities, badges     │
//! │  └── liar/       - Statement writing and betting             │
//! │                                                              │
//! │  session/        - Mutable side (driver, manager)            │
//! │  ├── driver.rs   - Apply, record, rewind one game            │
//! │  └── manager.rs  - Many games behind async locks             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/`, `history/` and `game/` are deterministic:
//! - No HashMap (BTreeMap for sorted iteration)
//! - No system time; callers pass `now`
//! - All randomness from seeded Xorshift128+ keyed by game seed and round
//!
//! Replaying the recorded patches of an interval onto its keyframe
//! reproduces every state the game passed through.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod history;
pub mod session;

// Re-export commonly used types
pub use core::patch::{apply, diff, Patch};
pub use core::rng::DeterministicRng;
pub use game::{GameKind, GameOptions, GameResult, Rules, Seat};
pub use history::HistoryLog;
pub use session::{GameSession, SessionManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
