//! Single-game driver.
//!
//! The only place where patches are applied to live state. Every applied
//! patch lands in the history log: moves as move events, advances as time
//! events or, when the keyframe field changes, as a fresh keyframe.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::patch::{apply, Patch};
use crate::game::{GameKind, GameOptions, GameResult, MoveError, ResolutionError, Rules, Seat, TickClock};
use crate::history::{HistoryEvent, HistoryLog};

use super::{
    ChatEntry, GameId, GameSnapshot, GameStatus, SessionConfig, SessionError, SubmitOutcome, TickOutcome,
    SYSTEM_USER,
};

/// Seed for games whose creator did not pick one.
fn seed_from_id(id: &GameId) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&id.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// A live game.
pub struct GameSession {
    id: GameId,
    kind: GameKind,
    rules: &'static dyn Rules,
    options: GameOptions,
    config: SessionConfig,
    status: GameStatus,
    seats: [Option<String>; 2],
    state: Value,
    history: HistoryLog,
    clock: TickClock,
    chat: Vec<ChatEntry>,
    result: Option<GameResult>,
    created_at: DateTime<Utc>,
}

impl GameSession {
    /// Create a game with default session settings.
    pub fn new(kind: GameKind, overrides: &Value, now: DateTime<Utc>) -> Result<Self, SessionError> {
        Self::with_config(Uuid::new_v4(), kind, overrides, SessionConfig::default(), now)
    }

    /// Create a game with an explicit id and configuration.
    ///
    /// `overrides` is a patch in wire form merged into the kind's default
    /// options; without a `seed` override the seed is taken from the id.
    pub fn with_config(
        id: GameId,
        kind: GameKind,
        overrides: &Value,
        config: SessionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let rules = kind.rules();
        let mut options = rules.default_options().with_overrides(overrides)?;
        if overrides.get("seed").is_none() {
            options.seed = seed_from_id(&id);
        }
        let state = rules.start_state(&options)?;
        let history = HistoryLog::starting_at(state.clone(), now);

        info!(game = %id, %kind, seed = options.seed, timed = options.timed, "game created");

        let mut session = Self {
            id,
            kind,
            rules,
            options,
            config,
            status: GameStatus::Created,
            seats: [None, None],
            state,
            history,
            clock: TickClock::default(),
            chat: Vec::new(),
            result: None,
            created_at: now,
        };
        session.post(SYSTEM_USER, format!("{kind} game created"), now);
        Ok(session)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Game identifier.
    pub fn id(&self) -> GameId {
        self.id
    }

    /// Game type.
    pub fn kind(&self) -> GameKind {
        self.kind
    }

    /// Lifecycle status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Full current state.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// History log.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Game options.
    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    /// Final result, once reached.
    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    /// Every chat line.
    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fingerprint of the current state, bound to the game seed and the
    /// number of canonical intervals.
    pub fn state_hash(&self) -> StateHash {
        compute_state_hash(self.history.canonical_len() as u64, self.options.seed, &self.state)
    }

    /// Append a chat line.
    pub fn post(&mut self, user: &str, message: impl Into<String>, now: DateTime<Utc>) {
        self.chat.push(ChatEntry { timestamp: now, user: user.to_string(), message: message.into() });
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Take a seat. The game starts once both seats are filled.
    #[instrument(skip(self, name), fields(game = %self.id))]
    pub fn sit(&mut self, seat: Seat, name: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.seats[seat.index()].is_some() {
            return Err(SessionError::SeatTaken(seat));
        }
        self.seats[seat.index()] = Some(name.to_string());
        self.post(SYSTEM_USER, format!("{name} sits at {seat}"), now);

        if self.status == GameStatus::Created && self.seats.iter().all(Option::is_some) {
            self.status = GameStatus::Active;
            self.clock.reset(now, self.rules.next_tick(&self.options, &self.state));
            info!(game = %self.id, "game active");
        }
        Ok(())
    }

    /// Freeze the game.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != GameStatus::Active {
            return Err(SessionError::InvalidState(self.status));
        }
        self.status = GameStatus::Paused;
        self.post(SYSTEM_USER, "game paused", now);
        Ok(())
    }

    /// Unfreeze the game; the timer restarts.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != GameStatus::Paused {
            return Err(SessionError::InvalidState(self.status));
        }
        self.status = GameStatus::Active;
        self.clock.reset(now, self.rules.next_tick(&self.options, &self.state));
        self.post(SYSTEM_USER, "game resumed", now);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Moves and advances
    // -------------------------------------------------------------------------

    /// Validate and apply a move. Rejected moves change nothing.
    #[instrument(skip(self, mv), fields(game = %self.id))]
    pub fn submit(&mut self, seat: Seat, mv: &Value, now: DateTime<Utc>) -> Result<SubmitOutcome, SessionError> {
        if self.status != GameStatus::Active {
            return Err(MoveError::GameNotActive(self.status.to_string()).into());
        }
        let patch = self.rules.submit_move(&self.options, &self.state, seat, mv)?;

        let applied = apply(&self.state, &patch)
            .map_err(ResolutionError::from)
            .and_then(|next| self.rules.winner(&next).map(|result| (next, result)));
        match applied {
            Ok((next, result)) => {
                debug!(%seat, "move accepted");
                self.state = next;
                self.history
                    .append_event(HistoryEvent::player_move(seat, mv.clone(), patch, now))?;
                self.finish_if_decided(result, now);
                Ok(SubmitOutcome::Accepted)
            }
            Err(err) => {
                error!(game = %self.id, %seat, error = %err, "move patch failed");
                let reason = self.recover(&err, now)?;
                Ok(SubmitOutcome::RolledBack { reason })
            }
        }
    }

    /// Advance once if the rules say so.
    #[instrument(skip(self), fields(game = %self.id))]
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, SessionError> {
        if self.status != GameStatus::Active {
            return Ok(TickOutcome::Idle);
        }
        if self.clock.last_tick.is_none() {
            self.clock.reset(now, self.rules.next_tick(&self.options, &self.state));
        }
        if !self.rules.should_advance(&self.options, &self.state, &self.clock, now) {
            return Ok(TickOutcome::Idle);
        }
        self.advance(now)
    }

    /// Advance while eligible, at most `max_advances_per_poll` times.
    /// Returns the number of applied advances.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let mut advanced = 0;
        for _ in 0..self.config.max_advances_per_poll {
            match self.tick(now)? {
                TickOutcome::Advanced { .. } => advanced += 1,
                TickOutcome::Idle | TickOutcome::RolledBack { .. } => break,
            }
        }
        Ok(advanced)
    }

    fn compute_advance(&self) -> Result<(Patch, Value, Option<GameResult>), ResolutionError> {
        let patch = self.rules.advance(&self.options, &self.state, &self.history)?;
        let next = apply(&self.state, &patch)?;
        let result = self.rules.winner(&next)?;
        Ok((patch, next, result))
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, SessionError> {
        let (patch, next, result) = match self.compute_advance() {
            Ok(computed) => computed,
            Err(err) => {
                error!(game = %self.id, error = %err, "resolution failed");
                let reason = self.recover(&err, now)?;
                return Ok(TickOutcome::RolledBack { reason });
            }
        };

        if patch.get(&["meta", "message"]).is_some() {
            let lines: Vec<String> = next
                .pointer("/meta/message")
                .and_then(Value::as_array)
                .map(|lines| lines.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            for line in lines {
                self.post(SYSTEM_USER, line, now);
            }
        }

        let keyframe = self.rules.keyframe_value(&next) != self.rules.keyframe_value(&self.state);
        if keyframe {
            info!(
                game = %self.id,
                keyframe = ?self.rules.keyframe_value(&next),
                "keyframe opened"
            );
            self.history.open_keyframe(next.clone(), now);
        } else {
            self.history.append_event(HistoryEvent::time(patch, now))?;
        }

        self.state = next;
        self.clock.reset(now, self.rules.next_tick(&self.options, &self.state));
        let finished = self.finish_if_decided(result, now);
        Ok(TickOutcome::Advanced { keyframe, finished })
    }

    fn finish_if_decided(&mut self, result: Option<GameResult>, now: DateTime<Utc>) -> Option<GameResult> {
        let result = result?;
        self.result = Some(result);
        self.status = GameStatus::Finished;
        let message = match result {
            GameResult::Winner(seat) => format!("{seat} wins the game"),
            GameResult::Draw => "the game is a draw".to_string(),
        };
        info!(game = %self.id, ?result, hash = %hex::encode(self.state_hash()), "game finished");
        self.post(SYSTEM_USER, message, now);
        Some(result)
    }

    /// Rewind one interval after a failed resolution; returns the chat reason.
    fn recover(&mut self, err: &ResolutionError, now: DateTime<Utc>) -> Result<String, SessionError> {
        let round = self
            .rules
            .keyframe_value(&self.state)
            .map(Value::to_string)
            .unwrap_or_else(|| "start".to_string());
        let reason = format!("error doing timed update: {err}; resetting to round {round}");
        self.rewind(1, &reason, now)?;
        Ok(reason)
    }

    // -------------------------------------------------------------------------
    // Rewind and views
    // -------------------------------------------------------------------------

    /// Roll back `n` history intervals and restart the timer.
    #[instrument(skip(self, reason), fields(game = %self.id))]
    pub fn rewind(&mut self, n: usize, reason: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.state = self.history.rewind(n, reason, now)?;
        self.clock.reset(now, self.rules.next_tick(&self.options, &self.state));
        self.post(SYSTEM_USER, reason, now);

        if self.status == GameStatus::Finished {
            self.result = None;
            self.status = GameStatus::Active;
        }
        warn!(game = %self.id, intervals = n, hash = %hex::encode(self.state_hash()), "game rewound");
        Ok(())
    }

    /// What `seat` (or a spectator) sees right now.
    pub fn snapshot(&self, seat: Option<Seat>, now: DateTime<Utc>) -> Result<GameSnapshot, SessionError> {
        let view = self.rules.view(&self.state, &self.history, seat)?;
        let tail = self.chat.len().saturating_sub(self.config.chat_tail);
        Ok(GameSnapshot {
            id: self.id,
            kind: self.kind,
            status: self.status,
            timer_duration: self.clock.next_tick.map_or(-1, i64::from),
            time_remaining: self.clock.remaining(now),
            state: view,
            chat: self.chat[tail..].to_vec(),
            options: self.options.clone(),
            seats: self.seats.clone(),
            result: self.result,
        })
    }

    /// Replace the live state without recording it. Operator use only.
    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: Value) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Reconstructed;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::seconds(secs)
    }

    fn rps_game() -> GameSession {
        let overrides = json!({"seed": 5, "deck": [
            "Pebble", "Napkin", "ButterKnife", "Boulder", "Book", "Wirecutter",
            "Mountain", "Contract", "TwoHander", "Truce", "PassiveIncome"
        ]});
        let mut game = GameSession::new(GameKind::Rps, &overrides, t(0)).unwrap();
        game.sit(Seat::P1, "ana", t(0)).unwrap();
        game.sit(Seat::P2, "bo", t(0)).unwrap();
        game
    }

    /// Tick once per resolution interval until nothing happens.
    fn play_out(game: &mut GameSession, mut now: i64) -> i64 {
        loop {
            now += 3;
            if game.poll(t(now)).unwrap() == 0 && game.poll(t(now + 3)).unwrap() == 0 {
                return now;
            }
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut game = GameSession::new(GameKind::Liar, &json!({}), t(0)).unwrap();
        assert_eq!(game.status(), GameStatus::Created);
        assert!(matches!(
            game.submit(Seat::P1, &json!("hello"), t(0)),
            Err(SessionError::InvalidMove(MoveError::GameNotActive(_)))
        ));

        game.sit(Seat::P1, "ana", t(0)).unwrap();
        assert!(matches!(game.sit(Seat::P1, "bo", t(0)), Err(SessionError::SeatTaken(Seat::P1))));
        game.sit(Seat::P2, "bo", t(0)).unwrap();
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.options().timer, 180);

        game.pause(t(1)).unwrap();
        assert_eq!(game.tick(t(500)).unwrap(), TickOutcome::Idle);
        game.resume(t(2)).unwrap();
        assert!(game.resume(t(2)).is_err());
    }

    #[test]
    fn test_seed_defaults_to_id() {
        let id = Uuid::new_v4();
        let game = GameSession::with_config(id, GameKind::Rps, &json!({}), SessionConfig::default(), t(0)).unwrap();
        assert_eq!(game.options().seed, seed_from_id(&id));

        let seeded = GameSession::new(GameKind::Rps, &json!({"seed": 9}), t(0)).unwrap();
        assert_eq!(seeded.options().seed, 9);
    }

    #[test]
    fn test_invalid_move_leaves_no_trace() {
        let mut game = rps_game();
        let before = game.state().clone();
        let events = game.history().intervals()[0].events.len();

        assert!(matches!(
            game.submit(Seat::P1, &json!({"selection": 42}), t(1)),
            Err(SessionError::InvalidMove(MoveError::OutOfRange(42)))
        ));
        assert_eq!(game.state(), &before);
        assert_eq!(game.history().intervals()[0].events.len(), events);
    }

    #[test]
    fn test_round_replays_from_history() {
        let mut game = rps_game();
        assert_eq!(game.submit(Seat::P1, &json!({"selection": 0}), t(1)).unwrap(), SubmitOutcome::Accepted);
        game.submit(Seat::P2, &json!({"selection": 2}), t(1)).unwrap();

        // Picks are in, so the first advance happens without waiting.
        assert!(matches!(game.tick(t(1)).unwrap(), TickOutcome::Advanced { keyframe: false, .. }));
        play_out(&mut game, 1);

        let state = game.state().clone();
        assert_eq!(state["meta"]["round"], json!(2));
        assert_eq!(state["p2"]["hp"], json!(244));
        assert_eq!(game.history().canonical_len(), 2);

        // The closed round replays to its recorded final state.
        let first = game.history().reconstruct(0, None, true).unwrap().into_final().unwrap();
        assert_eq!(first["meta"]["stage"], json!(4));
        assert_eq!(first["p2"]["hp"], json!(244));
        match game.history().reconstruct(0, None, false).unwrap() {
            Reconstructed::Sequence(states) => assert_eq!(states.last(), Some(&first)),
            Reconstructed::Final(_) => panic!("expected a sequence"),
        }
        assert_eq!(game.history().reconstruct(-1, None, true).unwrap().into_final(), Some(state));
        assert!(game.chat().iter().any(|c| c.message == "p1 wins"));
    }

    #[test]
    fn test_poll_is_bounded() {
        let config = SessionConfig { max_advances_per_poll: 1, ..SessionConfig::default() };
        let mut game =
            GameSession::with_config(Uuid::new_v4(), GameKind::Liar, &json!({"timed": true}), config, t(0)).unwrap();
        game.sit(Seat::P1, "ana", t(0)).unwrap();
        game.sit(Seat::P2, "bo", t(0)).unwrap();
        assert_eq!(game.poll(t(100)).unwrap(), 0);
        assert_eq!(game.poll(t(181)).unwrap(), 1);
        assert_eq!(game.state()["meta"]["round"], json!(1));
    }

    #[test]
    fn test_malformed_state_rolls_back() {
        let mut game = rps_game();
        let start = game.state().clone();
        game.submit(Seat::P1, &json!({"selection": 0}), t(1)).unwrap();
        game.submit(Seat::P2, &json!({"selection": 2}), t(1)).unwrap();
        game.tick(t(1)).unwrap();

        let mut broken = game.state().clone();
        broken["p1"]["selection"]["ability_number"] = json!(40);
        game.force_state(broken);

        let outcome = game.tick(t(10)).unwrap();
        let reason = match outcome {
            TickOutcome::RolledBack { reason } => reason,
            other => panic!("expected rollback, got {other:?}"),
        };
        assert!(reason.starts_with("error doing timed update"));
        assert!(reason.ends_with("resetting to round 1"));
        assert_eq!(game.state(), &start);
        assert_eq!(game.status(), GameStatus::Active);
        assert_eq!(game.history().intervals().len(), 2);
        assert!(game.history().intervals()[0].is_rewound());
        assert_eq!(game.chat().last().map(|c| c.message.as_str()), Some(reason.as_str()));
    }

    #[test]
    fn test_game_finishes() {
        let mut game = rps_game();
        let mut low = game.state().clone();
        low["p2"]["hp"] = json!(3);
        game.force_state(low);

        game.submit(Seat::P1, &json!({"selection": 0}), t(1)).unwrap();
        game.submit(Seat::P2, &json!({"selection": 2}), t(1)).unwrap();
        play_out(&mut game, 1);

        assert_eq!(game.status(), GameStatus::Finished);
        assert_eq!(game.result(), Some(GameResult::Winner(Seat::P1)));
        assert!(game.chat().iter().any(|c| c.message == "p1 wins the game"));
        assert_eq!(game.tick(t(1000)).unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn test_snapshot() {
        let mut game = rps_game();
        game.submit(Seat::P1, &json!({"selection": 4}), t(1)).unwrap();

        let snap = game.snapshot(Some(Seat::P2), t(3)).unwrap();
        assert_eq!(snap.status, GameStatus::Active);
        assert_eq!(snap.timer_duration, 7);
        assert_eq!(snap.time_remaining, 4);
        assert_eq!(snap.state["p1"]["stages"], json!([[], [], []]));
        assert_eq!(snap.seats, [Some("ana".to_string()), Some("bo".to_string())]);
        assert!(snap.chat.len() <= 50);
    }

    #[test]
    fn test_state_hash_tracks_state() {
        let mut game = rps_game();
        let before = game.state_hash();
        assert_eq!(before, game.state_hash());
        game.submit(Seat::P1, &json!({"selection": 4}), t(1)).unwrap();
        assert_ne!(before, game.state_hash());
    }
}
