//! Session registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{GameKind, Seat};

use super::{GameId, GameSession, GameSnapshot, GameStatus, SessionConfig, SessionError, SubmitOutcome, TickOutcome};

/// Shared handle to one session.
pub type SessionHandle = Arc<RwLock<GameSession>>;

/// Manages all live games.
///
/// The map lock is only held to look a session up; every mutation runs
/// under the session's own write lock, so games never block each other.
pub struct SessionManager {
    /// Live sessions.
    sessions: RwLock<BTreeMap<GameId, SessionHandle>>,
    /// Settings for new sessions.
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager.
    pub fn new(config: SessionConfig) -> Self {
        Self { sessions: RwLock::new(BTreeMap::new()), config }
    }

    /// Create a game and return its id.
    pub async fn create(&self, kind: GameKind, overrides: &Value, now: DateTime<Utc>) -> Result<GameId, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::Capacity(self.config.max_sessions));
        }

        let id = Uuid::new_v4();
        let session = GameSession::with_config(id, kind, overrides, self.config.clone(), now)?;
        sessions.insert(id, Arc::new(RwLock::new(session)));
        info!(game = %id, total = sessions.len(), "session registered");
        Ok(id)
    }

    /// Look a session up.
    pub async fn get(&self, id: &GameId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    async fn handle(&self, id: &GameId) -> Result<SessionHandle, SessionError> {
        self.get(id).await.ok_or(SessionError::NotFound(*id))
    }

    /// Seat a player.
    pub async fn sit(&self, id: &GameId, seat: Seat, name: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        session.sit(seat, name, now)
    }

    /// Submit a move.
    pub async fn submit(
        &self,
        id: &GameId,
        seat: Seat,
        mv: &Value,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        session.submit(seat, mv, now)
    }

    /// Tick one game once.
    pub async fn tick(&self, id: &GameId, now: DateTime<Utc>) -> Result<TickOutcome, SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        session.tick(now)
    }

    /// Poll every game; returns the number of advances applied.
    ///
    /// A failing game is logged and skipped.
    pub async fn poll_all(&self, now: DateTime<Utc>) -> usize {
        let mut advanced = 0;
        for (id, handle) in self.handles().await {
            let mut session = handle.write().await;
            match session.poll(now) {
                Ok(n) => advanced += n,
                Err(err) => warn!(game = %id, error = %err, "poll failed"),
            }
        }
        if advanced > 0 {
            debug!(advanced, "poll complete");
        }
        advanced
    }

    /// What `seat` (or a spectator) sees of a game.
    pub async fn snapshot(
        &self,
        id: &GameId,
        seat: Option<Seat>,
        now: DateTime<Utc>,
    ) -> Result<GameSnapshot, SessionError> {
        let handle = self.handle(id).await?;
        let session = handle.read().await;
        session.snapshot(seat, now)
    }

    /// Drop a game. Returns whether it existed.
    pub async fn remove(&self, id: &GameId) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Number of registered games.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Drop finished games.
    pub async fn cleanup(&self) {
        let mut finished = Vec::new();
        for (id, handle) in self.handles().await {
            if handle.read().await.status() == GameStatus::Finished {
                finished.push(id);
            }
        }
        if finished.is_empty() {
            return;
        }

        let mut sessions = self.sessions.write().await;
        for id in finished {
            sessions.remove(&id);
            debug!(game = %id, "finished session removed");
        }
    }

    /// Every registered session, copied out of the map lock.
    async fn handles(&self) -> Vec<(GameId, SessionHandle)> {
        let sessions = self.sessions.read().await;
        sessions.iter().map(|(id, h)| (*id, Arc::clone(h))).collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
