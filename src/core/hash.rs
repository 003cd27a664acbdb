//! State Hashing for Verification
//!
//! Provides deterministic hashing of game state for:
//! - Replay validation (reconstructed state == recorded state)
//! - Cheap change detection for spectators and caches
//! - Log correlation across rewinds

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for game state.
///
/// Wraps SHA-256 with a type-tagged walk over JSON values.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for game state.
    pub fn for_game_state() -> Self {
        Self::new(b"TIPR_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a JSON value.
    ///
    /// Each node is prefixed with a kind tag and containers with their
    /// length, so `[1, [2]]` and `[[1], 2]` never collide. Object keys
    /// are visited in sorted order.
    pub fn update_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.update_u8(0),
            Value::Bool(b) => {
                self.update_u8(1);
                self.update_bool(*b);
            }
            Value::Number(n) => {
                self.update_u8(2);
                self.update_str(&n.to_string());
            }
            Value::String(s) => {
                self.update_u8(3);
                self.update_str(s);
            }
            Value::Array(items) => {
                self.update_u8(4);
                self.update_u64(items.len() as u64);
                for item in items {
                    self.update_value(item);
                }
            }
            Value::Object(fields) => {
                self.update_u8(5);
                self.update_u64(fields.len() as u64);
                for (key, item) in fields {
                    self.update_str(key);
                    self.update_value(item);
                }
            }
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Fingerprint a bare state value.
pub fn fingerprint(state: &Value) -> StateHash {
    let mut hasher = StateHasher::for_game_state();
    hasher.update_value(state);
    hasher.finalize()
}

/// Compute the state hash for a game at a given keyframe value.
///
/// Binds the game seed and keyframe counter in front of the state so two
/// games that happen to reach the same board do not share a hash.
pub fn compute_state_hash(keyframe: u64, game_seed: u64, state: &Value) -> StateHash {
    let mut hasher = StateHasher::for_game_state();
    hasher.update_u64(keyframe);
    hasher.update_u64(game_seed);
    hasher.update_value(state);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_hasher_determinism() {
        let state = json!({"p1": {"hp": 250, "cards": [1, 2]}, "meta": {"round": 3}});
        assert_eq!(fingerprint(&state), fingerprint(&state.clone()));
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u64(1);
            h.update_u64(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u64(2);
            h.update_u64(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_nesting_is_unambiguous() {
        assert_ne!(fingerprint(&json!([1, [2]])), fingerprint(&json!([[1], 2])));
        assert_ne!(fingerprint(&json!("1")), fingerprint(&json!(1)));
        assert_ne!(fingerprint(&json!({"ab": "c"})), fingerprint(&json!({"a": "bc"})));
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash1 = hash_with_domain(b"DOMAIN_A", &data);
        let hash2 = hash_with_domain(b"DOMAIN_B", &data);

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_compute_state_hash() {
        let state = json!({"meta": {"round": 1}});
        let hash = compute_state_hash(1, 12345, &state);
        assert_eq!(hash, compute_state_hash(1, 12345, &state));
        assert_ne!(hash, compute_state_hash(2, 12345, &state));
        assert_ne!(hash, compute_state_hash(1, 54321, &state));
    }
}
