//! Per-user `D_model` invariant (§9 "embedding dimension drift"). Every memory
//! class writes embeddings padded to a fixed `D_pad`, but the *native* model
//! width behind that padding must stay uniform per user. Mixing 768-d and
//! 1536-d models under the same user is refused with `Fatal` rather than
//! silently producing meaningless cosine distances.

use dashmap::DashMap;

use mnemo_core::error::{EngineError, EngineResult};

/// Tracks the `D_model` each user has committed to. Keyed by `user_id`, one
/// entry per user, populated lazily on first write.
pub struct DimensionRegistry {
    recorded: DashMap<String, i32>,
}

impl DimensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            recorded: DashMap::new(),
        }
    }

    /// Checks `d_model` against the user's recorded dimension, recording it on
    /// first use. Returns `Fatal` if a later write disagrees (§9, §8 property:
    /// mismatched dimensions must never be ranked together).
    pub fn check_and_record(&self, user_id: &str, d_model: i32) -> EngineResult<()> {
        match self.recorded.entry(user_id.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(d_model);
                Ok(())
            }
            dashmap::mapref::entry::Entry::Occupied(e) => {
                let existing = *e.get();
                if existing == d_model {
                    Ok(())
                } else {
                    Err(EngineError::Fatal(format!(
                        "dimension drift for user {user_id}: recorded D_model={existing}, got {d_model}"
                    )))
                }
            }
        }
    }

    #[must_use]
    pub fn recorded_dimension(&self, user_id: &str) -> Option<i32> {
        self.recorded.get(user_id).map(|v| *v)
    }
}

impl Default for DimensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_records_dimension() {
        let reg = DimensionRegistry::new();
        reg.check_and_record("alice", 768).unwrap();
        assert_eq!(reg.recorded_dimension("alice"), Some(768));
    }

    #[test]
    fn agreeing_write_is_ok() {
        let reg = DimensionRegistry::new();
        reg.check_and_record("alice", 768).unwrap();
        assert!(reg.check_and_record("alice", 768).is_ok());
    }

    #[test]
    fn disagreeing_write_is_fatal() {
        let reg = DimensionRegistry::new();
        reg.check_and_record("alice", 768).unwrap();
        let err = reg.check_and_record("alice", 1536).unwrap_err();
        assert!(matches!(err, EngineError::Fatal(_)));
    }

    #[test]
    fn users_are_independent() {
        let reg = DimensionRegistry::new();
        reg.check_and_record("alice", 768).unwrap();
        assert!(reg.check_and_record("bob", 1536).is_ok());
    }
}
