//! Idempotence bookkeeping for at-least-once consumers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Insert-if-absent key set a consumer uses to skip work it already did.
///
/// At-least-once delivery means a handler can see the same message
/// twice. Handlers derive a natural key per unit of work and record it
/// here once the work is durably applied; a replay finds the key and
/// skips.
#[derive(Debug, Clone, Default)]
pub struct ProcessedRegistry {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl ProcessedRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key, returning `true` when it was not seen before.
    pub fn mark(&self, key: impl Into<String>) -> bool {
        self.keys.lock().unwrap().insert(key.into())
    }

    /// Whether a key was recorded already.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    /// Number of recorded keys.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    /// True when nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().unwrap().is_empty()
    }
}
