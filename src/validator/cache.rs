//! TTL-bounded verdict cache keyed by tool name and canonical arguments.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Above this many entries, inserting evicts everything older than one TTL.
pub const MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct VerdictCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl VerdictCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity_limit(ttl, MAX_ENTRIES)
    }

    pub fn with_capacity_limit(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// SHA-256 over the tool name and the sorted-key JSON of its arguments.
    pub fn key(tool_name: &str, arguments: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update(b":");
        hasher.update(canonical_json(arguments).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<bool> {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.get(key) {
            Some(entry) if now.saturating_duration_since(entry.stored_at) < self.ttl => {
                Some(entry.allowed)
            }
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert_at(&self, key: String, allowed: bool, now: Instant) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(
            key,
            CacheEntry {
                allowed,
                stored_at: now,
            },
        );
        if guard.len() > self.max_entries {
            let ttl = self.ttl;
            let before = guard.len();
            guard.retain(|_, entry| now.saturating_duration_since(entry.stored_at) < ttl);
            tracing::debug!(evicted = before - guard.len(), "verdict cache evicted stale entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
