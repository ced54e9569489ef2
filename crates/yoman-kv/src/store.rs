use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

use yoman_core::clock::Clock;
use yoman_core::{Result, YomanError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` means the key never expires (bug lists).
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct ListEntry {
    items: Vec<String>,
}

/// Concurrent in-process TTL store.
///
/// Expired entries are dropped lazily on access and swept opportunistically
/// by [`MemoryKv::purge_expired`]; correctness never depends on the sweep
/// having run.
pub struct MemoryKv {
    clock: Arc<dyn Clock>,
    entries: DashMap<String, Entry>,
    lists: DashMap<String, ListEntry>,
}

impl MemoryKv {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
            lists: DashMap::new(),
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match entry.expires_at {
            Some(at) => at > self.clock.now_utc(),
            None => true,
        }
    }

    /// Set `key` to a raw string value with an optional TTL.
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| self.clock.now_utc() + d);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Get a raw string value; expired keys read as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if self.is_live(&entry) {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    /// Serialize `value` as JSON under `key`.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl);
        Ok(())
    }

    /// Read and deserialize a JSON value. A corrupt blob reads as absent
    /// (and is removed) rather than poisoning the caller.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                trace!(%key, error = %e, "dropping undecodable kv blob");
                self.entries.remove(key);
                None
            }
        }
    }

    /// Set `key` only if absent (or expired). Returns `true` on acquisition.
    ///
    /// This is the mutual-exclusion primitive for per-sender single-flight
    /// and the dedup set.
    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let now = self.clock.now_utc();
        let mut acquired = false;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at.is_some_and(|at| at <= now) {
                    e.value = value.to_string();
                    e.expires_at = Some(now + ttl);
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                }
            });
        drop(entry);
        acquired
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Refresh the TTL on an existing live key. No-op when absent.
    pub fn touch(&self, key: &str, ttl: Duration) {
        let now = self.clock.now_utc();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.expires_at.is_none_or(|at| at > now) {
                entry.expires_at = Some(now + ttl);
            }
        }
    }

    /// Increment an integer counter, initializing it (with `ttl`) at zero.
    /// Returns the post-increment value. The TTL is set only on creation so
    /// the bucket window is fixed, not sliding.
    pub fn incr(&self, key: &str, ttl: Duration) -> i64 {
        let now = self.clock.now_utc();
        let mut result = 1;
        self.entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at.is_some_and(|at| at <= now) {
                    e.value = "1".to_string();
                    e.expires_at = Some(now + ttl);
                    result = 1;
                } else {
                    let current: i64 = e.value.parse().unwrap_or(0);
                    result = current + 1;
                    e.value = result.to_string();
                }
            })
            .or_insert_with(|| Entry {
                value: "1".to_string(),
                expires_at: Some(now + ttl),
            });
        result
    }

    /// Append to a persistent (no-TTL) list.
    pub fn push<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.lists
            .entry(key.to_string())
            .or_insert_with(|| ListEntry { items: Vec::new() })
            .items
            .push(raw);
        Ok(())
    }

    /// Read back a whole list.
    pub fn items<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        list.items
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(YomanError::from))
            .collect()
    }

    /// Drop every expired entry. Called from a periodic housekeeping task.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_utc();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        before - self.entries.len()
    }
}
