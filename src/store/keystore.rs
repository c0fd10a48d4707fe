use dashmap::DashMap;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// Number of mutexes in the stripe pool. Keys hash onto one of these, so
/// writers of unrelated keys almost never contend.
pub const NUM_STRIPES: usize = 128;

/// The node's in-memory data of record.
///
/// The map itself only guarantees safe concurrent access across different
/// keys; mutual exclusion for a *single* key is imposed by the caller holding
/// that key's [`StripeLocks`] guard. Created empty at process start, never
/// persisted; a restarted node rejoins empty and resynchronizes.
pub struct KeyStore {
    data: DashMap<String, String>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Unconditional overwrite.
    pub fn put(&self, key: String, value: String) {
        self.data.insert(key, value);
    }

    /// Copies the full mapping out. Each value is cloned under its shard lock,
    /// so a concurrent write never produces a torn value in the result.
    pub fn dump(&self) -> HashMap<String, String> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed pool of per-key mutexes.
///
/// Async mutexes because the guard is held across the synchronous replication
/// RPC to the backup: a slow backup stalls writers of the same stripe only.
pub struct StripeLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripeLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..NUM_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Locks the stripe owning `key`. All operations on the same key are
    /// serialized through this guard.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock().await
    }
}

impl Default for StripeLocks {
    fn default() -> Self {
        Self::new()
    }
}
