use dashmap::DashSet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::link::ReplicationLink;
use crate::store::{KeyStore, StripeLocks};

/// Errors surfaced to RPC callers.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// `get`/`put` reached a node that is not the primary. The caller is
    /// expected to re-discover the current primary out-of-band and retry.
    #[error("not primary")]
    NotPrimary,
}

/// The node's replication state machine behind the RPC surface.
///
/// Role and backup designation are written only by the membership watcher
/// (plus the self-healing clear on replication failure) and read by every
/// request path. Writes to a single key are serialized by that key's stripe
/// lock, both on the `put` path and the `replicate` path.
pub struct ReplicaHandler {
    store: KeyStore,
    locks: StripeLocks,
    link: ReplicationLink,
    is_primary: AtomicBool,
    backup_addr: RwLock<Option<SocketAddr>>,
    incoming_sync: AtomicBool,
    keys_during_incoming_sync: DashSet<String>,
}

impl ReplicaHandler {
    pub fn new() -> Self {
        Self {
            store: KeyStore::new(),
            locks: StripeLocks::new(),
            link: ReplicationLink::new(),
            is_primary: AtomicBool::new(false),
            backup_addr: RwLock::new(None),
            incoming_sync: AtomicBool::new(false),
            keys_during_incoming_sync: DashSet::new(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary.load(Ordering::Acquire)
    }

    /// Set only by the membership watcher.
    pub fn set_primary(&self, primary: bool) {
        self.is_primary.store(primary, Ordering::Release);
    }

    pub async fn backup_addr(&self) -> Option<SocketAddr> {
        *self.backup_addr.read().await
    }

    /// Set or cleared by the membership watcher.
    pub async fn set_backup_addr(&self, addr: Option<SocketAddr>) {
        *self.backup_addr.write().await = addr;
    }

    /// Primary-only read. A missing key is a normal outcome; the RPC layer
    /// renders `None` as the empty string.
    pub fn get(&self, key: &str) -> Result<Option<String>, ReplicaError> {
        if !self.is_primary() {
            return Err(ReplicaError::NotPrimary);
        }
        Ok(self.store.get(key))
    }

    /// Primary-only write.
    ///
    /// The role is re-checked under the key lock: a demotion may land between
    /// the first check and the locked mutation. While a backup is designated
    /// the write is forwarded synchronously under the same lock; any transport
    /// failure drops the designation (standalone primary until the watcher
    /// re-designates one) without failing the client write.
    pub async fn put(&self, key: String, value: String) -> Result<(), ReplicaError> {
        if !self.is_primary() {
            return Err(ReplicaError::NotPrimary);
        }

        let _guard = self.locks.lock(&key).await;
        if !self.is_primary() {
            return Err(ReplicaError::NotPrimary);
        }

        let backup = *self.backup_addr.read().await;
        if let Some(addr) = backup {
            if let Err(e) = self.link.replicate(addr, &key, &value).await {
                tracing::warn!(
                    "replication to backup {} failed, dropping designation: {}",
                    addr,
                    e
                );
                self.link.invalidate().await;
                *self.backup_addr.write().await = None;
            }
        }

        self.store.put(key, value);
        Ok(())
    }

    /// Backup-side apply of a primary's write. No role check: a backup must
    /// accept these, and a primary never calls this on itself.
    ///
    /// While a full snapshot pull is in flight the key is recorded so the
    /// sync-apply pass knows this value is newer than the snapshot.
    pub async fn replicate(&self, key: String, value: String) {
        let _guard = self.locks.lock(&key).await;
        if self.incoming_sync.load(Ordering::Acquire) {
            self.keys_during_incoming_sync.insert(key.clone());
        }
        self.store.put(key, value);
    }

    /// Full snapshot copy. No role restriction: the primary serves a new
    /// backup's catch-up pull, a backup may serve debugging reads.
    pub fn dump(&self) -> HashMap<String, String> {
        self.store.dump()
    }

    /// Becoming-a-backup entry point, invoked by the membership watcher.
    ///
    /// Pulls the peer's full snapshot over a fresh connection, then applies
    /// every entry whose key was *not* concurrently written via `replicate`
    /// while the pull was in flight: for those keys the value already present
    /// is strictly newer than the snapshot and must win. No lock is held for
    /// the transfer itself; each entry is applied under its own stripe lock.
    pub async fn sync_from_primary(&self, addr: SocketAddr) -> anyhow::Result<()> {
        self.incoming_sync.store(true, Ordering::Release);
        self.keys_during_incoming_sync.clear();

        let snapshot = match self.link.pull_dump(addr).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.incoming_sync.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let total = snapshot.len();
        let mut applied = 0usize;
        for (key, value) in snapshot {
            let _guard = self.locks.lock(&key).await;
            if !self.keys_during_incoming_sync.contains(&key) {
                self.store.put(key, value);
                applied += 1;
            }
        }
        self.incoming_sync.store(false, Ordering::Release);

        tracing::info!(
            "initial sync from {} complete: {} of {} snapshot entries applied",
            addr,
            applied,
            total
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &KeyStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn begin_incoming_sync(&self) {
        self.incoming_sync.store(true, Ordering::Release);
        self.keys_during_incoming_sync.clear();
    }

    #[cfg(test)]
    pub(crate) async fn apply_snapshot(&self, snapshot: HashMap<String, String>) {
        for (key, value) in snapshot {
            let _guard = self.locks.lock(&key).await;
            if !self.keys_during_incoming_sync.contains(&key) {
                self.store.put(key, value);
            }
        }
        self.incoming_sync.store(false, Ordering::Release);
    }
}

impl Default for ReplicaHandler {
    fn default() -> Self {
        Self::new()
    }
}
