use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{CoordError, Coordinator, SEQUENTIAL_PREFIX};

struct NodeEntry {
    data: String,
    session: u64,
}

#[derive(Default)]
struct HubState {
    /// Full path -> entry. BTreeMap keeps listings deterministic.
    nodes: BTreeMap<String, NodeEntry>,
    /// Per-group sequence counters for ephemeral-sequential names.
    counters: HashMap<String, u64>,
    child_watches: HashMap<String, Vec<oneshot::Sender<()>>>,
    delete_watches: HashMap<String, Vec<oneshot::Sender<()>>>,
    expired_sessions: HashSet<u64>,
    next_session: u64,
}

impl HubState {
    fn fire_child_watches(&mut self, group: &str) {
        if let Some(watchers) = self.child_watches.remove(group) {
            for sender in watchers {
                let _ = sender.send(());
            }
        }
    }

    fn fire_delete_watches(&mut self, path: &str) {
        if let Some(watchers) = self.delete_watches.remove(path) {
            for sender in watchers {
                let _ = sender.send(());
            }
        }
    }

    fn remove_node(&mut self, path: &str) {
        if self.nodes.remove(path).is_some() {
            self.fire_delete_watches(path);
            if let Some((group, _)) = path.rsplit_once('/') {
                self.fire_child_watches(group);
            }
        }
    }
}

/// In-process coordination service.
///
/// One hub is shared by all nodes of a test or single-process cluster; each
/// node talks to it through its own [`MemorySession`]. Expiring a session
/// removes its ephemeral nodes and fires the affected watches, which is how
/// tests simulate node death.
pub struct CoordinationHub {
    state: Arc<Mutex<HubState>>,
}

impl CoordinationHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Deletes a node regardless of its owning session, firing the affected
    /// watches. Covers the administrative removals a real coordination
    /// service allows.
    pub fn delete(&self, path: &str) {
        let mut state = self.state.lock().expect("hub lock poisoned");
        state.remove_node(path);
    }

    pub fn session(&self) -> MemorySession {
        let id = {
            let mut state = self.state.lock().expect("hub lock poisoned");
            state.next_session += 1;
            state.next_session
        };
        MemorySession {
            state: self.state.clone(),
            id,
        }
    }
}

impl Default for CoordinationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's session against a [`CoordinationHub`].
pub struct MemorySession {
    state: Arc<Mutex<HubState>>,
    id: u64,
}

impl MemorySession {
    /// Ends the session: every ephemeral node it created is deleted and the
    /// matching delete/children watches fire. Subsequent operations on this
    /// session fail with [`CoordError::SessionExpired`].
    pub fn expire(&self) {
        let mut state = self.state.lock().expect("hub lock poisoned");
        state.expired_sessions.insert(self.id);
        let owned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, entry)| entry.session == self.id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            state.remove_node(&path);
        }
    }

    fn check_alive(&self, state: &HubState) -> Result<(), CoordError> {
        if state.expired_sessions.contains(&self.id) {
            return Err(CoordError::SessionExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl Coordinator for MemorySession {
    async fn sync(&self) -> Result<(), CoordError> {
        // The hub is a single mutex-guarded state; every read is already
        // linearizable.
        let state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)
    }

    async fn create_ephemeral_sequential(
        &self,
        group: &str,
        data: &str,
    ) -> Result<String, CoordError> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)?;

        let seq = state.counters.entry(group.to_string()).or_insert(0);
        let name = format!("{}{:010}", SEQUENTIAL_PREFIX, *seq);
        *seq += 1;

        let path = format!("{}/{}", group, name);
        state.nodes.insert(
            path.clone(),
            NodeEntry {
                data: data.to_string(),
                session: self.id,
            },
        );
        state.fire_child_watches(group);
        Ok(path)
    }

    async fn list_children(&self, group: &str) -> Result<Vec<String>, CoordError> {
        let state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)?;

        let prefix = format!("{}/", group);
        Ok(state
            .nodes
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(|name| name.to_string())
            .collect())
    }

    async fn get_data(&self, path: &str) -> Result<String, CoordError> {
        let state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)?;

        state
            .nodes
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| CoordError::NotFound(path.to_string()))
    }

    async fn watch_children(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)?;

        let (tx, rx) = oneshot::channel();
        state
            .child_watches
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn watch_delete(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        self.check_alive(&state)?;

        let (tx, rx) = oneshot::channel();
        if state.nodes.contains_key(path) {
            state
                .delete_watches
                .entry(path.to_string())
                .or_default()
                .push(tx);
        } else {
            // Already gone; fire immediately so the caller re-evaluates.
            let _ = tx.send(());
        }
        Ok(rx)
    }
}
