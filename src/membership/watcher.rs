use anyhow::Result;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::coordination::Coordinator;
use crate::replica::ReplicaHandler;

/// Registration-to-listing propagation lag tolerated before a missing self
/// entry becomes fatal.
const RELIST_DELAY: Duration = Duration::from_millis(100);

/// Why an evaluation was re-entered.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    ChildrenChanged,
    PredecessorDeleted,
}

/// The orchestrator of the node's role.
///
/// Owns all interaction with the coordination service. Watches are one-shot
/// `oneshot` receivers; short-lived tasks forward their firing into one event
/// channel, and the run loop re-evaluates from scratch on every event. This
/// replaces recursive watch-callback registration with an explicit state
/// machine whose re-registration stops cleanly at shutdown.
pub struct MembershipWatcher {
    coord: Arc<dyn Coordinator>,
    group: String,
    my_name: String,
    handler: Arc<ReplicaHandler>,
    events_tx: mpsc::Sender<Trigger>,
    events_rx: mpsc::Receiver<Trigger>,
    shutdown: Arc<Notify>,
    watched: Arc<RwLock<Option<String>>>,
}

impl MembershipWatcher {
    /// Registers this node in the group (ephemeral-sequential, data payload
    /// `host:port`) and prepares the watcher. Registration failure is fatal
    /// to the caller.
    pub async fn register(
        coord: Arc<dyn Coordinator>,
        group: String,
        advertise: SocketAddr,
    ) -> Result<(Self, Arc<ReplicaHandler>)> {
        let path = coord
            .create_ephemeral_sequential(&group, &advertise.to_string())
            .await?;
        let my_name = path
            .rsplit('/')
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        info!("registered in group {} as {}", group, my_name);

        let handler = Arc::new(ReplicaHandler::new());
        let (events_tx, events_rx) = mpsc::channel(16);
        let watcher = Self {
            coord,
            group,
            my_name,
            handler: handler.clone(),
            events_tx,
            events_rx,
            shutdown: Arc::new(Notify::new()),
            watched: Arc::new(RwLock::new(None)),
        };
        Ok((watcher, handler))
    }

    /// Notifying this handle ends the run loop; no further watches are
    /// installed.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Shared view of the predecessor path currently under a deletion watch.
    /// `None` while primary, or while no predecessor could be adopted.
    pub fn watched_predecessor_handle(&self) -> Arc<RwLock<Option<String>>> {
        self.watched.clone()
    }

    /// Evaluates once, then re-evaluates on every watch firing until shutdown.
    /// Returns `Err` only on fatal conditions (own registration not listed
    /// after the retry, coordination service unusable).
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.evaluate().await?;

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("membership watcher shutting down");
                    return Ok(());
                }
                trigger = self.events_rx.recv() => {
                    if let Some(trigger) = trigger {
                        debug!("re-evaluating after {:?}", trigger);
                    }
                }
            }
        }
    }

    async fn evaluate(&mut self) -> Result<()> {
        // The children watch is armed before the listing is read, so a
        // registration landing between the two still produces an event.
        self.install_children_watch().await?;
        let (children, my_index) = self.locate_self().await?;

        if my_index == 0 {
            self.assume_primary(&children).await
        } else {
            self.assume_backup(&children, my_index).await
        }
    }

    /// Fresh, consistent membership read: sync, list, sort, find self. A
    /// missing self entry is retried once after a short delay, then fatal.
    async fn locate_self(&self) -> Result<(Vec<String>, usize)> {
        self.coord.sync().await?;
        let mut children = self.coord.list_children(&self.group).await?;
        children.sort();

        let mut my_index = children.iter().position(|name| name == &self.my_name);
        if my_index.is_none() {
            tokio::time::sleep(RELIST_DELAY).await;
            self.coord.sync().await?;
            children = self.coord.list_children(&self.group).await?;
            children.sort();
            my_index = children.iter().position(|name| name == &self.my_name);
        }

        let my_index = my_index.ok_or_else(|| {
            anyhow::anyhow!(
                "own registration {} not listed under {}",
                self.my_name,
                self.group
            )
        })?;
        Ok((children, my_index))
    }

    async fn assume_primary(&self, children: &[String]) -> Result<()> {
        self.handler.set_primary(true);
        *self.watched.write().expect("watched lock poisoned") = None;

        if children.len() > 1 {
            let backup_path = format!("{}/{}", self.group, children[1]);
            match self.read_member_addr(&backup_path).await {
                Some(addr) => {
                    info!("primary: designated backup {}", addr);
                    self.handler.set_backup_addr(Some(addr)).await;
                }
                None => {
                    self.handler.set_backup_addr(None).await;
                }
            }
        } else {
            info!("primary: no backup available yet");
            self.handler.set_backup_addr(None).await;
        }
        Ok(())
    }

    async fn assume_backup(&self, children: &[String], my_index: usize) -> Result<()> {
        self.handler.set_primary(false);
        self.handler.set_backup_addr(None).await;
        info!("backup at rank {}", my_index);

        // Scan predecessors in rank order; the first one that both exposes an
        // address and serves a successful full sync is the adopted primary.
        let mut adopted: Option<String> = None;
        for candidate in &children[..my_index] {
            let candidate_path = format!("{}/{}", self.group, candidate);
            let Some(addr) = self.read_member_addr(&candidate_path).await else {
                continue;
            };

            match self.handler.sync_from_primary(addr).await {
                Ok(()) => {
                    info!("backup: synced full state from {} ({})", candidate, addr);
                    adopted = Some(candidate_path);
                    break;
                }
                Err(e) => {
                    warn!(
                        "backup: sync from {} ({}) failed, candidate presumed dead: {}",
                        candidate, addr, e
                    );
                }
            }
        }

        match adopted {
            Some(path) => {
                let receiver = self.coord.watch_delete(&path).await?;
                self.forward(receiver, Trigger::PredecessorDeleted);
                info!("backup: watching predecessor {}", path);
                *self.watched.write().expect("watched lock poisoned") = Some(path);
            }
            None => {
                warn!("backup: no predecessor reachable, keeping current state");
                *self.watched.write().expect("watched lock poisoned") = None;
            }
        }
        Ok(())
    }

    async fn read_member_addr(&self, path: &str) -> Option<SocketAddr> {
        let data = match self.coord.get_data(path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("could not read member metadata at {}: {}", path, e);
                return None;
            }
        };
        match data.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("malformed member address {:?} at {}: {}", data, path, e);
                None
            }
        }
    }

    async fn install_children_watch(&self) -> Result<()> {
        let receiver = self.coord.watch_children(&self.group).await?;
        self.forward(receiver, Trigger::ChildrenChanged);
        Ok(())
    }

    /// Forwards a one-shot watch firing into the event channel. A dropped
    /// sender (watch lost) forwards nothing.
    fn forward(&self, receiver: oneshot::Receiver<()>, trigger: Trigger) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            if receiver.await.is_ok() {
                let _ = tx.send(trigger).await;
            }
        });
    }
}
