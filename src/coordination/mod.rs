//! Coordination Service Module
//!
//! The external coordination service is consumed strictly through the
//! [`Coordinator`] contract: ephemeral sequentially-numbered registration
//! under a group path, sorted children listing behind an explicit `sync`,
//! metadata reads, and one-shot watches for children changes and node
//! deletion. Its internal consensus/storage mechanics stay a black box.
//!
//! ## Implementations
//! - **`memory`**: An in-process hub with explicit session expiry. Backs the
//!   module tests and single-process clusters.
//! - **`http` + `server`**: A small coordination daemon (`coordd`) with
//!   heartbeat-based sessions and long-poll watches, plus the matching client.
//!   This is the deployable stand-in; a ZooKeeper/etcd-backed client would
//!   plug in at the same trait.

pub mod http;
pub mod memory;
pub mod protocol;
pub mod server;

pub use http::HttpCoordinator;
pub use memory::{CoordinationHub, MemorySession};
pub use server::CoordServer;

use async_trait::async_trait;
use tokio::sync::oneshot;

/// Prefix for the sequentially-numbered registration names. Rank is the
/// lexicographic order of these names and nothing else, so the sequence
/// number is zero-padded to a fixed width.
pub const SEQUENTIAL_PREFIX: &str = "n_";

/// Errors from the coordination service.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("coordination node not found: {0}")]
    NotFound(String),

    #[error("coordination session expired")]
    SessionExpired,

    #[error("coordination transport: {0}")]
    Transport(String),
}

/// The coordination-service contract this system consumes.
///
/// Watches are one-shot: the returned receiver fires at most once and a new
/// watch must be installed for the next event. A dropped sender (service gone,
/// watch lost) surfaces as a receive error, never as a spurious event.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Forces a consistent view before a subsequent listing, so role decisions
    /// never act on stale cached membership.
    async fn sync(&self) -> Result<(), CoordError>;

    /// Creates an ephemeral, sequentially-numbered child under `group` holding
    /// `data` (this node's `host:port`). Returns the full path of the created
    /// node. The node disappears when this session dies.
    async fn create_ephemeral_sequential(
        &self,
        group: &str,
        data: &str,
    ) -> Result<String, CoordError>;

    /// Lists the names of `group`'s children. Order is unspecified; callers
    /// sort.
    async fn list_children(&self, group: &str) -> Result<Vec<String>, CoordError>;

    /// Reads the data payload of the node at `path`.
    async fn get_data(&self, path: &str) -> Result<String, CoordError>;

    /// Installs a one-shot watch firing on any change to `path`'s children.
    async fn watch_children(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError>;

    /// Installs a one-shot watch firing when the node at `path` is deleted.
    /// Fires immediately if the node is already gone.
    async fn watch_delete(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError>;
}
