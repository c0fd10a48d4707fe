//! Coordination Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) spoken between
//! `coordd` and its clients: session lifecycle, ephemeral-sequential
//! registration, listings/reads, and long-poll watches.
//!
//! Node paths can contain slashes, so path-taking endpoints receive the path
//! as a query parameter rather than a URL segment.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Opens a session. Sessions die when heartbeats stop.
pub const ENDPOINT_SESSION: &str = "/session";
/// Keeps a session alive: `/session/:id/heartbeat`.
pub const ENDPOINT_HEARTBEAT_SUFFIX: &str = "/heartbeat";
/// Linearization barrier before a listing. A no-op round trip on `coordd`.
pub const ENDPOINT_SYNC: &str = "/sync";
/// Creates an ephemeral, sequentially-numbered node under a group.
pub const ENDPOINT_REGISTER: &str = "/register";
/// Lists a group's children (`?path=`).
pub const ENDPOINT_CHILDREN: &str = "/children";
/// Reads a node's data payload (`?path=`).
pub const ENDPOINT_DATA: &str = "/data";
/// Long-poll children watch (`?path=`): 200 when fired, 204 when the poll
/// window elapsed without an event.
pub const ENDPOINT_WATCH_CHILDREN: &str = "/watch/children";
/// Long-poll deletion watch (`?path=`), same response convention.
pub const ENDPOINT_WATCH_DELETE: &str = "/watch/delete";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Opaque session identifier to heartbeat and register with.
    pub session_id: String,
    /// Expiry window; clients heartbeat well inside it.
    pub ttl_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub session_id: String,
    /// Group path, e.g. `/kv`.
    pub group: String,
    /// This node's `host:port`.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Full path of the created node.
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChildrenResponse {
    pub children: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: String,
}

/// Query parameter carrying a node or group path.
#[derive(Debug, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: String,
}
