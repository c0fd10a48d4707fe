//! Replication Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) served to
//! clients and peers alike (PUT, GET, Replication, Dump).
//!
//! These structures are serialized via JSON and sent over HTTP; a primary uses
//! the same `replicate` endpoint to push writes to its backup that the
//! initial-sync path races against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- API Endpoints ---

/// Public endpoint for client write requests. Primary only.
pub const ENDPOINT_PUT: &str = "/put";
/// Public endpoint for client read requests. Primary only.
pub const ENDPOINT_GET: &str = "/get";
/// Internal endpoint for pushing a single write from a Primary to its Backup.
pub const ENDPOINT_REPLICATE: &str = "/replicate";
/// Internal endpoint for the full-state snapshot pull (initial sync).
pub const ENDPOINT_DUMP: &str = "/dump";

// --- Data Transfer Objects ---

/// Standard client request for writing data.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    /// The data key.
    pub key: String,
    /// The value to store, overwriting any previous value.
    pub value: String,
}

/// Payload pushed by the Primary to its Backup after a successful local write.
///
/// Also produced by the initial-sync server side when individual writes race
/// with the bulk dump; the receiving backup applies it unconditionally.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    /// The data key.
    pub key: String,
    /// The replicated value.
    pub value: String,
}

/// Standard acknowledgment for write operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    /// `false` means the request was rejected (e.g. this node is not the
    /// primary), never a replication failure; replication is best-effort.
    pub success: bool,
}

/// Standard response for data retrieval.
///
/// A missing key is returned as the empty string for backward-compatible
/// callers; absence is a normal outcome, not an error.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
}

/// Full-state snapshot returned by the dump endpoint.
///
/// Always a self-consistent copy of the mapping at the moment of the call.
#[derive(Debug, Serialize, Deserialize)]
pub struct DumpResponse {
    pub entries: HashMap<String, String>,
}
