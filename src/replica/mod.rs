//! Replication Module
//!
//! Implements the primary/backup replication protocol over the node's RPC
//! surface.
//!
//! ## Core Concepts
//! - **Roles**: The rank-0 member is the Primary and the sole acceptor of
//!   `get`/`put`; every other member is a Backup and accepts only
//!   `replicate`/`dump`.
//! - **Replicate-on-write**: The primary forwards every accepted `put` to its
//!   designated backup synchronously, under the key's stripe lock. A transport
//!   failure degrades the node to a standalone primary instead of failing the
//!   client write.
//! - **Full sync**: A node becoming a backup pulls the primary's full snapshot
//!   and merges it against writes that raced in via `replicate` meanwhile.

pub mod handler;
pub mod handlers;
pub mod link;
pub mod protocol;

pub use handler::{ReplicaError, ReplicaHandler};
pub use link::ReplicationLink;

#[cfg(test)]
mod tests;
