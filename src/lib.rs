//! Replicated Key-Value Store Library
//!
//! This library crate defines the core modules that make up the replicated
//! store. It serves as the foundation for the node binary (`main.rs`) and the
//! development coordination daemon (`bin/coordd.rs`).
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`store`**: The node-local state layer. A concurrent in-memory
//!   key-value map plus the stripe-lock pool that serializes per-key writes.
//! - **`replica`**: The replication protocol. Role-gated request handling,
//!   synchronous replicate-on-write to the designated backup, and the
//!   full-state sync a new backup performs against its primary.
//! - **`membership`**: The failover orchestrator. Registers the node with the
//!   coordination service, derives its role from rank, and re-evaluates on
//!   every membership change.
//! - **`coordination`**: The consumed coordination-service contract, with an
//!   in-process implementation for tests and an HTTP daemon/client pair for
//!   real deployments.

pub mod coordination;
pub mod membership;
pub mod replica;
pub mod store;
