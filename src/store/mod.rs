//! Local Storage Module
//!
//! Implements the node's in-memory key-value state and the per-key locking
//! primitive the request handlers use to serialize writes.
//!
//! ## Core Concepts
//! - **KeyStore**: A concurrent `key -> value` map. `dump()` hands out a copied
//!   snapshot, never a live view.
//! - **Stripe Locks**: A fixed pool of mutexes selected by key hash. Operations
//!   on the same key are serialized; unrelated keys do not contend.

pub mod keystore;

pub use keystore::{KeyStore, StripeLocks};

#[cfg(test)]
mod tests;
