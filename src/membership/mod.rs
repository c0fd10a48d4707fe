//! Membership & Role Module
//!
//! Drives role assignment from coordination-service group membership. Each
//! node registers an ephemeral sequentially-numbered name under the group
//! path; rank is the node's position in the lexicographically sorted listing
//! and is the sole source of truth for roles.
//!
//! ## Core Mechanisms
//! - **Rank 0 (Primary)**: Designates the rank-1 member (if any) as its
//!   backup and watches for children changes.
//! - **Rank > 0 (Backup)**: Syncs its full state from the first reachable
//!   predecessor, then watches that predecessor's node for deletion; its
//!   disappearance triggers re-evaluation and potential promotion.
//! - **Event loop**: Watches are one-shot; every firing re-enters the
//!   evaluation from scratch and reinstalls them.

pub mod watcher;

pub use watcher::MembershipWatcher;
