//! Storage Module Tests
//!
//! Validates the local store mechanics and the stripe lock pool.
//!
//! ## Test Scopes
//! - **KeyStore**: Put/Get/overwrite semantics and the snapshot-copy property
//!   of `dump()`.
//! - **StripeLocks**: Same-key serialization and cross-key independence.
//!
//! *Note: Replication and role enforcement are tested in the replica module.*

#[cfg(test)]
mod tests {
    use crate::store::{KeyStore, StripeLocks};
    use std::sync::Arc;
    use std::time::Duration;

    // ============================================================
    // KEYSTORE TESTS
    // ============================================================

    #[test]
    fn test_get_missing_key_is_none() {
        let store = KeyStore::new();
        assert_eq!(store.get("nope"), None);
    }

    #[test]
    fn test_put_then_get() {
        let store = KeyStore::new();
        store.put("x".to_string(), "1".to_string());
        assert_eq!(store.get("x"), Some("1".to_string()));
    }

    #[test]
    fn test_put_overwrites() {
        let store = KeyStore::new();
        store.put("x".to_string(), "1".to_string());
        store.put("x".to_string(), "2".to_string());
        assert_eq!(store.get("x"), Some("2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_dump_is_a_copy_not_a_view() {
        let store = KeyStore::new();
        store.put("a".to_string(), "1".to_string());

        let snapshot = store.dump();
        store.put("a".to_string(), "2".to_string());
        store.put("b".to_string(), "3".to_string());

        // The snapshot reflects the moment of the call.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a"), Some(&"1".to_string()));
        assert_eq!(store.get("a"), Some("2".to_string()));
    }

    #[test]
    fn test_dump_empty_store() {
        let store = KeyStore::new();
        assert!(store.dump().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_different_keys() {
        let store = Arc::new(KeyStore::new());

        let mut tasks = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put(format!("key_{}", i), format!("val_{}", i));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(), 64);
        for i in 0..64 {
            assert_eq!(store.get(&format!("key_{}", i)), Some(format!("val_{}", i)));
        }
    }

    // ============================================================
    // STRIPE LOCK TESTS
    // ============================================================

    #[tokio::test]
    async fn test_same_key_lock_is_exclusive() {
        let locks = Arc::new(StripeLocks::new());

        let guard = locks.lock("contended").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks2.lock("contended").await;
        });

        // The second locker must not get through while we hold the guard.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should proceed once the guard is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_lock_is_deterministic_per_key() {
        let locks = StripeLocks::new();

        // Holding a key's guard blocks a second lock of the *same* key, which
        // only works if the key maps onto one stable stripe.
        let _guard = locks.lock("stable").await;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), locks.lock("stable"))
                .await
                .is_err()
        );
    }
}
