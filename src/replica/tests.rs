//! Replication Module Tests
//!
//! Validates the request contract and the replication protocol itself.
//!
//! ## Test Scopes
//! - **Role enforcement**: `get`/`put` rejected on a backup, accepted on the
//!   primary; `replicate`/`dump` accepted everywhere.
//! - **Replicate-on-write**: Forwarding to a live backup, and the
//!   degrade-to-standalone path when the backup is unreachable.
//! - **Full sync**: Snapshot pull over HTTP and the raced-key merge rule.
//!
//! *Note: Role transitions driven by membership are tested in the membership
//! module.*

#[cfg(test)]
mod tests {
    use crate::replica::handler::{ReplicaError, ReplicaHandler};
    use crate::replica::handlers;
    use crate::replica::protocol::{GetResponse, PutRequest, PutResponse};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    /// Serves a handler's RPC surface on an ephemeral port.
    async fn serve(handler: Arc<ReplicaHandler>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, handlers::router(handler)).await.unwrap();
        });
        addr
    }

    // ============================================================
    // ROLE ENFORCEMENT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_backup_rejects_get_and_put() {
        let handler = ReplicaHandler::new();
        assert!(!handler.is_primary());

        assert!(matches!(handler.get("x"), Err(ReplicaError::NotPrimary)));
        assert!(matches!(
            handler.put("x".to_string(), "1".to_string()).await,
            Err(ReplicaError::NotPrimary)
        ));
    }

    #[tokio::test]
    async fn test_primary_get_missing_key_is_empty_sentinel() {
        let handler = ReplicaHandler::new();
        handler.set_primary(true);

        assert_eq!(handler.get("never_written").unwrap(), None);
    }

    #[tokio::test]
    async fn test_standalone_primary_read_your_write() {
        let handler = ReplicaHandler::new();
        handler.set_primary(true);

        handler.put("x".to_string(), "1".to_string()).await.unwrap();
        assert_eq!(handler.get("x").unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_replicate_accepted_regardless_of_role() {
        let handler = ReplicaHandler::new();
        handler.replicate("k".to_string(), "v".to_string()).await;
        assert_eq!(handler.store().get("k"), Some("v".to_string()));

        handler.set_primary(true);
        handler.replicate("k2".to_string(), "v2".to_string()).await;
        assert_eq!(handler.store().get("k2"), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_replicate_is_idempotent() {
        let handler = ReplicaHandler::new();
        handler.replicate("k".to_string(), "v".to_string()).await;
        handler.replicate("k".to_string(), "v".to_string()).await;

        assert_eq!(handler.store().get("k"), Some("v".to_string()));
        assert_eq!(handler.dump().len(), 1);
    }

    #[tokio::test]
    async fn test_dump_served_by_both_roles() {
        let handler = ReplicaHandler::new();
        handler.replicate("k".to_string(), "v".to_string()).await;

        assert_eq!(handler.dump().get("k"), Some(&"v".to_string()));
        handler.set_primary(true);
        assert_eq!(handler.dump().get("k"), Some(&"v".to_string()));
    }

    // ============================================================
    // REPLICATE-ON-WRITE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_put_forwards_to_live_backup() {
        let backup = Arc::new(ReplicaHandler::new());
        let backup_addr = serve(backup.clone()).await;

        let primary = ReplicaHandler::new();
        primary.set_primary(true);
        primary.set_backup_addr(Some(backup_addr)).await;

        primary.put("x".to_string(), "1".to_string()).await.unwrap();

        // The forward is synchronous, so the backup already has the write.
        assert_eq!(backup.store().get("x"), Some("1".to_string()));
        assert_eq!(primary.backup_addr().await, Some(backup_addr));
    }

    #[tokio::test]
    async fn test_put_succeeds_despite_dead_backup_and_degrades() {
        let primary = ReplicaHandler::new();
        primary.set_primary(true);

        // Grab a port with no listener behind it.
        let dead_addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        primary.set_backup_addr(Some(dead_addr)).await;

        primary.put("x".to_string(), "1".to_string()).await.unwrap();

        assert_eq!(primary.get("x").unwrap(), Some("1".to_string()));
        // Degraded to standalone primary until a backup is re-designated.
        assert_eq!(primary.backup_addr().await, None);
    }

    // ============================================================
    // FULL SYNC TESTS
    // ============================================================

    #[tokio::test]
    async fn test_sync_pulls_full_snapshot_over_http() {
        let primary = Arc::new(ReplicaHandler::new());
        primary.set_primary(true);
        for i in 0..50 {
            primary
                .put(format!("key_{}", i), format!("val_{}", i))
                .await
                .unwrap();
        }
        let primary_addr = serve(primary.clone()).await;

        let backup = ReplicaHandler::new();
        backup.sync_from_primary(primary_addr).await.unwrap();

        assert_eq!(backup.dump().len(), 50);
        assert_eq!(backup.store().get("key_7"), Some("val_7".to_string()));
    }

    #[tokio::test]
    async fn test_sync_fails_against_unreachable_peer() {
        let dead_addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let backup = ReplicaHandler::new();
        assert!(backup.sync_from_primary(dead_addr).await.is_err());

        // A failed pull must not leave replicate marking keys forever.
        backup.replicate("k".to_string(), "v1".to_string()).await;
        backup
            .apply_snapshot(HashMap::from([("k".to_string(), "v0".to_string())]))
            .await;
        assert_eq!(backup.store().get("k"), Some("v0".to_string()));
    }

    #[tokio::test]
    async fn test_raced_replicate_beats_stale_snapshot_value() {
        let backup = ReplicaHandler::new();

        // Sync starts; the snapshot on the wire carries the stale (k, v0).
        backup.begin_incoming_sync();

        // A write forwarded after the snapshot was taken lands first.
        backup.replicate("k".to_string(), "v1".to_string()).await;

        // The stale snapshot entry must be discarded; unraced keys apply.
        backup
            .apply_snapshot(HashMap::from([
                ("k".to_string(), "v0".to_string()),
                ("quiet".to_string(), "q".to_string()),
            ]))
            .await;

        assert_eq!(backup.store().get("k"), Some("v1".to_string()));
        assert_eq!(backup.store().get("quiet"), Some("q".to_string()));
    }

    #[tokio::test]
    async fn test_marker_set_resets_between_syncs() {
        let backup = ReplicaHandler::new();

        backup.begin_incoming_sync();
        backup.replicate("k".to_string(), "v1".to_string()).await;
        backup.apply_snapshot(HashMap::new()).await;

        // A later sync must not treat k as raced anymore.
        backup.begin_incoming_sync();
        backup
            .apply_snapshot(HashMap::from([("k".to_string(), "v2".to_string())]))
            .await;
        assert_eq!(backup.store().get("k"), Some("v2".to_string()));
    }

    // ============================================================
    // RPC SURFACE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_http_surface_roundtrip_and_rejection() {
        let handler = Arc::new(ReplicaHandler::new());
        let addr = serve(handler.clone()).await;
        let client = reqwest::Client::new();

        // Backup role: put rejected with 409.
        let response = client
            .post(format!("http://{}/put", addr))
            .json(&PutRequest {
                key: "x".to_string(),
                value: "1".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
        let ack: PutResponse = response.json().await.unwrap();
        assert!(!ack.success);

        // Promote and retry.
        handler.set_primary(true);
        let response = client
            .post(format!("http://{}/put", addr))
            .json(&PutRequest {
                key: "x".to_string(),
                value: "1".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let response = client
            .get(format!("http://{}/get/x", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let get: GetResponse = response.json().await.unwrap();
        assert_eq!(get.value, "1");

        // Missing key reads as the empty string.
        let get: GetResponse = client
            .get(format!("http://{}/get/missing", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(get.value, "");
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_wire_field_names_are_stable() {
        // Peers match on these exact field names; a rename is a protocol break.
        let put = serde_json::to_string(&PutRequest {
            key: "k".to_string(),
            value: "v".to_string(),
        })
        .unwrap();
        assert_eq!(put, r#"{"key":"k","value":"v"}"#);

        let ack: PutResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!ack.success);

        let get: GetResponse = serde_json::from_str(r#"{"value":""}"#).unwrap();
        assert_eq!(get.value, "");
    }
}
