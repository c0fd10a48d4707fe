use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;

use super::protocol::{
    DumpResponse, ENDPOINT_DUMP, ENDPOINT_REPLICATE, PutResponse, ReplicateRequest,
};

const RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound connection handling for a designated peer.
///
/// The pooled `reqwest::Client` is the connection cache: it keeps keep-alive
/// connections per destination and is reused across `replicate` calls.
/// [`ReplicationLink::invalidate`] swaps in a fresh client, dropping every
/// cached connection after a transport failure. The full-snapshot pull always
/// runs on a one-shot unshared client so the bulk transfer cannot be disturbed
/// by concurrent replicate traffic reusing a pooled connection.
pub struct ReplicationLink {
    pooled: RwLock<reqwest::Client>,
}

impl ReplicationLink {
    pub fn new() -> Self {
        Self {
            pooled: RwLock::new(reqwest::Client::new()),
        }
    }

    /// Drops the cached client and its pooled connections. Called after any
    /// transport failure so the next call reconnects from scratch.
    pub async fn invalidate(&self) {
        *self.pooled.write().await = reqwest::Client::new();
    }

    /// Pushes a single write to `addr` over the pooled client.
    pub async fn replicate(&self, addr: SocketAddr, key: &str, value: &str) -> Result<()> {
        let client = self.pooled.read().await.clone();
        let payload = ReplicateRequest {
            key: key.to_string(),
            value: value.to_string(),
        };

        let response = client
            .post(format!("http://{}{}", addr, ENDPOINT_REPLICATE))
            .json(&payload)
            .timeout(RPC_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("replicate failed: {}", response.status()));
        }
        let ack: PutResponse = response.json().await?;
        if !ack.success {
            return Err(anyhow::anyhow!("replicate rejected by peer"));
        }
        Ok(())
    }

    /// Pulls the full snapshot from `addr` over a fresh, unshared connection.
    pub async fn pull_dump(&self, addr: SocketAddr) -> Result<HashMap<String, String>> {
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{}{}", addr, ENDPOINT_DUMP))
            .timeout(RPC_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("dump failed: {}", response.status()));
        }
        let dump: DumpResponse = response.json().await?;
        Ok(dump.entries)
    }
}

impl Default for ReplicationLink {
    fn default() -> Self {
        Self::new()
    }
}
