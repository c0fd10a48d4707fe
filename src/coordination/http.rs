use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::oneshot;

use super::protocol::{
    ChildrenResponse, DataResponse, ENDPOINT_CHILDREN, ENDPOINT_DATA, ENDPOINT_HEARTBEAT_SUFFIX,
    ENDPOINT_REGISTER, ENDPOINT_SESSION, ENDPOINT_SYNC, ENDPOINT_WATCH_CHILDREN,
    ENDPOINT_WATCH_DELETE, RegisterRequest, RegisterResponse, SessionResponse,
};
use super::{CoordError, Coordinator};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one watch long-poll request may be outstanding. Slightly above the
/// server's poll window so an idle poll ends with the server's 204, not a
/// client timeout.
const WATCH_POLL_TIMEOUT: Duration = Duration::from_secs(35);

fn transport(e: reqwest::Error) -> CoordError {
    CoordError::Transport(e.to_string())
}

/// [`Coordinator`] backed by a `coordd` daemon.
///
/// `connect` opens a session and spawns a background heartbeat task; the
/// session, and with it every node registered through this client, dies when
/// the process stops heartbeating. Watches are long-poll tasks that fulfil the
/// one-shot receiver on the first event.
pub struct HttpCoordinator {
    base: String,
    client: reqwest::Client,
    session_id: String,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl HttpCoordinator {
    pub async fn connect(base_url: &str) -> Result<Self, CoordError> {
        let base = base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}{}", base, ENDPOINT_SESSION))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let session: SessionResponse = response.json().await.map_err(transport)?;

        tracing::info!(
            "coordination session {} opened against {}",
            session.session_id,
            base
        );

        let heartbeat = Self::spawn_heartbeat(
            &base,
            &client,
            &session.session_id,
            Duration::from_millis(session.ttl_ms.max(3) / 3),
        );
        Ok(Self {
            base,
            client,
            session_id: session.session_id,
            heartbeat,
        })
    }

    fn spawn_heartbeat(
        base: &str,
        client: &reqwest::Client,
        session_id: &str,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let url = format!(
            "{}{}/{}{}",
            base, ENDPOINT_SESSION, session_id, ENDPOINT_HEARTBEAT_SUFFIX
        );
        let client = client.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match client.post(&url).timeout(REQUEST_TIMEOUT).send().await {
                    Ok(response) if response.status() == reqwest::StatusCode::GONE => {
                        tracing::error!("coordination session expired server-side");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("heartbeat failed: {}", e);
                    }
                }
            }
        })
    }

    /// Long-polls `endpoint` for `path` until the watch fires, then fulfils
    /// the one-shot. 204 means the poll window elapsed idle; poll again.
    fn spawn_watch(&self, endpoint: &str, path: &str) -> oneshot::Receiver<()> {
        let url = format!("{}{}", self.base, endpoint);
        let path = path.to_string();
        let client = self.client.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                let result = client
                    .get(&url)
                    .query(&[("path", path.as_str())])
                    .timeout(WATCH_POLL_TIMEOUT)
                    .send()
                    .await;
                match result {
                    Ok(response) if response.status() == reqwest::StatusCode::OK => {
                        let _ = tx.send(());
                        return;
                    }
                    Ok(response) if response.status() == reqwest::StatusCode::NO_CONTENT => {}
                    Ok(response) => {
                        tracing::warn!("watch poll on {} answered {}", path, response.status());
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("watch poll on {} failed, retrying: {}", path, e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                if tx.is_closed() {
                    return;
                }
            }
        });
        rx
    }
}

impl Drop for HttpCoordinator {
    /// Dropping the client stops heartbeating; the server expires the session
    /// after the TTL, deleting this node's ephemeral registrations.
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn sync(&self) -> Result<(), CoordError> {
        self.client
            .post(format!("{}{}", self.base, ENDPOINT_SYNC))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn create_ephemeral_sequential(
        &self,
        group: &str,
        data: &str,
    ) -> Result<String, CoordError> {
        let payload = RegisterRequest {
            session_id: self.session_id.clone(),
            group: group.to_string(),
            data: data.to_string(),
        };
        let response = self
            .client
            .post(format!("{}{}", self.base, ENDPOINT_REGISTER))
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::GONE {
            return Err(CoordError::SessionExpired);
        }
        let created: RegisterResponse = response.json().await.map_err(transport)?;
        Ok(created.path)
    }

    async fn list_children(&self, group: &str) -> Result<Vec<String>, CoordError> {
        let response = self
            .client
            .get(format!("{}{}", self.base, ENDPOINT_CHILDREN))
            .query(&[("path", group)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let listing: ChildrenResponse = response.json().await.map_err(transport)?;
        Ok(listing.children)
    }

    async fn get_data(&self, path: &str) -> Result<String, CoordError> {
        let response = self
            .client
            .get(format!("{}{}", self.base, ENDPOINT_DATA))
            .query(&[("path", path)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CoordError::NotFound(path.to_string()));
        }
        let payload: DataResponse = response.json().await.map_err(transport)?;
        Ok(payload.data)
    }

    async fn watch_children(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError> {
        Ok(self.spawn_watch(ENDPOINT_WATCH_CHILDREN, path))
    }

    async fn watch_delete(&self, path: &str) -> Result<oneshot::Receiver<()>, CoordError> {
        Ok(self.spawn_watch(ENDPOINT_WATCH_DELETE, path))
    }
}
