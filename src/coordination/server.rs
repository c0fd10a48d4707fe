use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::SEQUENTIAL_PREFIX;
use super::protocol::{
    ChildrenResponse, DataResponse, PathQuery, RegisterRequest, RegisterResponse, SessionResponse,
};

/// Default session expiry; clients heartbeat at a third of this.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(6);

/// How long a watch long-poll is held open before answering 204.
const POLL_WINDOW: Duration = Duration::from_secs(30);

struct NodeEntry {
    data: String,
    session_id: String,
}

#[derive(Default)]
struct Registry {
    nodes: BTreeMap<String, NodeEntry>,
    counters: HashMap<String, u64>,
    child_watches: HashMap<String, Vec<oneshot::Sender<()>>>,
    delete_watches: HashMap<String, Vec<oneshot::Sender<()>>>,
    sessions: HashMap<String, Instant>,
}

impl Registry {
    fn fire_child_watches(&mut self, group: &str) {
        if let Some(watchers) = self.child_watches.remove(group) {
            for sender in watchers {
                let _ = sender.send(());
            }
        }
    }

    fn remove_node(&mut self, path: &str) {
        if self.nodes.remove(path).is_some() {
            if let Some(watchers) = self.delete_watches.remove(path) {
                for sender in watchers {
                    let _ = sender.send(());
                }
            }
            if let Some((group, _)) = path.rsplit_once('/') {
                self.fire_child_watches(group);
            }
        }
    }
}

struct ServerState {
    registry: Mutex<Registry>,
    session_ttl: Duration,
}

impl ServerState {
    fn expire_dead_sessions(&self) {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        let now = Instant::now();
        let dead: Vec<String> = registry
            .sessions
            .iter()
            .filter(|(_, last_beat)| now.duration_since(**last_beat) > self.session_ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in dead {
            registry.sessions.remove(&session_id);
            let owned: Vec<String> = registry
                .nodes
                .iter()
                .filter(|(_, entry)| entry.session_id == session_id)
                .map(|(path, _)| path.clone())
                .collect();
            tracing::info!(
                "session {} expired, removing {} ephemeral node(s)",
                session_id,
                owned.len()
            );
            for path in owned {
                registry.remove_node(&path);
            }
        }
    }
}

/// The coordination daemon behind `coordd`.
///
/// A single process holding sessions, ephemeral-sequential nodes and long-poll
/// watches. Every request is answered against one mutex-guarded registry, so
/// reads are trivially linearizable and the `sync` endpoint is a bare round
/// trip. A background sweeper expires sessions whose heartbeats stopped,
/// deleting their nodes and firing the affected watches.
pub struct CoordServer {
    state: Arc<ServerState>,
}

impl CoordServer {
    pub fn new(session_ttl: Duration) -> Self {
        let state = Arc::new(ServerState {
            registry: Mutex::new(Registry::default()),
            session_ttl,
        });

        let sweeper: Weak<ServerState> = Arc::downgrade(&state);
        let sweep_every = session_ttl / 3;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            loop {
                interval.tick().await;
                let Some(state) = sweeper.upgrade() else {
                    break;
                };
                state.expire_dead_sessions();
            }
        });

        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/session", post(handle_create_session))
            .route("/session/:id/heartbeat", post(handle_heartbeat))
            .route("/sync", post(handle_sync))
            .route("/register", post(handle_register))
            .route("/children", get(handle_children))
            .route("/data", get(handle_data))
            .route("/watch/children", get(handle_watch_children))
            .route("/watch/delete", get(handle_watch_delete))
            .layer(Extension(self.state.clone()))
    }
}

async fn handle_create_session(
    Extension(state): Extension<Arc<ServerState>>,
) -> (StatusCode, Json<SessionResponse>) {
    let session_id = Uuid::new_v4().to_string();
    {
        let mut registry = state.registry.lock().expect("registry lock poisoned");
        registry.sessions.insert(session_id.clone(), Instant::now());
    }
    tracing::info!("session {} opened", session_id);
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id,
            ttl_ms: state.session_ttl.as_millis() as u64,
        }),
    )
}

async fn handle_heartbeat(
    Extension(state): Extension<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    let mut registry = state.registry.lock().expect("registry lock poisoned");
    match registry.sessions.get_mut(&session_id) {
        Some(last_beat) => {
            *last_beat = Instant::now();
            StatusCode::OK
        }
        None => StatusCode::GONE,
    }
}

async fn handle_sync() -> StatusCode {
    StatusCode::OK
}

async fn handle_register(
    Extension(state): Extension<Arc<ServerState>>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, Json<RegisterResponse>) {
    let mut registry = state.registry.lock().expect("registry lock poisoned");
    if !registry.sessions.contains_key(&req.session_id) {
        return (
            StatusCode::GONE,
            Json(RegisterResponse {
                path: String::new(),
            }),
        );
    }

    let seq = registry.counters.entry(req.group.clone()).or_insert(0);
    let name = format!("{}{:010}", SEQUENTIAL_PREFIX, *seq);
    *seq += 1;

    let path = format!("{}/{}", req.group, name);
    registry.nodes.insert(
        path.clone(),
        NodeEntry {
            data: req.data,
            session_id: req.session_id,
        },
    );
    registry.fire_child_watches(&req.group);
    tracing::info!("registered {}", path);

    (StatusCode::OK, Json(RegisterResponse { path }))
}

async fn handle_children(
    Extension(state): Extension<Arc<ServerState>>,
    Query(query): Query<PathQuery>,
) -> (StatusCode, Json<ChildrenResponse>) {
    let registry = state.registry.lock().expect("registry lock poisoned");
    let prefix = format!("{}/", query.path);
    let children = registry
        .nodes
        .keys()
        .filter_map(|path| path.strip_prefix(&prefix))
        .filter(|name| !name.contains('/'))
        .map(|name| name.to_string())
        .collect();
    (StatusCode::OK, Json(ChildrenResponse { children }))
}

async fn handle_data(
    Extension(state): Extension<Arc<ServerState>>,
    Query(query): Query<PathQuery>,
) -> (StatusCode, Json<DataResponse>) {
    let registry = state.registry.lock().expect("registry lock poisoned");
    match registry.nodes.get(&query.path) {
        Some(entry) => (
            StatusCode::OK,
            Json(DataResponse {
                data: entry.data.clone(),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(DataResponse {
                data: String::new(),
            }),
        ),
    }
}

async fn handle_watch_children(
    Extension(state): Extension<Arc<ServerState>>,
    Query(query): Query<PathQuery>,
) -> StatusCode {
    let receiver = {
        let mut registry = state.registry.lock().expect("registry lock poisoned");
        let (tx, rx) = oneshot::channel();
        registry.child_watches.entry(query.path).or_default().push(tx);
        rx
    };

    match tokio::time::timeout(POLL_WINDOW, receiver).await {
        Ok(Ok(())) => StatusCode::OK,
        _ => StatusCode::NO_CONTENT,
    }
}

async fn handle_watch_delete(
    Extension(state): Extension<Arc<ServerState>>,
    Query(query): Query<PathQuery>,
) -> StatusCode {
    let receiver = {
        let mut registry = state.registry.lock().expect("registry lock poisoned");
        if !registry.nodes.contains_key(&query.path) {
            // Already gone; report the deletion right away.
            return StatusCode::OK;
        }
        let (tx, rx) = oneshot::channel();
        registry
            .delete_watches
            .entry(query.path)
            .or_default()
            .push(tx);
        rx
    };

    match tokio::time::timeout(POLL_WINDOW, receiver).await {
        Ok(Ok(())) => StatusCode::OK,
        _ => StatusCode::NO_CONTENT,
    }
}
