// server.rs - Router and shared state for the challenge host
//
// One ChallengeController per (challenge, user) plays the part of an open
// browser tab. Clue timers keep running between requests and the discovery
// requests they fire come back to the public routes below. Tabs close when
// the challenge completes or resets, after sitting idle, or when the session
// cap forces out the least recently used one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::UserIdentity;
use crate::clues::{Beacon, ClueInjector, ClueTiming, HeadlessPage, HttpBeacon};
use crate::config::{AppConfig, StorageBackend};
use crate::controller::{ChallengeController, ChallengeState};
use crate::error::ApiError;
use crate::handlers::{protected, public};
use crate::middleware::identity_middleware;
use crate::progress::{FileStore, KeyValueStore, MemoryStore, ProgressStore};

/// An open challenge and the page its clues were injected into
pub struct Session {
    pub controller: ChallengeController,
    pub page: Arc<HeadlessPage>,
    last_seen: Instant,
}

type SessionKey = (String, String);

pub struct AppState {
    config: AppConfig,
    storage: Arc<dyn KeyValueStore>,
    beacon: Arc<dyn Beacon>,
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn KeyValueStore>, beacon: Arc<dyn Beacon>) -> Self {
        Self {
            config,
            storage,
            beacon,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Build the storage backend and discovery beacon the config asks for
    pub fn from_config(config: AppConfig) -> Self {
        let storage: Arc<dyn KeyValueStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File => Arc::new(FileStore::new(config.storage.data_dir.clone())),
        };
        let beacon = Arc::new(HttpBeacon::new(
            config.api.discovery_base_url(),
            Duration::from_millis(config.api.discovery_timeout_ms),
        ));
        Self::new(config, storage, beacon)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run `f` against the user's open session, opening it first if needed.
    ///
    /// A session is reopened when the identity headers change, so the step 5
    /// signature check always sees the current display name. A session whose
    /// challenge is completed is closed once `f` returns; its progress stays
    /// in storage.
    pub async fn with_session<R>(
        &self,
        challenge_id: &str,
        identity: &UserIdentity,
        f: impl FnOnce(&mut Session) -> Result<R, ApiError>,
    ) -> Result<R, ApiError> {
        let mut sessions = self.sessions.lock().await;
        let key = (challenge_id.to_string(), identity.id.clone());

        let stale = sessions
            .get(&key)
            .map(|s| s.controller.identity() != identity)
            .unwrap_or(false);
        if stale {
            // Drop first so the old controller retires its clues
            sessions.remove(&key);
        }

        if !sessions.contains_key(&key) {
            self.make_room(&mut sessions);
            let session = self.open_session(challenge_id, identity)?;
            sessions.insert(key.clone(), session);
        }

        let Some(session) = sessions.get_mut(&key) else {
            return Err(ApiError::internal_server_error("session vanished"));
        };
        session.last_seen = Instant::now();
        let result = f(session);

        if session.controller.state() == ChallengeState::Completed {
            tracing::debug!(challenge = %key.0, "closing completed session");
            sessions.remove(&key);
        }
        result
    }

    /// Close the user's session, retiring its clues. Progress is untouched.
    pub async fn close_session(&self, challenge_id: &str, identity: &UserIdentity) -> bool {
        let key = (challenge_id.to_string(), identity.id.clone());
        self.sessions.lock().await.remove(&key).is_some()
    }

    /// Drop idle sessions, then the least recently used ones while at the cap
    fn make_room(&self, sessions: &mut HashMap<SessionKey, Session>) {
        let idle = self.config.api.session_idle_timeout();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() < idle);

        let cap = self.config.api.max_sessions.max(1);
        while sessions.len() >= cap {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => sessions.remove(&key),
                None => break,
            };
        }

        let closed = before - sessions.len();
        if closed > 0 {
            tracing::debug!(closed, open = sessions.len(), "closed idle sessions");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let request_logging = state.config.api.enable_request_logging;

    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(discovery_routes())
        // Signed-in users only
        .merge(challenge_routes())
        .with_state(state)
        .layer(CorsLayer::permissive());

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Endpoints the injected clues talk to; no identity required
fn discovery_routes() -> Router<Arc<AppState>> {
    use public::discovery;

    Router::new()
        .route("/api/challenge/step3", post(discovery::step3_post))
        .route("/api/challenge/devtools/*user_hash", get(discovery::devtools_get))
        .route("/api/challenge/secret/*user_hash", get(discovery::secret_get))
}

fn challenge_routes() -> Router<Arc<AppState>> {
    use protected::challenge;

    Router::new()
        .route(
            "/api/challenges/:challenge_id",
            get(challenge::challenge_get).delete(challenge::challenge_delete),
        )
        .route("/api/challenges/:challenge_id/steps/:step", post(challenge::step_post))
        .route("/api/challenges/:challenge_id/devtools", get(challenge::devtools_get))
        .route("/api/challenges/:challenge_id/devtools/verify", post(challenge::verify_post))
        .route_layer(middleware::from_fn(identity_middleware))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Security Challenge",
            "version": version,
            "description": "Five-step browser security puzzle with per-user answers",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "challenge": "/api/challenges/:challenge_id (signed in)",
                "submit": "/api/challenges/:challenge_id/steps/:step (signed in)",
                "devtools": "/api/challenges/:challenge_id/devtools[/verify] (signed in)",
                "discovery": "/api/challenge/{step3,devtools/:hash,secret/:hash} (public)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();

    // Reading an absent key exercises the backend without touching progress
    match state.storage.get("__health") {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "storage": "ok",
                    "sessions": state.session_count().await,
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "storage unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "storage_error": e.to_string()
                }
            })),
        ),
    }
}
