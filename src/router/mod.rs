//! Per-sender session router. Grounded on the teacher's locking discipline
//! (short lock for map lookup/insert, per-session work happens outside the
//! lock) rather than on any single teacher module — spec §4.4 and §9
//! deliberately keep `SessionHandle` a thin projection, with conversational
//! content staying the backend's concern.


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::events::InboundMessage;
use crate::errors::{GatewayError, Result};

/// The agent backend the router forwards inbound messages to. Out of scope
/// per spec §1; specified only by this interface.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn reply(&self, message: &InboundMessage, session_id: &str) -> anyhow::Result<String>;
}

struct Session {
    session_id: String,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    message_count: u64,
    /// Serializes concurrent `route` calls for this key onto one backend
    /// call at a time, per spec §5 "strict per-session serialization".
    lock: Arc<Mutex<()>>,
}

/// Read-only projection of a session handle, safe to hand to the admin
/// surface or tests without exposing the internal serialization lock.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionHandle {
    pub route_key: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub message_count: u64,
}

pub struct SessionRouter {
    backend: Arc<dyn Backend>,
    sessions: Mutex<HashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionRouter {
    pub fn new(backend: Arc<dyn Backend>, idle_timeout: Duration) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Looks up or lazily creates the session lock for `route_key`, without
    /// holding the map lock while the backend call runs.
    async fn session_lock(&self, route_key: &str) -> Arc<Mutex<()>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(route_key) {
            return session.lock.clone();
        }
        let lock = Arc::new(Mutex::new(()));
        sessions.insert(
            route_key.to_string(),
            Session {
                session_id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                last_active: Utc::now(),
                message_count: 0,
                lock: lock.clone(),
            },
        );
        lock
    }

    /// Forwards `message` to the backend under the route key's session,
    /// creating the session at-most-once if this is the first message for
    /// the key. Returns the backend's reply. On backend failure, updates
    /// `last_active` but not `message_count`, and returns `BackendFailure`
    /// without retrying, per spec §4.4 / §7.
    pub async fn route(&self, message: &InboundMessage) -> Result<String> {
        let route_key = message.route_key();
        let session_lock = self.session_lock(&route_key).await;

        // Hold the per-session guard for the duration of the backend call so
        // a second concurrent message for the same sender waits its turn
        // instead of racing the backend.
        let _guard = session_lock.lock().await;

        let session_id = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(&route_key)
                .map(|s| s.session_id.clone())
                .unwrap_or_default()
        };

        match self.backend.reply(message, &session_id).await {
            Ok(reply) => {
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(&route_key) {
                    session.last_active = Utc::now();
                    session.message_count += 1;
                }
                Ok(reply)
            }
            Err(e) => {
                warn!(route_key = %route_key, error = %e, "backend call failed");
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(&route_key) {
                    session.last_active = Utc::now();
                }
                Err(GatewayError::BackendFailure(e.to_string()))
            }
        }
    }

    /// Snapshot of every live session, keyed by route key.
    pub async fn active_sessions(&self) -> HashMap<String, SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(k, s)| {
                (
                    k.clone(),
                    SessionHandle {
                        route_key: k.clone(),
                        session_id: s.session_id.clone(),
                        created_at: s.created_at,
                        last_active: s.last_active,
                        message_count: s.message_count,
                    },
                )
            })
            .collect()
    }

    /// Destroys the session handle for `route_key`. Returns `true` if a
    /// session existed.
    pub async fn close_session(&self, route_key: &str) -> bool {
        self.sessions.lock().await.remove(route_key).is_some()
    }

    /// Closes every session whose `last_active` is older than the
    /// configured idle timeout. Never aborts an in-flight `route` call:
    /// closing only removes the map entry, which an in-flight call has
    /// already captured a clone of.
    pub async fn reap_idle(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.idle_timeout).unwrap_or_default();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active >= cutoff);
        let reaped = before - sessions.len();
        if reaped > 0 {
            debug!(reaped, "idle session sweep closed sessions");
        }
        reaped
    }

    /// Spawns a background task that calls `reap_idle` every `interval`
    /// until the returned handle is dropped/aborted.
    pub fn spawn_idle_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                router.reap_idle().await;
            }
        })
    }
}
