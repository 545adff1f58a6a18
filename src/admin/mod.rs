//! Admin control surface: an HTTP endpoint set over the daemon's live
//! components, gated by a bearer token, per spec §4.8. Grounded on the
//! teacher's `gateway/mod.rs` axum router construction (`build_router` +
//! `with_state`) generalized with a bearer-auth middleware layer the
//! teacher's HTTP API doesn't need (it has no admin concept).


use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::schema::AgentConfig;
use crate::daemon::GatewayDaemon;
use crate::pairing::AuthStatus;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

#[derive(Clone)]
pub struct AdminState {
    daemon: Arc<GatewayDaemon>,
    token: Arc<str>,
    agents: Arc<HashMap<String, AgentConfig>>,
    started_at: DateTime<Utc>,
}

impl AdminState {
    pub fn new(daemon: Arc<GatewayDaemon>, token: String, agents: HashMap<String, AgentConfig>) -> Self {
        Self {
            daemon,
            token: Arc::from(token.as_str()),
            agents: Arc::new(agents),
            started_at: Utc::now(),
        }
    }
}

/// Builds the admin router. Callers must not mount this at all unless
/// `admin.enabled && !token.is_empty()` holds — an unreachable route then
/// returns 404 from the outer server, not 401, satisfying the fail-closed
/// requirement in spec §4.8.
pub fn build_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/", get(dashboard_handler))
        .route("/admin/api/sessions", get(sessions_handler))
        .route("/admin/api/sessions/{key}", delete(close_session_handler))
        .route("/admin/api/channels", get(channels_handler))
        .route("/admin/api/senders", get(senders_handler))
        .route("/admin/api/senders/{id}/block", post(block_sender_handler))
        .route("/admin/api/senders/{id}/unblock", post(unblock_sender_handler))
        .route("/admin/api/cron", get(cron_handler))
        .route("/admin/api/usage", get(usage_handler))
        .route("/admin/api/agents", get(agents_handler))
        .route("/admin/api/canvas", get(canvas_handler))
        .route("/admin/ws", get(canvas_ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .with_state(state)
}

/// Rejects any request whose `Authorization` header doesn't carry
/// `Bearer <token>` matching the configured admin token exactly (constant
/// time), per spec §4.8.
async fn require_bearer_token(
    State(state): State<AdminState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = provided.is_some_and(|p| {
        p.as_bytes().ct_eq(state.token.as_bytes()).into()
    });

    if !authorized {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response
            .headers_mut()
            .insert(axum::http::header::WWW_AUTHENTICATE, "Bearer".parse().unwrap());
        return response;
    }

    next.run(request).await
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Serialize)]
struct SessionView {
    route_key: String,
    session_id: String,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    message_count: u64,
}

async fn sessions_handler(State(state): State<AdminState>) -> Json<Vec<SessionView>> {
    let sessions = state.daemon.router().active_sessions().await;
    let mut views: Vec<SessionView> = sessions
        .into_values()
        .map(|h| SessionView {
            route_key: h.route_key,
            session_id: h.session_id,
            created_at: h.created_at,
            last_active: h.last_active,
            message_count: h.message_count,
        })
        .collect();
    views.sort_by(|a, b| a.route_key.cmp(&b.route_key));
    Json(views)
}

async fn close_session_handler(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Response {
    if state.daemon.router().close_session(&key).await {
        Json(serde_json::json!({"status": "closed"})).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no such session"}))).into_response()
    }
}

#[derive(Serialize)]
struct ChannelView {
    name: String,
    #[serde(rename = "type")]
    channel_type: String,
    is_running: bool,
}

async fn channels_handler(State(state): State<AdminState>) -> Json<Vec<ChannelView>> {
    let views = state
        .daemon
        .channels()
        .adapters()
        .iter()
        .map(|a| ChannelView {
            name: a.name().to_string(),
            channel_type: a.channel_type().to_string(),
            is_running: a.is_running(),
        })
        .collect();
    Json(views)
}

async fn senders_handler(State(state): State<AdminState>) -> Json<Vec<crate::pairing::SenderRecord>> {
    Json(state.daemon.pairing().get_all_senders(None))
}

/// Body for `POST /admin/api/senders/{id}/block` and `.../unblock`, per spec
/// §4.8's route table ("body supplies channel").
#[derive(Deserialize)]
struct SenderActionBody {
    channel: String,
}

/// Pulls `channel` out of the JSON body, returning a `BadRequest` (§7: `400`
/// with `{error: "<message>"}`) on a missing or malformed body instead of
/// axum's default plain-text rejection.
fn sender_action_channel(body: Result<Json<SenderActionBody>, JsonRejection>) -> Result<String, Response> {
    match body {
        Ok(Json(body)) => Ok(body.channel),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response()),
    }
}

async fn block_sender_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    body: Result<Json<SenderActionBody>, JsonRejection>,
) -> Response {
    let channel = match sender_action_channel(body) {
        Ok(channel) => channel,
        Err(resp) => return resp,
    };
    match state.daemon.pairing().block_sender(&id, &channel) {
        Ok(()) => Json(serde_json::json!({"status": "blocked"})).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()}))).into_response(),
    }
}

async fn unblock_sender_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    body: Result<Json<SenderActionBody>, JsonRejection>,
) -> Response {
    let channel = match sender_action_channel(body) {
        Ok(channel) => channel,
        Err(resp) => return resp,
    };
    match state.daemon.pairing().unblock_sender(&id, &channel) {
        Ok(()) => Json(serde_json::json!({"status": "unblocked"})).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()}))).into_response(),
    }
}

#[derive(Serialize)]
struct CronView {
    jobs: Vec<crate::cron::ScheduledJob>,
    recent_heartbeats: Vec<crate::cron::HeartbeatRecord>,
}

const RECENT_HEARTBEATS_LIMIT: usize = 20;

async fn cron_handler(State(state): State<AdminState>) -> Json<CronView> {
    Json(CronView {
        jobs: state.daemon.scheduler().list_jobs().await,
        recent_heartbeats: state.daemon.heartbeat().history(RECENT_HEARTBEATS_LIMIT).await,
    })
}

#[derive(Serialize)]
struct UsageView {
    uptime_seconds: i64,
    total_messages: u64,
    session_count: usize,
    senders_pending: usize,
    senders_approved: usize,
    senders_blocked: usize,
    channel_count: usize,
    channels_running: usize,
}

async fn usage_handler(State(state): State<AdminState>) -> Json<UsageView> {
    let senders = state.daemon.pairing().get_all_senders(None);
    let channels = state.daemon.channels().adapters();
    let sessions = state.daemon.router().active_sessions().await;

    Json(UsageView {
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        total_messages: senders.iter().map(|s| s.message_count).sum(),
        session_count: sessions.len(),
        senders_pending: senders.iter().filter(|s| s.status == AuthStatus::Pending).count(),
        senders_approved: senders.iter().filter(|s| s.status == AuthStatus::Approved).count(),
        senders_blocked: senders.iter().filter(|s| s.status == AuthStatus::Blocked).count(),
        channel_count: channels.len(),
        channels_running: channels.iter().filter(|a| a.is_running()).count(),
    })
}

async fn agents_handler(State(state): State<AdminState>) -> Json<HashMap<String, AgentConfig>> {
    Json((*state.agents).clone())
}

async fn canvas_handler(State(state): State<AdminState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "items": state.daemon.display().canvas_state().snapshot() }))
}

/// Upgrades to a WebSocket and pushes `{type:"update", item: ...}` frames as
/// the display router's canvas state changes, per spec §6 / §10.
async fn canvas_ws_handler(State(state): State<AdminState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| canvas_ws_loop(socket, state))
}

async fn canvas_ws_loop(mut socket: WebSocket, state: AdminState) {
    let mut updates = state.daemon.display().canvas_state().subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => {
                let item = match update {
                    Ok(item) => item,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "admin canvas ws subscriber lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let mut frame = serde_json::to_value(&item).unwrap_or_default();
                if let Some(obj) = frame.as_object_mut() {
                    obj.insert("type".to_string(), serde_json::json!("update"));
                }
                if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
