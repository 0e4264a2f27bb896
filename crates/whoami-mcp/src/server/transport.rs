//! HTTP transport.
//!
//! Public routes:
//! - `GET /health`
//! - `GET /.well-known/oauth-authorization-server` (discovered issuer metadata)
//! - `GET /.well-known/oauth-protected-resource` (RFC 9728)
//!
//! Routes behind the bearer-auth middleware:
//! - `POST /mcp`: JSON-RPC with the response inline
//! - `GET /sse` + `POST /messages/`: legacy SSE transport

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::jsonrpc::{self, JsonRpcRequest};
use super::session::{BufferedEvent, Session, SessionManager};
use crate::auth::metadata::OAUTH_WELL_KNOWN;
use crate::auth::middleware::require_bearer;
use crate::auth::{AuthInfo, AuthorizationServerMetadata, BearerAuth, TokenVerifier};
use crate::config::Config;
use crate::tools::{McpTool, ToolContext};

/// Well-known path of the protected-resource metadata document.
pub const PROTECTED_RESOURCE_WELL_KNOWN: &str = "/.well-known/oauth-protected-resource";

/// Query parameters naming an SSE session.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(alias = "sessionId")]
    session_id: Option<String>,
}

/// Shared state for HTTP handlers. Read-only apart from the session table.
pub struct HttpState {
    pub tools: Vec<Box<dyn McpTool>>,
    pub sessions: Arc<SessionManager>,
    /// Metadata discovered from the issuer at startup.
    pub metadata: AuthorizationServerMetadata,
    pub issuer: String,
    /// Public URL of this server.
    pub base_url: Option<String>,
    pub required_scopes: Vec<String>,
}

/// Create the HTTP router.
pub fn create_router(
    tools: Vec<Box<dyn McpTool>>,
    config: &Config,
    metadata: AuthorizationServerMetadata,
    verifier: Arc<dyn TokenVerifier>,
) -> Router {
    let sessions = Arc::new(SessionManager::new());
    Arc::clone(&sessions).start_cleanup_task();

    let bearer = Arc::new(
        BearerAuth::new(verifier, config.issuer.clone())
            .required_scopes(config.required_scopes.clone())
            .resource_metadata_url(config.resource_metadata_url()),
    );

    let state = Arc::new(HttpState {
        tools,
        sessions,
        metadata,
        issuer: config.issuer.clone(),
        base_url: config.base_url.clone(),
        required_scopes: config.required_scopes.clone(),
    });

    let protected = Router::new()
        .route("/mcp", post(handle_mcp_post))
        .route("/sse", get(handle_sse))
        .route("/messages", post(handle_message_post))
        .route("/messages/", post(handle_message_post))
        .route_layer(middleware::from_fn_with_state(bearer, require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .route(OAUTH_WELL_KNOWN, get(handle_auth_server_metadata))
        .route(PROTECTED_RESOURCE_WELL_KNOWN, get(handle_protected_resource))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let sessions = state.sessions.session_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "whoami-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": state.tools.len(),
        "sessions": sessions
    }))
}

/// `GET /.well-known/oauth-authorization-server`
///
/// Serves the issuer's metadata as discovered at startup.
async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.metadata.clone())
}

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients which authorization server issues tokens for this resource.
/// Only available when the public base URL is configured.
async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> Response {
    let Some(ref base_url) = state.base_url else {
        return (StatusCode::NOT_FOUND, "Protected resource metadata not configured")
            .into_response();
    };

    Json(serde_json::json!({
        "resource": base_url.trim_end_matches('/'),
        "authorization_servers": [state.issuer],
        "bearer_methods_supported": ["header"],
        "scopes_supported": state.required_scopes
    }))
    .into_response()
}

fn tool_context(auth: Option<Extension<Arc<AuthInfo>>>) -> ToolContext {
    auth.map_or_else(ToolContext::anonymous, |Extension(info)| ToolContext::authenticated(info))
}

/// `POST /mcp`
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    auth: Option<Extension<Arc<AuthInfo>>>,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    let ctx = tool_context(auth);

    match jsonrpc::handle_request(&req, &state.tools, &ctx).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `GET /sse`
///
/// Opens a new session, or resumes `?session_id=` replaying events after
/// `Last-Event-ID`.
async fn handle_sse(
    State(state): State<Arc<HttpState>>,
    auth: Option<Extension<Arc<AuthInfo>>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Response {
    let owner = auth.as_ref().map(|Extension(info)| info.owner_key());

    let last_event_id: u64 = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let session = match query.session_id.as_deref() {
        Some(id) => match state.sessions.get_session(id).await {
            Some(session) if session.is_owned_by(owner.as_deref()) => {
                session.touch().await;
                session
            }
            _ => return (StatusCode::NOT_FOUND, "Unknown session").into_response(),
        },
        None => {
            let session = state.sessions.create_session(owner).await;
            let endpoint = format!("/messages/?session_id={}", session.id);
            session.push_event("endpoint", endpoint).await;
            session
        }
    };

    tracing::info!(session_id = %session.id, last_event_id, "New SSE stream connection");

    let stream = build_sse_stream(session, last_event_id).await;

    (
        [("X-Accel-Buffering", "no"), ("Cache-Control", "no-cache, no-store, must-revalidate")],
        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
        .into_response()
}

/// Replay buffered events after `last_event_id`, then follow live events.
async fn build_sse_stream(
    session: Arc<Session>,
    last_event_id: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    // Subscribe before reading history so nothing falls between the two.
    let receiver = session.subscribe();
    let missed = session.get_events_after(last_event_id).await;
    let replayed_up_to = missed.last().map_or(last_event_id, |e| e.id);

    let replay_stream =
        stream::iter(missed.into_iter().map(|e| Ok::<_, Infallible>(e.to_sse_event())));

    let live_stream = BroadcastStream::new(receiver).filter_map(
        move |result: Result<BufferedEvent, _>| async move {
            match result {
                Ok(event) if event.id > replayed_up_to => Some(Ok(event.to_sse_event())),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Broadcast lag, client will catch up");
                    None
                }
            }
        },
    );

    replay_stream.chain(live_stream)
}

/// `POST /messages/?session_id=...`
///
/// Accepts the request and delivers the response on the session's stream.
async fn handle_message_post(
    State(state): State<Arc<HttpState>>,
    auth: Option<Extension<Arc<AuthInfo>>>,
    Query(query): Query<SessionQuery>,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };

    let ctx = tool_context(auth);
    let owner = ctx.auth_info().map(AuthInfo::owner_key);

    let session = match state.sessions.get_session(&session_id).await {
        Some(session) if session.is_owned_by(owner.as_deref()) => session,
        _ => return (StatusCode::NOT_FOUND, "Could not find session").into_response(),
    };

    tokio::spawn(async move {
        let Some(response) = jsonrpc::handle_request(&req, &state.tools, &ctx).await else {
            return;
        };
        match serde_json::to_string(&response) {
            Ok(data) => {
                session.push_event("message", data).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize response"),
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
