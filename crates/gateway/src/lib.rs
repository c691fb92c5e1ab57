//! HTTP API gateway for Supportline.
//!
//! Endpoints:
//!
//! - `POST /chat`       Send a customer message, get a reply
//! - `POST /summarize`  Summarize a session
//! - `POST /escalate`   Hand a session to a human
//! - `GET  /health`     Liveness probe
//!
//! Every handled failure is returned as `{"error": "..."}`.

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use supportline_config::{AppConfig, GatewayConfig};
use supportline_core::error::Error;
use supportline_core::session::{SessionId, TicketStatus};
use supportline_engine::Orchestrator;

/// Shared application state for the gateway.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

type SharedState = Arc<AppState>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Request body size limit
/// - CORS for the configured origins (same-origin only when none are set)
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/summarize", post(summarize_handler))
        .route("/escalate", post(escalate_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes));

    let router = match cors_layer(&config.allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600)),
    )
}

/// Start the gateway HTTP server. Returns after Ctrl-C.
pub async fn start(
    config: &AppConfig,
    orchestrator: Arc<Orchestrator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(Arc::new(AppState { orchestrator }), &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}

// --- DTOs ---

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
}

#[derive(Deserialize)]
struct SummarizeRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SummarizeResponse {
    summary: String,
    next_actions: Vec<String>,
}

#[derive(Deserialize)]
struct EscalateRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct EscalateResponse {
    ticket_id: u64,
    status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

// --- Error mapping ---

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn api_error(err: Error) -> ApiError {
    match err {
        Error::InvalidInput(message) => error_body(StatusCode::BAD_REQUEST, message),
        Error::UnknownSession(_) => error_body(StatusCode::NOT_FOUND, "session not found"),
        Error::EmptySession(_) => error_body(
            StatusCode::BAD_REQUEST,
            "session has no messages to summarize",
        ),
        other => {
            error!(error = %other, "Request failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    error_body(rejection.status(), rejection.body_text())
}

/// Missing or blank ids are rejected before any lookup.
fn required_session_id(id: Option<String>) -> Result<SessionId, ApiError> {
    match id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(SessionId::from(id)),
        _ => Err(error_body(StatusCode::BAD_REQUEST, "session_id required")),
    }
}

// --- Handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_json)?;
    info!(message_len = payload.message.len(), "Chat request");

    // A blank id is treated like an absent one
    let session_id = payload
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(SessionId::from);

    let reply = state
        .orchestrator
        .chat(&payload.message, session_id.as_ref())
        .await
        .map_err(api_error)?;

    Ok(Json(ChatResponse {
        session_id: reply.session_id.to_string(),
        reply: reply.reply,
    }))
}

async fn summarize_handler(
    State(state): State<SharedState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_json)?;
    let session_id = required_session_id(payload.session_id)?;
    info!(session_id = %session_id, "Summarize request");

    let summary = state
        .orchestrator
        .summarize(&session_id)
        .await
        .map_err(api_error)?;

    Ok(Json(SummarizeResponse {
        summary: summary.summary,
        next_actions: summary.next_actions,
    }))
}

async fn escalate_handler(
    State(state): State<SharedState>,
    payload: Result<Json<EscalateRequest>, JsonRejection>,
) -> Result<Json<EscalateResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_json)?;
    let session_id = required_session_id(payload.session_id)?;
    info!(session_id = %session_id, "Escalate request");

    let ticket = state
        .orchestrator
        .escalate(&session_id, payload.summary)
        .await
        .map_err(api_error)?;

    Ok(Json(EscalateResponse {
        ticket_id: ticket.id.0,
        status: ticket.status,
        summary: ticket.summary,
    }))
}
