// ABOUTME: HTTP surface: static entry page, account listing, login submission, health and metrics.
// ABOUTME: Login answers as soon as the account id is reserved; the connection completes in the background.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use relaybot_core::{Account, LifecycleController, LoginOutcome, PluginRegistry};
use relaybot_platform::AppState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub const INVALID_APP_STATE: &str = "There's an issue with the appstate data; it's invalid.";
pub const ALREADY_LOGGED_IN: &str = "Active user session detected; already logged in";
pub const LOGIN_IN_PROGRESS: &str = "A login for this account is already in progress.";
pub const LOGIN_ACCEPTED: &str = "Authentication process completed successfully; login achieved.";

#[derive(Clone)]
pub struct HttpState {
    pub controller: LifecycleController,
    pub registry: Arc<PluginRegistry>,
    pub metrics: PrometheusHandle,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub state: Option<AppState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Account>,
}

impl LoginResponse {
    fn accepted() -> Self {
        Self {
            success: Some(true),
            error: None,
            message: LOGIN_ACCEPTED.to_string(),
            user: None,
        }
    }

    // `error: false` is what existing clients expect on failures
    fn refused(message: &str) -> Self {
        Self {
            success: None,
            error: Some(false),
            message: message.to_string(),
            user: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub commands: usize,
    pub event_handlers: usize,
}

/// Build the application router. Static files come from `public_dir`.
pub fn router(state: HttpState, public_dir: &Path) -> Router {
    Router::new()
        .route("/info", get(info_handler))
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_service("/", ServeFile::new(public_dir.join("index.html")))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle GET /info - every active account
async fn info_handler(State(state): State<HttpState>) -> Json<Vec<Account>> {
    Json(state.controller.store().accounts())
}

/// Handle POST /login
async fn login_handler(
    State(state): State<HttpState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> (StatusCode, Json<LoginResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed login request");
            return (
                StatusCode::BAD_REQUEST,
                Json(LoginResponse::refused(INVALID_APP_STATE)),
            );
        }
    };

    match state.controller.login(request.state) {
        LoginOutcome::Accepted(pending) => {
            tracing::info!(account_id = %pending.account_id(), "Login request accepted");
            // Detached: the outcome is visible through /info
            drop(pending);
            (StatusCode::OK, Json(LoginResponse::accepted()))
        }
        LoginOutcome::AlreadyActive(account) => {
            let mut response = LoginResponse::refused(ALREADY_LOGGED_IN);
            response.user = Some(account);
            (StatusCode::BAD_REQUEST, Json(response))
        }
        LoginOutcome::InProgress => (
            StatusCode::CONFLICT,
            Json(LoginResponse::refused(LOGIN_IN_PROGRESS)),
        ),
        LoginOutcome::Rejected(_) => (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::refused(INVALID_APP_STATE)),
        ),
    }
}

async fn health_handler(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.controller.store().active_count(),
        commands: state.registry.commands().len(),
        event_handlers: state.registry.events().len(),
    })
}

/// Handle GET /metrics - returns Prometheus text format
async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    state.metrics.render()
}
