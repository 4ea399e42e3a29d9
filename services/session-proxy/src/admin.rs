//! Admin API for the session
//!
//! Runs on a separate listener (default 127.0.0.1:9090) and is the login
//! surface of the sidecar: whatever performs the interactive login hands the
//! resulting token pair to `PUT /admin/session`.
//!
//! Endpoints:
//! - GET    /admin/session         : session status (never exposes tokens)
//! - PUT    /admin/session         : install a token pair, session active
//! - DELETE /admin/session         : logout, clears the stored pair
//! - POST   /admin/session/refresh : force a refresh through the coordinator

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use session_auth::{TokenKey, TokenPair};
use session_pipeline::{AuthPipeline, RefreshMode};
use tracing::{info, warn};

use crate::session::SessionStatus;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    pipeline: Arc<AuthPipeline>,
    status: Arc<SessionStatus>,
    login_url: String,
}

impl AdminState {
    pub fn new(
        pipeline: Arc<AuthPipeline>,
        status: Arc<SessionStatus>,
        login_url: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            status,
            login_url: login_url.into(),
        }
    }
}

/// Build the admin axum router with all session endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/session",
            get(session_status).put(install_session).delete(logout),
        )
        .route("/admin/session/refresh", post(force_refresh))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// GET /admin/session: current session status.
async fn session_status(State(state): State<AdminState>) -> Response {
    let store = state.pipeline.store();
    let has_access = store.get(TokenKey::Access).await.is_some();
    let has_refresh = store.get(TokenKey::Refresh).await.is_some();
    let coordinator = state.pipeline.refresh_coordinator();
    let mode = match coordinator.mode() {
        RefreshMode::SingleFlight => "single_flight",
        RefreshMode::Independent => "independent",
    };

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "session": state.status.snapshot(),
            "has_access_token": has_access,
            "has_refresh_token": has_refresh,
            "refreshing": coordinator.is_refreshing(),
            "refresh_mode": mode,
            "login_url": state.login_url,
        }),
    )
}

/// Request body for PUT /admin/session, in the API's camelCase shape.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallSessionRequest {
    access_token: String,
    refresh_token: String,
}

/// PUT /admin/session: store a freshly issued token pair.
async fn install_session(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<InstallSessionRequest>,
) -> Response {
    if body.access_token.is_empty() || body.refresh_token.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "accessToken and refreshToken must be non-empty" }),
        );
    }

    let pair = TokenPair::new(body.access_token, body.refresh_token);
    if let Err(e) = state.pipeline.store().replace(pair).await {
        warn!(error = %e, "failed to store session tokens");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": format!("failed to store session tokens: {e}") }),
        );
    }

    state.status.mark_active();
    info!("session installed via admin API");
    json_response(StatusCode::OK, serde_json::json!({ "status": "active" }))
}

/// DELETE /admin/session: clear the stored pair and require login.
async fn logout(State(state): State<AdminState>) -> Response {
    if let Err(e) = state.pipeline.store().clear().await {
        warn!(error = %e, "failed to clear session tokens");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": format!("failed to clear session tokens: {e}") }),
        );
    }

    state.status.mark_login_required();
    info!("session cleared via admin API");
    json_response(
        StatusCode::OK,
        serde_json::json!({ "status": "login_required", "login_url": state.login_url }),
    )
}

/// POST /admin/session/refresh: rotate the pair now.
///
/// Joins an in-flight refresh if there is one. A failed refresh expires the
/// session exactly like a failed refresh on the request path.
async fn force_refresh(State(state): State<AdminState>) -> Response {
    match state.pipeline.refresh_coordinator().refresh().await {
        Ok(()) => {
            state.status.mark_active();
            json_response(StatusCode::OK, serde_json::json!({ "status": "refreshed" }))
        }
        Err(e) => {
            // The navigation task flips the status too; do it here so the
            // response and a follow-up GET agree.
            state.status.mark_login_required();
            json_response(
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "error": e.to_string(),
                    "status": "login_required",
                    "login_url": state.login_url,
                }),
            )
        }
    }
}
