mod checkins;
mod code;
mod nearby;
mod verify;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    libraries::VerificationOrchestrator,
    models::{VerificationError, VerifyResponse},
    services::{checkin_store::CheckInStore, popup_directory::PopupDirectory},
};

pub use checkins::checkin_status;
pub use code::current_code;
pub use nearby::nearby_popups;
pub use verify::verify_checkin;

pub(crate) type ApiError = (StatusCode, Json<VerifyResponse>);

/// Shared state for every handler
pub struct AppState {
    pub config: Config,
    pub orchestrator: VerificationOrchestrator,
    pub popups: PopupDirectory,
    pub store: CheckInStore,
}

impl AppState {
    pub fn new(config: Config, orchestrator: VerificationOrchestrator, popups: PopupDirectory) -> Self {
        Self {
            config,
            orchestrator,
            popups,
            store: CheckInStore::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/nearby", get(nearby_popups))
        .route("/api/popups/:popup_id/code", get(current_code))
        .route("/api/popups/:popup_id/checkins/:user_id", get(checkin_status))
        .route("/api/verify", post(verify_checkin))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkin-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(VerifyResponse::error(message.into())))
}

pub(crate) fn unknown_popup(popup_id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Unknown popup {}.", popup_id))
}

/// Map an input error to its status; a missing mandatory receipt is 422, the rest 400.
pub(crate) fn rejection(error: VerificationError) -> ApiError {
    let status = match error {
        VerificationError::ReceiptRequired(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    };
    api_error(status, error.to_string())
}
