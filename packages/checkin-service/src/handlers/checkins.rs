use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{api_error, ApiError, AppState};
use crate::services::checkin_store::CheckInRecord;

/// Recorded check-in of a user at a popup
pub async fn checkin_status(
    State(state): State<Arc<AppState>>,
    Path((popup_id, user_id)): Path<(String, String)>,
) -> Result<Json<CheckInRecord>, ApiError> {
    state
        .store
        .get(&popup_id, &user_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No check-in for user {} at {}.", user_id, popup_id),
            )
        })
}
