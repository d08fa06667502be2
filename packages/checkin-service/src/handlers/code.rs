use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::{rejection, unknown_popup, ApiError, AppState};
use crate::libraries::CodeBundle;

/// Current rotating code for a registered popup, for display at the venue
pub async fn current_code(
    State(state): State<Arc<AppState>>,
    Path(popup_id): Path<String>,
) -> Result<Json<CodeBundle>, ApiError> {
    if state.popups.get(&popup_id).await.is_none() {
        return Err(unknown_popup(&popup_id));
    }

    let bundle = state
        .orchestrator
        .code_engine()
        .generate_code_bundle(&popup_id, Utc::now().timestamp_millis())
        .map_err(rejection)?;

    debug!(
        "Issued code for popup {} (refresh in {}s)",
        popup_id, bundle.refresh_in_seconds
    );

    Ok(Json(bundle))
}
