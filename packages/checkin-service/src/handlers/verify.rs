use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::{api_error, rejection, unknown_popup, ApiError, AppState};
use crate::{
    libraries::{distance_meters, format_distance, method_statuses, summarize},
    models::{VerifyRequest, VerifyResponse},
};

/// Evaluate a check-in attempt against a registered popup and record it when it passes.
///
/// Failing factors still return 200 with `success: false`; only malformed
/// input is rejected with an error status.
pub async fn verify_checkin(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    debug!(
        "Verifying check-in for popup: {}, user: {}",
        request.popup_id, request.user_id
    );

    let popup = state
        .popups
        .get(&request.popup_id)
        .await
        .ok_or_else(|| unknown_popup(&request.popup_id))?;

    let now = Utc::now();
    let options = request
        .into_options(
            popup.location,
            &popup.brand_name,
            state.config.default_max_range_meters,
            now,
        )
        .map_err(|message| api_error(StatusCode::BAD_REQUEST, message))?;

    let result = state
        .orchestrator
        .evaluate_at(&options, now)
        .await
        .map_err(rejection)?;

    let summary = summarize(&result);
    let methods = method_statuses(&result);
    let distance_label = options
        .gps_data
        .as_ref()
        .map(|gps| format_distance(distance_meters(&gps.user_location, &options.popup_location)))
        .transpose()
        .map_err(rejection)?;

    let (recorded, message) = if result.passed {
        match state.store.record(&result).await {
            Ok(_) => (true, Some("Check-in recorded.".to_string())),
            Err(e) => {
                info!("Check-in not recorded: {}", e);
                (false, Some(e.to_string()))
            }
        }
    } else {
        (false, None)
    };

    Ok(Json(VerifyResponse::evaluated(
        result,
        summary,
        methods,
        distance_label,
        recorded,
        message,
    )))
}
