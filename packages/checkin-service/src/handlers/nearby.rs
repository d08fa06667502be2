use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{rejection, ApiError, AppState};
use crate::{
    libraries::format_distance,
    models::{Coordinates, VerificationError},
    services::popup_directory::Popup,
};

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    // Defaults to the configured check-in range
    pub range_meters: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyPopup {
    #[serde(flatten)]
    pub popup: Popup,
    pub distance_meters: f64,
    pub distance_label: String,
}

/// Registered popups around a position, nearest first
pub async fn nearby_popups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyPopup>>, ApiError> {
    let origin = Coordinates::new(query.latitude, query.longitude);
    origin.validate().map_err(rejection)?;

    let range = query
        .range_meters
        .unwrap_or(state.config.default_max_range_meters);
    if !range.is_finite() || range < 0.0 {
        return Err(rejection(VerificationError::InvalidRange(range)));
    }

    let nearby = state
        .popups
        .nearby(&origin, range)
        .await
        .into_iter()
        .map(|(popup, distance_meters)| {
            Ok(NearbyPopup {
                popup,
                distance_meters,
                distance_label: format_distance(distance_meters)?,
            })
        })
        .collect::<Result<Vec<_>, VerificationError>>()
        .map_err(rejection)?;

    debug!(
        "{} popup(s) within {}m of ({}, {})",
        nearby.len(),
        range,
        origin.latitude,
        origin.longitude
    );

    Ok(Json(nearby))
}
