use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::libraries::geo_distance::nearest_within;
use crate::models::{Coordinates, VerificationError};

/// A registered pop-up venue. Its location and brand are the server's
/// reference values for every check-in against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    pub popup_id: String,
    pub name: String,
    pub brand_name: String,
    pub location: Coordinates,
}

/// Known pop-ups, keyed by id
#[derive(Clone, Default)]
pub struct PopupDirectory {
    popups: Arc<RwLock<HashMap<String, Popup>>>,
}

impl PopupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pop-up.
    pub async fn register(&self, popup: Popup) -> Result<(), VerificationError> {
        if popup.popup_id.trim().is_empty() {
            return Err(VerificationError::EmptyLocationId);
        }
        popup.location.validate()?;

        tracing::debug!(
            "Registered popup {} ({}) at ({}, {})",
            popup.popup_id,
            popup.brand_name,
            popup.location.latitude,
            popup.location.longitude
        );

        let mut popups = self.popups.write().await;
        popups.insert(popup.popup_id.clone(), popup);
        Ok(())
    }

    pub async fn get(&self, popup_id: &str) -> Option<Popup> {
        let popups = self.popups.read().await;
        popups.get(popup_id).cloned()
    }

    /// Pop-ups within `range_meters` of `origin`, nearest first.
    pub async fn nearby(&self, origin: &Coordinates, range_meters: f64) -> Vec<(Popup, f64)> {
        let popups = self.popups.read().await;
        nearest_within(
            origin,
            popups.values().map(|popup| (popup.clone(), popup.location)),
            range_meters,
        )
    }

    /// Load a JSON array of pop-ups from disk. Returns how many were registered.
    pub async fn load_file(&self, path: &str) -> Result<usize> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read popups file {}", path))?;
        let popups: Vec<Popup> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse popups file {}", path))?;

        let count = popups.len();
        for popup in popups {
            let popup_id = popup.popup_id.clone();
            self.register(popup)
                .await
                .map_err(|e| anyhow!("Invalid popup {:?} in {}: {}", popup_id, path, e))?;
        }

        Ok(count)
    }
}
