use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{Factor, VerificationResult};

/// A completed check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub popup_id: String,
    pub user_id: String,
    pub verified_at: DateTime<Utc>,
    pub total_score: u32,
    pub methods: BTreeSet<Factor>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckInError {
    #[error("User {user_id} has already checked in to {popup_id}.")]
    AlreadyCheckedIn { popup_id: String, user_id: String },

    #[error("Verification did not pass (score {0}).")]
    NotPassed(u32),
}

/// Records passed check-ins, one per (popup, user).
/// In-memory only; a restart forgets every check-in.
#[derive(Clone, Default)]
pub struct CheckInStore {
    records: Arc<RwLock<HashMap<(String, String), CheckInRecord>>>,
}

impl CheckInStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a passed verification.
    pub async fn record(&self, result: &VerificationResult) -> Result<CheckInRecord, CheckInError> {
        if !result.passed {
            return Err(CheckInError::NotPassed(result.total_score));
        }

        let key = (result.popup_id.clone(), result.user_id.clone());
        let mut records = self.records.write().await;

        if records.contains_key(&key) {
            return Err(CheckInError::AlreadyCheckedIn {
                popup_id: result.popup_id.clone(),
                user_id: result.user_id.clone(),
            });
        }

        let record = CheckInRecord {
            popup_id: result.popup_id.clone(),
            user_id: result.user_id.clone(),
            verified_at: result.verified_at,
            total_score: result.total_score,
            methods: result.methods.clone(),
        };
        records.insert(key, record.clone());

        tracing::info!(
            "Recorded check-in for user {} at popup {} (score {})",
            record.user_id,
            record.popup_id,
            record.total_score
        );

        Ok(record)
    }

    pub async fn get(&self, popup_id: &str, user_id: &str) -> Option<CheckInRecord> {
        let records = self.records.read().await;
        records
            .get(&(popup_id.to_string(), user_id.to_string()))
            .cloned()
    }
}
