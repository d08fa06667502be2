use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::location::{Coordinates, GpsVerificationResult};

/// Minimum total score for a check-in to pass.
pub const PASS_THRESHOLD: u32 = 60;

pub const MAX_GPS_SCORE: u32 = 40;
pub const MAX_QR_SCORE: u32 = 40;
pub const MAX_RECEIPT_SCORE: u32 = 20;

/// One independent evidence type contributing to the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factor {
    Gps,
    Qr,
    Receipt,
}

impl Factor {
    /// Every factor, in aggregation order.
    pub const ALL: [Factor; 3] = [Factor::Gps, Factor::Qr, Factor::Receipt];

    pub fn label(&self) -> &'static str {
        match self {
            Factor::Gps => "GPS",
            Factor::Qr => "QR code",
            Factor::Receipt => "Receipt",
        }
    }

    pub fn max_score(&self) -> u32 {
        match self {
            Factor::Gps => MAX_GPS_SCORE,
            Factor::Qr => MAX_QR_SCORE,
            Factor::Receipt => MAX_RECEIPT_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrVerificationResult {
    pub matched: bool,
    pub score: u32,             // 0 or 40
    pub expired: bool,
    pub remaining_seconds: u32, // 0..=30
}

/// Shape returned by the external receipt evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptVerificationResult {
    pub verified: bool,
    pub score: u32,
    pub brand_matched: bool,
    pub date_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GpsData {
    pub user_location: Coordinates,
    pub max_range_meters: Option<f64>,
}

/// Rotating-code evidence, either checked against a previously issued value
/// or re-derived from the popup id.
#[derive(Debug, Clone)]
pub enum QrData {
    Issued {
        input_code: String,
        valid_code: String,
        generated_at: DateTime<Utc>,
    },
    Rotating {
        input_code: String,
    },
}

#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub image_data: Vec<u8>,
    pub expected_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerificationOptions {
    pub popup_id: String,
    pub user_id: String,
    pub popup_location: Coordinates,
    pub brand_name: String,
    pub gps_data: Option<GpsData>,
    pub qr_data: Option<QrData>,
    pub receipt_data: Option<ReceiptData>,
}

impl VerificationOptions {
    pub fn new(
        popup_id: impl Into<String>,
        user_id: impl Into<String>,
        popup_location: Coordinates,
        brand_name: impl Into<String>,
    ) -> Self {
        Self {
            popup_id: popup_id.into(),
            user_id: user_id.into(),
            popup_location,
            brand_name: brand_name.into(),
            gps_data: None,
            qr_data: None,
            receipt_data: None,
        }
    }

    pub fn with_gps(mut self, user_location: Coordinates, max_range_meters: Option<f64>) -> Self {
        self.gps_data = Some(GpsData {
            user_location,
            max_range_meters,
        });
        self
    }

    pub fn with_qr(mut self, qr: QrData) -> Self {
        self.qr_data = Some(qr);
        self
    }

    pub fn with_receipt(mut self, image_data: Vec<u8>, expected_date: DateTime<Utc>) -> Self {
        self.receipt_data = Some(ReceiptData {
            image_data,
            expected_date,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub popup_id: String,
    pub user_id: String,
    pub verified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsVerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrVerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptVerificationResult>,
    pub total_score: u32,
    pub passed: bool,
    pub methods: BTreeSet<Factor>,
}

impl VerificationResult {
    /// Score recorded for a factor, or `None` when it was not attempted.
    pub fn score_for(&self, factor: Factor) -> Option<u32> {
        match factor {
            Factor::Gps => self.gps.as_ref().map(|gps| gps.score),
            Factor::Qr => self.qr.as_ref().map(|qr| qr.score),
            Factor::Receipt => self.receipt.as_ref().map(|receipt| receipt.score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Success,
    Partial,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub badge: Badge,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodState {
    Pending,
    Success,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStatus {
    pub method: Factor,
    pub label: String,
    pub score: u32,
    pub max_score: u32,
    pub status: MethodState,
}
