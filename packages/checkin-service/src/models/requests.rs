use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::Coordinates;
use super::verification::{
    MethodStatus, QrData, VerificationOptions, VerificationResult, VerificationSummary,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsPayload {
    pub user_location: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_range_meters: Option<f64>,
}

/// A code read off the venue display. The server re-derives the expected
/// value, so clients never supply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QrPayload {
    pub input_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptPayload {
    pub image_base64: String,
    // Defaults to the day of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_date: Option<DateTime<Utc>>,
}

/// Check-in attempt as sent by a client.
///
/// The popup's location and brand are looked up server-side, and unknown
/// fields are refused so a client cannot try to supply them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    pub popup_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_data: Option<GpsPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_data: Option<QrPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_data: Option<ReceiptPayload>,
}

impl VerifyRequest {
    /// Convert the wire request into evaluation options against the
    /// registered `popup_location` and `brand_name`.
    ///
    /// GPS readings without an explicit range fall back to `default_max_range`.
    /// Fails only when the receipt image is not valid base64.
    pub fn into_options(
        self,
        popup_location: Coordinates,
        brand_name: &str,
        default_max_range: f64,
        now: DateTime<Utc>,
    ) -> Result<VerificationOptions, String> {
        let mut options =
            VerificationOptions::new(self.popup_id, self.user_id, popup_location, brand_name);

        if let Some(gps) = self.gps_data {
            options = options.with_gps(
                gps.user_location,
                Some(gps.max_range_meters.unwrap_or(default_max_range)),
            );
        }

        if let Some(qr) = self.qr_data {
            options = options.with_qr(QrData::Rotating {
                input_code: qr.input_code,
            });
        }

        if let Some(receipt) = self.receipt_data {
            let image_data = general_purpose::STANDARD
                .decode(receipt.image_base64.as_bytes())
                .map_err(|e| format!("Invalid receipt image encoding: {}", e))?;
            options = options.with_receipt(image_data, receipt.expected_date.unwrap_or(now));
        }

        Ok(options)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<VerificationSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_label: Option<String>,

    // Whether the check-in was persisted by this request
    #[serde(default)]
    pub recorded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    pub fn evaluated(
        result: VerificationResult,
        summary: VerificationSummary,
        methods: Vec<MethodStatus>,
        distance_label: Option<String>,
        recorded: bool,
        message: Option<String>,
    ) -> Self {
        Self {
            success: result.passed,
            result: Some(result),
            summary: Some(summary),
            methods,
            distance_label,
            recorded,
            message,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            result: None,
            summary: None,
            methods: Vec::new(),
            distance_label: None,
            recorded: false,
            message: None,
            error: Some(message),
        }
    }
}
