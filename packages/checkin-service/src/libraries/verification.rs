use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    libraries::{
        geo_distance::{distance_meters, score_gps_with_range, DEFAULT_MAX_RANGE_METERS},
        rotating_code::{check_issued_code, CodeEngine},
    },
    models::{
        Badge, Coordinates, Factor, GpsData, GpsVerificationResult, MethodState, MethodStatus,
        QrData, QrVerificationResult, ReceiptData, ReceiptVerificationResult, VerificationError,
        VerificationOptions, VerificationResult, VerificationSummary, MAX_RECEIPT_SCORE,
        PASS_THRESHOLD,
    },
    services::receipt::{ReceiptEvaluator, ReceiptRequest},
};

/// Scores at or above this are a strong pass; between `PASS_THRESHOLD` and here a marginal one.
pub const STRONG_PASS_THRESHOLD: u32 = 70;

pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Combines GPS, rotating code and receipt evidence into one check-in decision.
///
/// Holds no mutable state, so one instance can serve any number of concurrent requests.
#[derive(Clone)]
pub struct VerificationOrchestrator {
    code_engine: CodeEngine,
    receipt_evaluator: Option<Arc<dyn ReceiptEvaluator>>,
    receipt_timeout: Duration,
    receipt_required: bool,
}

impl Default for VerificationOrchestrator {
    fn default() -> Self {
        Self {
            code_engine: CodeEngine::default(),
            receipt_evaluator: None,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            receipt_required: false,
        }
    }
}

impl VerificationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code_engine(mut self, code_engine: CodeEngine) -> Self {
        self.code_engine = code_engine;
        self
    }

    pub fn with_receipt_evaluator(mut self, evaluator: Arc<dyn ReceiptEvaluator>) -> Self {
        self.receipt_evaluator = Some(evaluator);
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// When set, a missing or failed receipt fails the whole evaluation.
    pub fn require_receipt(mut self, required: bool) -> Self {
        self.receipt_required = required;
        self
    }

    pub fn code_engine(&self) -> &CodeEngine {
        &self.code_engine
    }

    pub async fn evaluate(&self, options: &VerificationOptions) -> Result<VerificationResult, VerificationError> {
        self.evaluate_at(options, Utc::now()).await
    }

    /// Evaluate every supplied factor as of `now`.
    ///
    /// Errors are reserved for malformed input. A failing factor scores zero, and an
    /// unavailable receipt evaluator drops the receipt factor unless it is required.
    pub async fn evaluate_at(
        &self,
        options: &VerificationOptions,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, VerificationError> {
        options.popup_location.validate()?;

        let gps = options
            .gps_data
            .as_ref()
            .map(|gps| evaluate_gps(&options.popup_location, gps))
            .transpose()?;

        let qr = options
            .qr_data
            .as_ref()
            .map(|qr| self.evaluate_qr(&options.popup_id, qr, now))
            .transpose()?;

        let receipt = match &options.receipt_data {
            Some(data) => self.evaluate_receipt(&options.brand_name, data).await?,
            None if self.receipt_required => {
                return Err(VerificationError::ReceiptRequired(
                    "no receipt was supplied".to_string(),
                ));
            }
            None => None,
        };

        let result = aggregate(options, now, gps, qr, receipt);

        info!(
            "Verification for user {} at popup {}: score {} ({}), methods {:?}",
            result.user_id,
            result.popup_id,
            result.total_score,
            if result.passed { "passed" } else { "failed" },
            result.methods
        );

        Ok(result)
    }

    fn evaluate_qr(
        &self,
        popup_id: &str,
        qr: &QrData,
        now: DateTime<Utc>,
    ) -> Result<QrVerificationResult, VerificationError> {
        let result = match qr {
            QrData::Issued {
                input_code,
                valid_code,
                generated_at,
            } => check_issued_code(input_code, valid_code, *generated_at, now)?,
            QrData::Rotating { input_code } => {
                self.code_engine
                    .verify_code(input_code, popup_id, now.timestamp_millis())?
            }
        };

        debug!(
            "QR check - matched: {}, expired: {}, remaining: {}s",
            result.matched, result.expired, result.remaining_seconds
        );

        Ok(result)
    }

    async fn evaluate_receipt(
        &self,
        brand_name: &str,
        data: &ReceiptData,
    ) -> Result<Option<ReceiptVerificationResult>, VerificationError> {
        let Some(evaluator) = &self.receipt_evaluator else {
            return self.receipt_unavailable("no receipt evaluator is configured".to_string());
        };

        let request = ReceiptRequest {
            image_data: data.image_data.clone(),
            expected_brand: brand_name.to_string(),
            expected_date: data.expected_date,
        };

        match tokio::time::timeout(self.receipt_timeout, evaluator.evaluate(&request)).await {
            Ok(Ok(mut result)) => {
                result.score = result.score.min(MAX_RECEIPT_SCORE);
                debug!(
                    "Receipt check - verified: {}, score: {}",
                    result.verified, result.score
                );
                Ok(Some(result))
            }
            Ok(Err(e)) => self.receipt_unavailable(format!("receipt evaluator failed: {}", e)),
            Err(_) => self.receipt_unavailable(format!(
                "receipt evaluator timed out after {}ms",
                self.receipt_timeout.as_millis()
            )),
        }
    }

    fn receipt_unavailable(
        &self,
        reason: String,
    ) -> Result<Option<ReceiptVerificationResult>, VerificationError> {
        if self.receipt_required {
            return Err(VerificationError::ReceiptRequired(reason));
        }
        warn!("Skipping receipt factor: {}", reason);
        Ok(None)
    }
}

fn evaluate_gps(
    popup_location: &Coordinates,
    gps: &GpsData,
) -> Result<GpsVerificationResult, VerificationError> {
    gps.user_location.validate()?;

    let distance = distance_meters(&gps.user_location, popup_location);
    let result = score_gps_with_range(
        distance,
        gps.max_range_meters.unwrap_or(DEFAULT_MAX_RANGE_METERS),
    )?;

    debug!(
        "GPS check - distance: {:.1}m, tier: {}, score: {}",
        distance,
        result.accuracy_tier.as_str(),
        result.score
    );

    Ok(result)
}

fn aggregate(
    options: &VerificationOptions,
    now: DateTime<Utc>,
    gps: Option<GpsVerificationResult>,
    qr: Option<QrVerificationResult>,
    receipt: Option<ReceiptVerificationResult>,
) -> VerificationResult {
    let mut result = VerificationResult {
        popup_id: options.popup_id.clone(),
        user_id: options.user_id.clone(),
        verified_at: now,
        gps,
        qr,
        receipt,
        total_score: 0,
        passed: false,
        methods: BTreeSet::new(),
    };

    let (total_score, methods) = Factor::ALL.iter().fold(
        (0, BTreeSet::new()),
        |(total, mut methods), factor| match result.score_for(*factor) {
            Some(score) => {
                methods.insert(*factor);
                (total + score.min(factor.max_score()), methods)
            }
            None => (total, methods),
        },
    );

    result.total_score = total_score;
    result.passed = total_score >= PASS_THRESHOLD;
    result.methods = methods;
    result
}

/// Badge, title and message for showing a result to the user.
pub fn summarize(result: &VerificationResult) -> VerificationSummary {
    let score = result.total_score;

    if score >= STRONG_PASS_THRESHOLD {
        VerificationSummary {
            badge: Badge::Success,
            title: "Check-in verified".to_string(),
            message: format!("Verification complete with {} points.", score),
        }
    } else if score >= PASS_THRESHOLD {
        VerificationSummary {
            badge: Badge::Partial,
            title: "Check-in verified".to_string(),
            message: format!(
                "Verified with {} points. Adding another method raises your confidence score.",
                score
            ),
        }
    } else {
        VerificationSummary {
            badge: Badge::Fail,
            title: "Verification failed".to_string(),
            message: format!(
                "Scored {} points; {} are needed to check in.",
                score, PASS_THRESHOLD
            ),
        }
    }
}

pub fn method_status(method: Factor, result: &VerificationResult) -> MethodStatus {
    let score = result.score_for(method);

    MethodStatus {
        method,
        label: method.label().to_string(),
        score: score.unwrap_or(0),
        max_score: method.max_score(),
        status: match score {
            None => MethodState::Pending,
            Some(s) if s > 0 => MethodState::Success,
            Some(_) => MethodState::Fail,
        },
    }
}

/// Status of every factor, in display order.
pub fn method_statuses(result: &VerificationResult) -> Vec<MethodStatus> {
    Factor::ALL
        .iter()
        .map(|factor| method_status(*factor, result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccuracyTier;

    fn result_with(
        gps: Option<u32>,
        qr: Option<u32>,
        receipt: Option<u32>,
    ) -> VerificationResult {
        let options = VerificationOptions::new("popup-1", "user-1", Coordinates::new(0.0, 0.0), "Acme");
        aggregate(
            &options,
            Utc::now(),
            gps.map(|score| GpsVerificationResult {
                distance_meters: 0,
                within_range: true,
                score,
                accuracy_tier: AccuracyTier::Exact,
            }),
            qr.map(|score| QrVerificationResult {
                matched: score > 0,
                score,
                expired: false,
                remaining_seconds: 30,
            }),
            receipt.map(|score| ReceiptVerificationResult {
                verified: score > 0,
                score,
                brand_matched: score > 0,
                date_valid: score > 0,
                extracted_text: None,
            }),
        )
    }

    #[test]
    fn test_aggregate_sums_present_factors() {
        let result = result_with(Some(35), None, Some(20));
        assert_eq!(result.total_score, 55);
        assert!(!result.passed);
        assert_eq!(result.methods, [Factor::Gps, Factor::Receipt].into_iter().collect());
    }

    #[test]
    fn test_zero_scoring_factor_still_counts_as_method() {
        let result = result_with(Some(40), Some(0), None);
        assert_eq!(result.total_score, 40);
        assert!(result.methods.contains(&Factor::Qr));
    }

    #[test]
    fn test_perfect_score() {
        let result = result_with(Some(40), Some(40), Some(20));
        assert_eq!(result.total_score, 100);
        assert!(result.passed);
    }

    #[test]
    fn test_summarize_badges() {
        let cases = [
            (result_with(Some(40), Some(40), None), Badge::Success),
            (result_with(Some(40), None, Some(20)), Badge::Partial),
            (result_with(Some(25), Some(40), None), Badge::Partial),
            (result_with(Some(35), None, Some(20)), Badge::Fail),
            (result_with(None, None, None), Badge::Fail),
        ];

        for (result, expected) in cases {
            let summary = summarize(&result);
            assert_eq!(summary.badge, expected, "score {}", result.total_score);
            assert!(summary.message.contains(&result.total_score.to_string()));
            assert_eq!(
                matches!(summary.badge, Badge::Success | Badge::Partial),
                result.passed
            );
        }
    }

    #[test]
    fn test_method_status() {
        let result = result_with(Some(25), Some(0), None);

        let gps = method_status(Factor::Gps, &result);
        assert_eq!(gps.status, MethodState::Success);
        assert_eq!((gps.score, gps.max_score), (25, 40));
        assert_eq!(gps.label, "GPS");

        let qr = method_status(Factor::Qr, &result);
        assert_eq!(qr.status, MethodState::Fail);
        assert_eq!(qr.label, "QR code");

        let receipt = method_status(Factor::Receipt, &result);
        assert_eq!(receipt.status, MethodState::Pending);
        assert_eq!((receipt.score, receipt.max_score), (0, 20));

        let all = method_statuses(&result);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].method, Factor::Receipt);
    }
}
