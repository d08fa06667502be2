use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

use crate::models::ReceiptVerificationResult;

/// Input handed to the receipt evaluator.
#[derive(Debug, Clone)]
pub struct ReceiptRequest {
    pub image_data: Vec<u8>,
    pub expected_brand: String,
    pub expected_date: DateTime<Utc>,
}

/// External receipt matching (OCR, brand and date extraction).
///
/// Implementations own their retry policy; callers only bound them with a timeout.
#[async_trait::async_trait]
pub trait ReceiptEvaluator: Send + Sync {
    async fn evaluate(&self, request: &ReceiptRequest) -> Result<ReceiptVerificationResult>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ReceiptWireRequest {
    image_data: String, // base64
    expected_brand: String,
    expected_date: DateTime<Utc>,
}

impl From<&ReceiptRequest> for ReceiptWireRequest {
    fn from(request: &ReceiptRequest) -> Self {
        Self {
            image_data: general_purpose::STANDARD.encode(&request.image_data),
            expected_brand: request.expected_brand.clone(),
            expected_date: request.expected_date,
        }
    }
}

/// Receipt evaluator reached over HTTP with a JSON body.
pub struct HttpReceiptEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReceiptEvaluator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("checkin-service/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl ReceiptEvaluator for HttpReceiptEvaluator {
    async fn evaluate(&self, request: &ReceiptRequest) -> Result<ReceiptVerificationResult> {
        tracing::debug!(
            "Sending {} byte receipt for brand {} to {}",
            request.image_data.len(),
            request.expected_brand,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ReceiptWireRequest::from(request))
            .send()
            .await
            .map_err(|e| {
                let mut error_msg = format!("Receipt service request failed: {}", e);
                let mut source = e.source();
                while let Some(err) = source {
                    error_msg.push_str(&format!("\n  Caused by: {}", err));
                    source = err.source();
                }
                tracing::warn!("{}", error_msg);
                anyhow!(error_msg)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("Receipt service returned HTTP {}", status);
            return Err(anyhow!("Receipt service returned error: {}", status));
        }

        let result: ReceiptVerificationResult = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse receipt service response: {}", e))?;

        tracing::debug!(
            "Receipt service verdict: verified={}, brand_matched={}, date_valid={}",
            result.verified,
            result.brand_matched,
            result.date_valid
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn sample_request() -> ReceiptRequest {
        ReceiptRequest {
            image_data: b"receipt".to_vec(),
            expected_brand: "Acme".to_string(),
            expected_date: Utc::now(),
        }
    }

    async fn spawn_receipt_service(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/verify", addr)
    }

    #[test]
    fn test_wire_request_encodes_image() {
        let wire = ReceiptWireRequest::from(&sample_request());
        assert_eq!(wire.image_data, "cmVjZWlwdA==");
        assert_eq!(wire.expected_brand, "Acme");
    }

    #[tokio::test]
    async fn test_http_evaluator_round_trip() {
        let app = Router::new().route(
            "/verify",
            post(|Json(body): Json<ReceiptWireRequest>| async move {
                Json(ReceiptVerificationResult {
                    verified: body.expected_brand == "Acme",
                    score: 20,
                    brand_matched: true,
                    date_valid: true,
                    extracted_text: Some("ACME STORE".to_string()),
                })
            }),
        );
        let endpoint = spawn_receipt_service(app).await;

        let evaluator = HttpReceiptEvaluator::new(endpoint, Duration::from_secs(5)).unwrap();
        let result = evaluator.evaluate(&sample_request()).await.unwrap();
        assert!(result.verified);
        assert_eq!(result.score, 20);
        assert_eq!(result.extracted_text.as_deref(), Some("ACME STORE"));
    }

    #[tokio::test]
    async fn test_http_evaluator_surfaces_server_errors() {
        let app = Router::new().route(
            "/verify",
            post(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let endpoint = spawn_receipt_service(app).await;

        let evaluator = HttpReceiptEvaluator::new(endpoint, Duration::from_secs(5)).unwrap();
        let err = evaluator.evaluate(&sample_request()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
