use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::libraries::{geo_distance::DEFAULT_MAX_RANGE_METERS, CodeEngine, VerificationOrchestrator};
use crate::services::receipt::HttpReceiptEvaluator;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    // GPS range used when a request does not give one
    #[serde(default = "default_max_range_meters")]
    pub default_max_range_meters: f64,

    // Receipt evaluator endpoint; without it the receipt factor is never scored
    #[serde(default)]
    pub receipt_service_url: Option<String>,

    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,

    #[serde(default)]
    pub receipt_required: bool,

    // Switches rotating codes to the keyed derivation
    #[serde(default)]
    pub code_secret: Option<String>,

    // JSON array of popups accepting check-ins
    #[serde(default)]
    pub popups_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env::<Config>()
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Build the orchestrator this configuration describes.
    pub fn build_orchestrator(&self) -> anyhow::Result<VerificationOrchestrator> {
        let code_engine = match self.code_secret.as_deref() {
            Some(secret) if !secret.is_empty() => CodeEngine::with_secret(secret.as_bytes())?,
            _ => CodeEngine::default(),
        };

        let mut orchestrator = VerificationOrchestrator::new()
            .with_code_engine(code_engine)
            .with_receipt_timeout(self.receipt_timeout())
            .require_receipt(self.receipt_required);

        if let Some(url) = &self.receipt_service_url {
            let evaluator = HttpReceiptEvaluator::new(url.clone(), self.receipt_timeout())?;
            orchestrator = orchestrator.with_receipt_evaluator(Arc::new(evaluator));
        }

        Ok(orchestrator)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            default_max_range_meters: default_max_range_meters(),
            receipt_service_url: None,
            receipt_timeout_ms: default_receipt_timeout_ms(),
            receipt_required: false,
            code_secret: None,
            popups_file: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_max_range_meters() -> f64 {
    DEFAULT_MAX_RANGE_METERS
}

fn default_receipt_timeout_ms() -> u64 {
    5_000
}
