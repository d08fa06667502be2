use serde::{Deserialize, Serialize};

use super::errors::VerificationError;

/// A WGS-84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Create a new coordinate pair
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check that coordinates are finite and within valid GPS ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<(), VerificationError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(VerificationError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// Distance bucket a GPS reading falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyTier {
    Exact,
    Close,
    Near,
    Far,
}

impl AccuracyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyTier::Exact => "exact",
            AccuracyTier::Close => "close",
            AccuracyTier::Near => "near",
            AccuracyTier::Far => "far",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsVerificationResult {
    pub distance_meters: u32,  // Rounded to the nearest meter
    pub within_range: bool,
    pub score: u32,            // One of 0, 25, 35, 40
    pub accuracy_tier: AccuracyTier,
}
