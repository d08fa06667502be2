pub mod errors;
pub mod location;
pub mod requests;
pub mod verification;

// Re-export commonly used types
pub use errors::VerificationError;
pub use location::{AccuracyTier, Coordinates, GpsVerificationResult};
pub use requests::{GpsPayload, QrPayload, ReceiptPayload, VerifyRequest, VerifyResponse};
pub use verification::{
    Badge, Factor, GpsData, MethodState, MethodStatus, QrData, QrVerificationResult, ReceiptData,
    ReceiptVerificationResult, VerificationOptions, VerificationResult, VerificationSummary,
    MAX_GPS_SCORE, MAX_QR_SCORE, MAX_RECEIPT_SCORE, PASS_THRESHOLD,
};
