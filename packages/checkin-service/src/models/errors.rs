/// Caller-side input errors. Failing factors are reported through scores, not here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerificationError {
    #[error("Invalid coordinates provided: ({latitude}, {longitude}).")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Location identifier must not be empty.")]
    EmptyLocationId,

    #[error("Code must contain only digits, got {0:?}.")]
    NonNumericCode(String),

    #[error("Distance must be a non-negative finite number, got {0}.")]
    InvalidDistance(f64),

    #[error("Range must be a non-negative finite number, got {0}.")]
    InvalidRange(f64),

    #[error("Receipt verification is required but unavailable: {0}")]
    ReceiptRequired(String),
}
