pub mod geo_distance;
pub mod rotating_code;
pub mod verification;

pub use geo_distance::{distance_meters, format_distance, quick_bounding_box_check, score_gps};
pub use rotating_code::{generate_code, generate_code_bundle, verify_code, CodeBundle, CodeEngine};
pub use verification::{method_status, method_statuses, summarize, VerificationOrchestrator};
