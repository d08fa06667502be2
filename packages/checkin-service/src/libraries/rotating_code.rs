use anyhow::anyhow;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::models::{QrVerificationResult, VerificationError, MAX_QR_SCORE};

/// Length of one code window in seconds
pub const CODE_WINDOW_SECONDS: i64 = 30;

/// Number of digits in a code
pub const CODE_LENGTH: usize = 6;

/// How many windows back `verify_code` looks to tell a stale code from a wrong one
pub const EXPIRED_LOOKBACK_WINDOWS: i64 = 10;

const WINDOW_MS: i64 = CODE_WINDOW_SECONDS * 1000;
// Clock drift tolerated between issuer and verifier
const MAX_CLOCK_SKEW_MS: i64 = 5_000;
const CODE_MODULUS: u64 = 1_000_000;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Index of the 30 second window containing `timestamp_ms`.
pub fn window_index(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(WINDOW_MS)
}

/// Whole seconds until the window containing `at_ms` rolls over, in `1..=30`.
pub fn remaining_seconds(at_ms: i64) -> u32 {
    let window_end = (window_index(at_ms) + 1) * WINDOW_MS;
    let remaining_ms = window_end - at_ms;
    ((remaining_ms + 999) / 1000) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBundle {
    pub code: String,
    pub valid_until: i64, // Unix milliseconds, end of the current window
    pub refresh_in_seconds: u32,
}

/// Derives and checks rotating codes.
///
/// The default engine uses a stable mixing hash anyone can reproduce. An engine
/// built with a secret derives codes with HMAC-SHA256 instead.
#[derive(Clone, Default)]
pub struct CodeEngine {
    keyed: Option<Hmac<Sha256>>,
}

impl fmt::Debug for CodeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeEngine")
            .field("keyed", &self.keyed.is_some())
            .finish()
    }
}

impl CodeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: &[u8]) -> anyhow::Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("Code secret must not be empty"));
        }
        let mac = Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|e| anyhow!("Invalid code secret: {}", e))?;
        Ok(Self { keyed: Some(mac) })
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed.is_some()
    }

    /// Code for the window containing `timestamp_ms`.
    pub fn generate_code(&self, location_id: &str, timestamp_ms: i64) -> Result<String, VerificationError> {
        ensure_location_id(location_id)?;
        Ok(self.code_for_window(location_id, window_index(timestamp_ms)))
    }

    /// Accept the current window's code or the previous one.
    pub fn verify_code(
        &self,
        input_code: &str,
        location_id: &str,
        at_ms: i64,
    ) -> Result<QrVerificationResult, VerificationError> {
        ensure_numeric(input_code)?;
        ensure_location_id(location_id)?;

        let current = window_index(at_ms);
        let remaining_seconds = remaining_seconds(at_ms);

        let matched = (0..=1).any(|age| self.code_for_window(location_id, current - age) == input_code);
        if matched {
            return Ok(QrVerificationResult {
                matched: true,
                score: MAX_QR_SCORE,
                expired: false,
                remaining_seconds,
            });
        }

        let expired = (2..=EXPIRED_LOOKBACK_WINDOWS)
            .any(|age| self.code_for_window(location_id, current - age) == input_code);

        Ok(QrVerificationResult {
            matched: false,
            score: 0,
            expired,
            remaining_seconds,
        })
    }

    pub fn generate_code_bundle(&self, location_id: &str, at_ms: i64) -> Result<CodeBundle, VerificationError> {
        let code = self.generate_code(location_id, at_ms)?;
        Ok(CodeBundle {
            code,
            valid_until: (window_index(at_ms) + 1) * WINDOW_MS,
            refresh_in_seconds: remaining_seconds(at_ms),
        })
    }

    fn code_for_window(&self, location_id: &str, window: i64) -> String {
        let message = format!("{}:{}", location_id, window);
        let digest = match &self.keyed {
            Some(mac) => keyed_digest(mac, message.as_bytes()),
            None => mix_digest(message.as_bytes()),
        };
        format!("{:0width$}", digest % CODE_MODULUS, width = CODE_LENGTH)
    }
}

/// Check a previously issued code by equality and age.
///
/// Codes older than two windows are expired, matching the horizon `verify_code` accepts.
/// So are codes issued more than a few seconds in the future.
pub fn check_issued_code(
    input_code: &str,
    valid_code: &str,
    generated_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<QrVerificationResult, VerificationError> {
    ensure_numeric(input_code)?;
    ensure_numeric(valid_code)?;

    let age_ms = (now - generated_at).num_milliseconds();
    // An issuance from the future cannot be shown to be fresh
    let expired = age_ms < -MAX_CLOCK_SKEW_MS || age_ms > 2 * WINDOW_MS;
    let matched = !expired && input_code == valid_code;

    Ok(QrVerificationResult {
        matched,
        score: if matched { MAX_QR_SCORE } else { 0 },
        expired,
        remaining_seconds: if expired {
            0
        } else {
            remaining_seconds(now.timestamp_millis())
        },
    })
}

pub fn generate_code(location_id: &str, timestamp_ms: i64) -> Result<String, VerificationError> {
    CodeEngine::default().generate_code(location_id, timestamp_ms)
}

pub fn verify_code(
    input_code: &str,
    location_id: &str,
    at_ms: i64,
) -> Result<QrVerificationResult, VerificationError> {
    CodeEngine::default().verify_code(input_code, location_id, at_ms)
}

pub fn generate_code_bundle(location_id: &str, at_ms: i64) -> Result<CodeBundle, VerificationError> {
    CodeEngine::default().generate_code_bundle(location_id, at_ms)
}

fn ensure_location_id(location_id: &str) -> Result<(), VerificationError> {
    if location_id.trim().is_empty() {
        Err(VerificationError::EmptyLocationId)
    } else {
        Ok(())
    }
}

fn ensure_numeric(code: &str) -> Result<(), VerificationError> {
    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(VerificationError::NonNumericCode(code.to_string()))
    }
}

/// FNV-1a followed by the SplitMix64 finalizer.
fn mix_digest(message: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in message {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    let mut z = hash.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn keyed_digest(mac: &Hmac<Sha256>, message: &[u8]) -> u64 {
    let mut mac = mac.clone();
    mac.update(message);
    let bytes = mac.finalize().into_bytes();
    bytes[..8].iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // Start of a window
    const T: i64 = WINDOW_MS * 56_666_667;

    #[test]
    fn test_window_index() {
        assert_eq!(window_index(0), 0);
        assert_eq!(window_index(29_999), 0);
        assert_eq!(window_index(30_000), 1);
        assert_eq!(window_index(-1), -1);
        assert_eq!(window_index(T + 29_999), window_index(T));
    }

    #[test]
    fn test_code_shape() {
        for offset in 0..50 {
            let code = generate_code("popup-1", T + offset * WINDOW_MS).unwrap();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_same_window_same_code() {
        let code = generate_code("popup-1", T).unwrap();
        assert_eq!(code, generate_code("popup-1", T + 1_000).unwrap());
        assert_eq!(code, generate_code("popup-1", T + 29_999).unwrap());
        assert_ne!(code, generate_code("popup-1", T + 31_000).unwrap());
    }

    #[test]
    fn test_location_changes_code() {
        let a = generate_code("popup-1", T).unwrap();
        let b = generate_code("popup-2", T).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_codes_rarely_repeat_across_windows() {
        let codes: std::collections::HashSet<String> = (0..200)
            .map(|w| generate_code("popup-1", T + w * WINDOW_MS).unwrap())
            .collect();
        assert!(codes.len() >= 195, "only {} distinct codes", codes.len());
    }

    #[test]
    fn test_verify_within_same_window() {
        let code = generate_code("popup-1", T).unwrap();
        let result = verify_code(&code, "popup-1", T + 29_000).unwrap();
        assert!(result.matched);
        assert_eq!(result.score, 40);
        assert!(!result.expired);
        assert_eq!(result.remaining_seconds, 1);
    }

    #[test]
    fn test_grace_window() {
        let code = generate_code("popup-1", T).unwrap();
        for offset in (0..2 * WINDOW_MS).step_by(1_000) {
            assert!(
                verify_code(&code, "popup-1", T + offset).unwrap().matched,
                "rejected at +{}ms",
                offset
            );
        }

        for offset in [2 * WINDOW_MS, 65_000, 90_000] {
            let result = verify_code(&code, "popup-1", T + offset).unwrap();
            assert!(!result.matched);
            assert_eq!(result.score, 0);
            assert!(result.expired);
        }
    }

    #[test]
    fn test_wrong_code_is_not_expired() {
        let engine = CodeEngine::new();
        let recent: Vec<String> = (0..=EXPIRED_LOOKBACK_WINDOWS)
            .map(|age| engine.code_for_window("popup-1", window_index(T) - age))
            .collect();
        let wrong = (0..CODE_MODULUS)
            .map(|n| format!("{:06}", n))
            .find(|candidate| !recent.contains(candidate))
            .unwrap();

        let result = engine.verify_code(&wrong, "popup-1", T).unwrap();
        assert!(!result.matched);
        assert!(!result.expired);
    }

    #[test]
    fn test_remaining_seconds_bounds() {
        assert_eq!(remaining_seconds(T), 30);
        assert_eq!(remaining_seconds(T + 1), 30);
        assert_eq!(remaining_seconds(T + 29_500), 1);
        for offset in (0..WINDOW_MS).step_by(250) {
            let remaining = remaining_seconds(T + offset);
            assert!((1..=30).contains(&remaining));
        }
    }

    #[test]
    fn test_code_bundle() {
        let bundle = generate_code_bundle("popup-1", T + 12_000).unwrap();
        assert_eq!(bundle.code, generate_code("popup-1", T).unwrap());
        assert_eq!(bundle.valid_until, T + WINDOW_MS);
        assert_eq!(bundle.refresh_in_seconds, 18);
    }

    #[test]
    fn test_input_errors() {
        assert_eq!(generate_code("", T), Err(VerificationError::EmptyLocationId));
        assert_eq!(generate_code("   ", T), Err(VerificationError::EmptyLocationId));
        assert_eq!(
            verify_code("12a456", "popup-1", T),
            Err(VerificationError::NonNumericCode("12a456".to_string()))
        );
        assert!(verify_code("", "popup-1", T).is_err());
        assert!(verify_code("123456", "", T).is_err());
    }

    #[test]
    fn test_short_numeric_code_never_matches() {
        let result = verify_code("123", "popup-1", T).unwrap();
        assert!(!result.matched);
        assert!(!result.expired);
    }

    #[test]
    fn test_keyed_engine() {
        let keyed = CodeEngine::with_secret(b"server-secret").unwrap();
        let other = CodeEngine::with_secret(b"another-secret").unwrap();
        assert!(keyed.is_keyed());
        assert!(!CodeEngine::new().is_keyed());

        let code = keyed.generate_code("popup-1", T).unwrap();
        assert_eq!(code, keyed.generate_code("popup-1", T + 5_000).unwrap());
        assert_ne!(code, other.generate_code("popup-1", T).unwrap());
        assert!(keyed.verify_code(&code, "popup-1", T + WINDOW_MS).unwrap().matched);

        assert!(CodeEngine::with_secret(b"").is_err());
        assert_eq!(format!("{:?}", keyed), "CodeEngine { keyed: true }");
    }

    #[test]
    fn test_issued_code_check() {
        let generated_at = Utc::now();

        let fresh = check_issued_code("123456", "123456", generated_at, generated_at + Duration::seconds(10)).unwrap();
        assert!(fresh.matched);
        assert_eq!(fresh.score, 40);
        assert!(!fresh.expired);
        assert!((1..=30).contains(&fresh.remaining_seconds));

        let at_horizon = check_issued_code("123456", "123456", generated_at, generated_at + Duration::seconds(60)).unwrap();
        assert!(at_horizon.matched);

        let stale = check_issued_code("123456", "123456", generated_at, generated_at + Duration::seconds(61)).unwrap();
        assert!(!stale.matched);
        assert!(stale.expired);
        assert_eq!(stale.score, 0);
        assert_eq!(stale.remaining_seconds, 0);

        let wrong = check_issued_code("654321", "123456", generated_at, generated_at).unwrap();
        assert!(!wrong.matched);
        assert!(!wrong.expired);

        assert!(check_issued_code("abc", "123456", generated_at, generated_at).is_err());
    }

    #[test]
    fn test_future_issued_code_is_expired() {
        let now = Utc::now();

        let far_future = check_issued_code("123456", "123456", now + Duration::days(365), now).unwrap();
        assert!(!far_future.matched);
        assert!(far_future.expired);
        assert_eq!(far_future.score, 0);
        assert_eq!(far_future.remaining_seconds, 0);

        let just_ahead = check_issued_code("123456", "123456", now + Duration::seconds(6), now).unwrap();
        assert!(just_ahead.expired);

        // Small drift between clocks is tolerated
        let skewed = check_issued_code("123456", "123456", now + Duration::seconds(3), now).unwrap();
        assert!(skewed.matched);
        assert!(!skewed.expired);
    }
}
