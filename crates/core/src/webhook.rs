//! Webhook signing, retry backoff, and delivery state rules.
//!
//! The dispatcher in `leadq-events` owns I/O; everything here is pure so the
//! retry discipline can be tested without a clock or a network.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A lead received a new qualification result.
pub const EVENT_LEAD_QUALIFIED: &str = "lead.qualified";

/// A lead's label differs from its previous current label.
pub const EVENT_LEAD_LABEL_CHANGED: &str = "lead.label_changed";

/// A scoring model version became active.
pub const EVENT_MODEL_ACTIVATED: &str = "model.activated";

pub const KNOWN_EVENTS: &[&str] = &[
    EVENT_LEAD_QUALIFIED,
    EVENT_LEAD_LABEL_CHANGED,
    EVENT_MODEL_ACTIVATED,
];

// ---------------------------------------------------------------------------
// Wire contract
// ---------------------------------------------------------------------------

/// Header carrying `sha256=<hex hmac of the raw body>`.
pub const SIGNATURE_HEADER: &str = "X-Leadq-Signature";

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Leadq-Event";

/// Header carrying the delivery id; receivers deduplicate on it.
pub const DELIVERY_HEADER: &str = "X-Leadq-Delivery";

/// Stored response bodies are truncated to this many bytes.
pub const MAX_RESPONSE_BODY_LEN: usize = 2048;

/// JSON body posted to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `body` keyed with the subscription secret, hex encoded.
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Value for [`SIGNATURE_HEADER`].
pub fn signature_header_value(secret: &str, body: &[u8]) -> Result<String, CoreError> {
    Ok(format!("sha256={}", compute_signature(secret, body)?))
}

/// Constant-time check of a received [`SIGNATURE_HEADER`] value.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Some(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

/// Truncate a subscriber response body for storage on a char boundary.
pub fn truncate_response_body(body: &str) -> String {
    if body.len() <= MAX_RESPONSE_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_RESPONSE_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

// ---------------------------------------------------------------------------
// Delivery status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for its first attempt or for `next_retry_at`.
    Pending,
    /// Claimed by a worker under a lease.
    InFlight,
    Delivered,
    /// Attempts exhausted. Terminal.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_BACKOFF_BASE_SECS: i64 = 30;
pub const DEFAULT_BACKOFF_MAX_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_secs: i64,
    pub max_backoff_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_secs: DEFAULT_BACKOFF_BASE_SECS,
            max_backoff_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

/// What to do with a delivery after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    Retry {
        attempt_count: i32,
        next_retry_at: Timestamp,
    },
    Exhausted {
        attempt_count: i32,
    },
}

impl RetryPolicy {
    /// Backoff after the `attempt_count`-th failure:
    /// `base * 2^(attempt_count - 1)`, capped.
    pub fn delay_secs(&self, attempt_count: i32) -> i64 {
        let exponent = attempt_count.saturating_sub(1).clamp(0, 32) as u32;
        self.base_secs
            .saturating_mul(2i64.saturating_pow(exponent))
            .min(self.max_backoff_secs)
    }

    /// Transition for a delivery whose attempt just failed, given the
    /// attempt count recorded *before* this attempt and the cap stored on
    /// the delivery row. `max_attempts` only seeds new rows; a row keeps the
    /// cap it was created with.
    pub fn after_failure(
        &self,
        previous_attempts: i32,
        row_max_attempts: i32,
        now: Timestamp,
    ) -> FailureTransition {
        let cap = row_max_attempts.max(1);
        let attempt_count = (previous_attempts + 1).min(cap);
        if attempt_count >= cap {
            FailureTransition::Exhausted { attempt_count }
        } else {
            FailureTransition::Retry {
                attempt_count,
                next_retry_at: now + Duration::seconds(self.delay_secs(attempt_count)),
            }
        }
    }
}

/// Only 2xx counts as delivered.
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn signature_is_hex_and_verifiable() {
        let body = br#"{"event":"lead.qualified"}"#;
        let sig = compute_signature("whsec", body).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        let header = signature_header_value("whsec", body).unwrap();
        assert!(verify_signature("whsec", body, &header));
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("whsec", b"tampered", &header));
        assert!(!verify_signature("whsec", body, "md5=abc"));
    }

    #[test]
    fn signature_differs_per_secret() {
        let a = compute_signature("a", b"payload").unwrap();
        let b = compute_signature("b", b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_secs(1), 30);
        assert_eq!(policy.delay_secs(2), 60);
        assert_eq!(policy.delay_secs(4), 240);
        assert_eq!(policy.delay_secs(12), 3600);
        assert_eq!(policy.delay_secs(1000), 3600);
    }

    #[test]
    fn failures_schedule_retries_until_exhausted() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            policy.after_failure(0, 5, now),
            FailureTransition::Retry {
                attempt_count: 1,
                next_retry_at: now + Duration::seconds(30),
            }
        );
        assert_eq!(
            policy.after_failure(3, 5, now),
            FailureTransition::Retry {
                attempt_count: 4,
                next_retry_at: now + Duration::seconds(240),
            }
        );
        assert_eq!(
            policy.after_failure(4, 5, now),
            FailureTransition::Exhausted { attempt_count: 5 }
        );
        // Never exceeds the cap even if asked past it.
        assert_eq!(
            policy.after_failure(9, 5, now),
            FailureTransition::Exhausted { attempt_count: 5 }
        );
    }

    #[test]
    fn row_cap_wins_over_policy_cap() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        // Row created under a lower cap than the current policy.
        assert_eq!(
            policy.after_failure(1, 2, now),
            FailureTransition::Exhausted { attempt_count: 2 }
        );
        // Row created under a higher cap keeps retrying past the policy cap.
        assert!(matches!(
            policy.after_failure(5, 8, now),
            FailureTransition::Retry { attempt_count: 6, .. }
        ));
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(is_success_status(200));
        assert!(is_success_status(204));
        assert!(!is_success_status(301));
        assert!(!is_success_status(500));
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(!DeliveryStatus::InFlight.is_terminal());
        assert_eq!("in_flight".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::InFlight);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(MAX_RESPONSE_BODY_LEN);
        let stored = truncate_response_body(&body);
        assert!(stored.len() <= MAX_RESPONSE_BODY_LEN);
        assert_eq!(truncate_response_body("ok"), "ok");
    }
}
