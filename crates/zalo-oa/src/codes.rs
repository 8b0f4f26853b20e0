//! Zalo OpenAPI error codes.
//!
//! The send endpoints report outcome through a numeric `error` field. Only
//! [`ErrorCategory::RecipientNotEligible`] drives control flow: it is the
//! signal that the free consultation channel is closed for this recipient and
//! the paid promotion channel should be tried instead.

use serde::Serialize;

/// Success.
pub const SUCCESS: i64 = 0;

/// Recipient does not follow the OA (has not opted in).
pub const USER_NOT_FOLLOWING: i64 = -213;

/// Recipient has not interacted with the OA inside the consultation window.
pub const USER_OUTSIDE_INTERACTION_WINDOW: i64 = -230;

/// Codes that close the free channel for one recipient.
pub const RECIPIENT_NOT_ELIGIBLE_CODES: &[i64] =
    &[USER_NOT_FOLLOWING, USER_OUTSIDE_INTERACTION_WINDOW];

/// Access token is invalid or expired.
pub const INVALID_ACCESS_TOKEN: i64 = -216;

/// Access token rejected by the gateway.
pub const ACCESS_TOKEN_REJECTED: i64 = -124;

/// OA has exhausted its message quota.
pub const QUOTA_EXCEEDED: i64 = -32;

/// Classification of an upstream error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Success,
    /// Free channel unavailable for this recipient; paid fallback allowed.
    RecipientNotEligible,
    InvalidToken,
    QuotaExceeded,
    Other,
}

impl ErrorCategory {
    /// Classify a raw `error` value.
    pub fn from_code(code: i64) -> Self {
        match code {
            SUCCESS => Self::Success,
            c if RECIPIENT_NOT_ELIGIBLE_CODES.contains(&c) => Self::RecipientNotEligible,
            INVALID_ACCESS_TOKEN | ACCESS_TOKEN_REJECTED => Self::InvalidToken,
            QUOTA_EXCEEDED => Self::QuotaExceeded,
            _ => Self::Other,
        }
    }

    #[inline]
    pub fn allows_paid_fallback(self) -> bool {
        matches!(self, Self::RecipientNotEligible)
    }
}
