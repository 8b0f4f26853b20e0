//! Zalo delivery and token routes.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use zalo_oa::{BatchSummary, ErrorCategory, SendResult, TokenInfo};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::error::Error;
use crate::notification::NotificationEvent;

/// Upper bound on recipients per batch request.
pub const MAX_BATCH_RECIPIENTS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub user_id: String,
    pub text: String,
    /// Overrides the configured promotion attachment.
    #[serde(default)]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    #[serde(flatten)]
    pub result: SendResult,
    /// What the operator can do about a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub user_ids: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub user_ids: Vec<String>,
    pub event: NotificationEvent,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    /// Masked token, enough to tell tokens apart.
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub info: TokenInfo,
}

/// Create the Zalo router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send", post(send_message))
        .route("/batch", post(batch_send))
        .route("/notify", post(notify))
        .route("/token", get(token_info))
        .route("/token/refresh", post(refresh_token))
}

/// Map a failed send to an operator hint.
pub fn suggestion_for(result: &SendResult) -> Option<&'static str> {
    let code = result.error_code()?;
    match (ErrorCategory::from_code(code), code) {
        (ErrorCategory::RecipientNotEligible, zalo_oa::codes::USER_NOT_FOLLOWING) => Some(
            "The recipient does not follow the Official Account. Ask them to follow it, or configure a promotion attachment.",
        ),
        (ErrorCategory::RecipientNotEligible, _) => Some(
            "The recipient has not messaged the Official Account recently. Ask them to send a message first, or configure a promotion attachment.",
        ),
        (ErrorCategory::InvalidToken, _) => {
            Some("The access token was rejected. Check the refresh token and trigger a token refresh.")
        }
        (ErrorCategory::QuotaExceeded, _) => {
            Some("The promotion message quota is used up. Retry after the quota resets.")
        }
        _ => None,
    }
}

fn validate_user_id(user_id: &str) -> ApiResult<()> {
    if user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id must not be empty"));
    }
    Ok(())
}

fn validate_text(text: &str) -> ApiResult<()> {
    if text.trim().is_empty() {
        return Err(ApiError::validation("text must not be empty"));
    }
    Ok(())
}

fn validate_recipients(user_ids: &[String]) -> ApiResult<()> {
    if user_ids.is_empty() {
        return Err(ApiError::validation("user_ids must not be empty"));
    }
    if user_ids.len() > MAX_BATCH_RECIPIENTS {
        return Err(ApiError::validation(format!(
            "at most {} recipients per request, got {}",
            MAX_BATCH_RECIPIENTS,
            user_ids.len()
        )));
    }
    if let Some(index) = user_ids.iter().position(|id| id.trim().is_empty()) {
        return Err(ApiError::validation(format!(
            "user_ids[{}] must not be empty",
            index
        )));
    }
    Ok(())
}

/// Recipient ids as sent upstream: surrounding whitespace removed.
fn trimmed_ids(user_ids: &[String]) -> Vec<&str> {
    user_ids.iter().map(|id| id.trim()).collect()
}

fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> ApiResult<Json<SendResponse>> {
    validate_user_id(&request.user_id)?;
    validate_text(&request.text)?;

    let result = state
        .notifier
        .send_text(
            request.user_id.trim(),
            &request.text,
            request.attachment_id.as_deref().filter(|id| !id.is_empty()),
        )
        .await?;

    let suggestion = suggestion_for(&result);
    Ok(Json(SendResponse { result, suggestion }))
}

async fn batch_send(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Json<BatchSummary>> {
    validate_recipients(&request.user_ids)?;
    validate_text(&request.text)?;

    let summary = state
        .notifier
        .broadcast_text(
            &trimmed_ids(&request.user_ids),
            &request.text,
            request.attachment_id.as_deref().filter(|id| !id.is_empty()),
        )
        .await;

    Ok(Json(summary))
}

async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> ApiResult<Json<BatchSummary>> {
    validate_recipients(&request.user_ids)?;
    if request.event.class_name().trim().is_empty() {
        return Err(Error::validation("event.class_name must not be empty").into());
    }

    let summary = state
        .notifier
        .notify(&trimmed_ids(&request.user_ids), &request.event)
        .await;
    Ok(Json(summary))
}

async fn token_info(State(state): State<AppState>) -> Json<TokenInfo> {
    Json(state.tokens.get_token_info())
}

async fn refresh_token(State(state): State<AppState>) -> Json<RefreshResponse> {
    let outcome = state.tokens.force_refresh().await;

    Json(RefreshResponse {
        refreshed: outcome.refreshed,
        access_token: mask_token(&outcome.access_token),
        error: outcome.error,
        info: state.tokens.get_token_info(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use zalo_oa::DeliveryChannel;

    #[rstest]
    #[case(-230, true)]
    #[case(-213, true)]
    #[case(-216, true)]
    #[case(-124, true)]
    #[case(-32, true)]
    #[case(-201, false)]
    fn test_suggestion_for_failure(#[case] code: i64, #[case] expected: bool) {
        let result = SendResult::failed("u1", Some(code), "rejected");
        assert_eq!(suggestion_for(&result).is_some(), expected);
    }

    #[test]
    fn test_no_suggestion_on_success() {
        let result = SendResult::delivered("u1", DeliveryChannel::Consultation, None);
        assert!(suggestion_for(&result).is_none());
    }

    #[test]
    fn test_trimmed_ids() {
        let ids = vec![" u1".to_string(), "u2 ".to_string(), "u3".to_string()];
        assert_eq!(trimmed_ids(&ids), vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token(""), "");
        assert_eq!(mask_token("short"), "****");
        assert_eq!(mask_token("abcdefghijkl"), "****ijkl");
    }

    #[test]
    fn test_validate_recipients() {
        assert!(validate_recipients(&[]).is_err());
        assert!(validate_recipients(&["u1".to_string(), " ".to_string()]).is_err());
        assert!(validate_recipients(&vec!["u".to_string(); MAX_BATCH_RECIPIENTS + 1]).is_err());
        assert!(validate_recipients(&["u1".to_string()]).is_ok());
    }
}
