//! Free-first delivery with paid fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::api::{MessageApi, MessageResponse};
use super::types::{BatchSummary, DeliveryChannel, SendResult};
use crate::codes::ErrorCategory;
use crate::config::DEFAULT_BATCH_DELAY;
use crate::error::Result;
use crate::token::AccessTokenProvider;

/// Error text recorded when fallback is required but no attachment was given.
pub const MISSING_ATTACHMENT_ERROR: &str =
    "Recipient is not eligible for consultation messages and no promotion attachment was provided";

/// Sends messages through the cheapest channel available for each recipient.
///
/// The paid promotion channel is only used when the consultation attempt is
/// rejected with a [`ErrorCategory::RecipientNotEligible`] code.
#[derive(Clone)]
pub struct SmartSender {
    tokens: Arc<dyn AccessTokenProvider>,
    api: Arc<dyn MessageApi>,
    batch_delay: Duration,
}

impl SmartSender {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>, api: Arc<dyn MessageApi>) -> Self {
        Self {
            tokens,
            api,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    /// Pause inserted between consecutive batch sends.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    /// Deliver `text` to one recipient, falling back to a promotion message
    /// when the recipient cannot receive consultation messages.
    ///
    /// Returns `Err` only when a request could not complete. Upstream
    /// rejections are reported as a failed [`SendResult`].
    pub async fn send_smart_message(
        &self,
        user_id: &str,
        text: &str,
        attachment_id: Option<&str>,
    ) -> Result<SendResult> {
        let access_token = self.tokens.access_token().await;

        let response = self
            .api
            .send_consultation(&access_token, user_id, text)
            .await?;

        let category = ErrorCategory::from_code(response.error);
        if category == ErrorCategory::Success {
            debug!(user_id, "Delivered via consultation");
            return Ok(delivered(user_id, DeliveryChannel::Consultation, response));
        }

        if !category.allows_paid_fallback() {
            warn!(
                user_id,
                code = response.error,
                ?category,
                "Consultation send rejected: {}",
                response.message
            );
            return Ok(rejected(user_id, response));
        }

        let Some(attachment_id) = attachment_id.filter(|id| !id.is_empty()) else {
            warn!(
                user_id,
                code = response.error,
                "Recipient not eligible for consultation and no promotion attachment given"
            );
            return Ok(SendResult::failed(
                user_id,
                Some(response.error),
                MISSING_ATTACHMENT_ERROR,
            ));
        };

        info!(
            user_id,
            code = response.error,
            "Recipient not eligible for consultation, falling back to promotion"
        );

        let response = self
            .api
            .send_promotion(&access_token, user_id, attachment_id)
            .await?;

        if response.is_success() {
            debug!(user_id, "Delivered via promotion");
            Ok(delivered(user_id, DeliveryChannel::Promotion, response))
        } else {
            warn!(
                user_id,
                code = response.error,
                "Promotion send rejected: {}",
                response.message
            );
            Ok(rejected(user_id, response))
        }
    }

    /// Deliver through the consultation channel only. Never consumes quota.
    pub async fn send_consultation(&self, user_id: &str, text: &str) -> Result<SendResult> {
        let access_token = self.tokens.access_token().await;
        let response = self
            .api
            .send_consultation(&access_token, user_id, text)
            .await?;

        if response.is_success() {
            Ok(delivered(user_id, DeliveryChannel::Consultation, response))
        } else {
            Ok(rejected(user_id, response))
        }
    }

    /// Send to each recipient in order, one at a time.
    ///
    /// Never fails: errors for a recipient are recorded in its result and the
    /// batch continues with the next one.
    pub async fn batch_smart_send<S: AsRef<str>>(
        &self,
        user_ids: &[S],
        text: &str,
        attachment_id: Option<&str>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::new(user_ids.len());

        for (index, user_id) in user_ids.iter().enumerate() {
            let user_id = user_id.as_ref();
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let result = match self.send_smart_message(user_id, text, attachment_id).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(user_id, error = %e, "Send failed");
                    SendResult::failed(user_id, e.code(), e.to_string())
                }
            };
            summary.record(result);
        }

        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            consultation = summary.consultation_count,
            promotion = summary.promotion_count,
            billable = summary.billable_count,
            "Batch send finished"
        );

        summary
    }
}

fn delivered(user_id: &str, channel: DeliveryChannel, response: MessageResponse) -> SendResult {
    SendResult::delivered(user_id, channel, response.message_id)
}

fn rejected(user_id: &str, response: MessageResponse) -> SendResult {
    let error = if response.message.is_empty() {
        format!("Zalo error {}", response.error)
    } else {
        response.message
    };
    SendResult::failed(user_id, Some(response.error), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{
        INVALID_ACCESS_TOKEN, USER_NOT_FOLLOWING, USER_OUTSIDE_INTERACTION_WINDOW,
    };
    use crate::error::ZaloError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::collections::HashMap;

    struct StaticToken(&'static str);

    #[async_trait]
    impl AccessTokenProvider for StaticToken {
        async fn access_token(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Consultation { token: String, user_id: String },
        Promotion { user_id: String, attachment_id: String },
    }

    #[derive(Clone, Copy)]
    enum Reply {
        Code(i64),
        Transport,
    }

    #[derive(Default)]
    struct FakeApi {
        consultation: HashMap<&'static str, Reply>,
        promotion: HashMap<&'static str, Reply>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeApi {
        fn consultation(mut self, user_id: &'static str, reply: Reply) -> Self {
            self.consultation.insert(user_id, reply);
            self
        }

        fn promotion(mut self, user_id: &'static str, reply: Reply) -> Self {
            self.promotion.insert(user_id, reply);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn promotion_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Promotion { .. }))
                .count()
        }

        fn reply(reply: Option<&Reply>, prefix: &str, user_id: &str) -> Result<MessageResponse> {
            match reply.copied().unwrap_or(Reply::Code(0)) {
                Reply::Code(0) => Ok(MessageResponse {
                    error: 0,
                    message: "Success".to_string(),
                    message_id: Some(format!("{prefix}-{user_id}")),
                }),
                Reply::Code(code) => Ok(MessageResponse {
                    error: code,
                    message: format!("rejected with {code}"),
                    message_id: None,
                }),
                Reply::Transport => Err(ZaloError::Decode("connection reset".to_string())),
            }
        }
    }

    #[async_trait]
    impl MessageApi for FakeApi {
        async fn send_consultation(
            &self,
            access_token: &str,
            user_id: &str,
            _text: &str,
        ) -> Result<MessageResponse> {
            self.calls.lock().push(Call::Consultation {
                token: access_token.to_string(),
                user_id: user_id.to_string(),
            });
            Self::reply(self.consultation.get(user_id), "cs", user_id)
        }

        async fn send_promotion(
            &self,
            _access_token: &str,
            user_id: &str,
            attachment_id: &str,
        ) -> Result<MessageResponse> {
            self.calls.lock().push(Call::Promotion {
                user_id: user_id.to_string(),
                attachment_id: attachment_id.to_string(),
            });
            Self::reply(self.promotion.get(user_id), "promo", user_id)
        }
    }

    fn sender(api: &Arc<FakeApi>) -> SmartSender {
        SmartSender::new(Arc::new(StaticToken("at-1")), api.clone())
            .with_batch_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_consultation_success_is_free() {
        let api = Arc::new(FakeApi::default());

        let result = sender(&api)
            .send_smart_message("u1", "hello", Some("att"))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.channel(), Some(DeliveryChannel::Consultation));
        assert!(!result.is_billable());
        assert_eq!(
            api.calls(),
            vec![Call::Consultation {
                token: "at-1".to_string(),
                user_id: "u1".to_string()
            }]
        );
    }

    #[rstest]
    #[case(USER_NOT_FOLLOWING)]
    #[case(USER_OUTSIDE_INTERACTION_WINDOW)]
    #[tokio::test]
    async fn test_ineligible_falls_back_to_promotion(#[case] code: i64) {
        let api = Arc::new(FakeApi::default().consultation("u1", Reply::Code(code)));

        let result = sender(&api)
            .send_smart_message("u1", "hello", Some("att-1"))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.channel(), Some(DeliveryChannel::Promotion));
        assert!(result.is_billable());
        assert_eq!(
            api.calls()[1],
            Call::Promotion {
                user_id: "u1".to_string(),
                attachment_id: "att-1".to_string()
            }
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[tokio::test]
    async fn test_ineligible_without_attachment_fails(#[case] attachment: Option<&str>) {
        let api = Arc::new(FakeApi::default().consultation("u1", Reply::Code(-230)));

        let result = sender(&api)
            .send_smart_message("u1", "hello", attachment)
            .await
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some(-230));
        assert!(result.error().unwrap().contains("attachment"));
        assert_eq!(api.promotion_calls(), 0);
    }

    #[rstest]
    #[case(-201)]
    #[case(INVALID_ACCESS_TOKEN)]
    #[case(-32)]
    #[tokio::test]
    async fn test_other_codes_never_pay(#[case] code: i64) {
        let api = Arc::new(FakeApi::default().consultation("u1", Reply::Code(code)));

        let result = sender(&api)
            .send_smart_message("u1", "hello", Some("att"))
            .await
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some(code));
        assert_eq!(api.promotion_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_promotion_is_terminal() {
        let api = Arc::new(
            FakeApi::default()
                .consultation("u1", Reply::Code(-213))
                .promotion("u1", Reply::Code(-32)),
        );

        let result = sender(&api)
            .send_smart_message("u1", "hello", Some("att"))
            .await
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some(-32));
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let api = Arc::new(FakeApi::default().consultation("u1", Reply::Transport));

        let err = sender(&api)
            .send_smart_message("u1", "hello", Some("att"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZaloError::Decode(_)));
    }

    #[tokio::test]
    async fn test_send_consultation_never_falls_back() {
        let api = Arc::new(FakeApi::default().consultation("u1", Reply::Code(-230)));

        let result = sender(&api).send_consultation("u1", "hello").await.unwrap();

        assert!(!result.is_success());
        assert_eq!(api.promotion_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_transport_failure() {
        let api = Arc::new(FakeApi::default().consultation("u2", Reply::Transport));

        let summary = sender(&api)
            .batch_smart_send(&["u1", "u2", "u3"], "hello", None)
            .await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed_recipients(), vec!["u2"]);
        let ids: Vec<_> = summary
            .results
            .iter()
            .map(|r| r.recipient_id.as_str())
            .collect();
        assert_eq!(ids, vec!["u1", "u2", "u3"]);
        assert!(!summary.results[1].is_success());
    }

    #[tokio::test]
    async fn test_batch_accounting() {
        let api = Arc::new(
            FakeApi::default()
                .consultation("u2", Reply::Code(-213))
                .consultation("u3", Reply::Code(-230))
                .promotion("u3", Reply::Code(-32))
                .consultation("u4", Reply::Code(-201))
                .consultation("u5", Reply::Code(-230)),
        );

        let summary = sender(&api)
            .batch_smart_send(&["u1", "u2", "u3", "u4", "u5"], "hello", Some("att"))
            .await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.success, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.consultation_count, 1);
        assert_eq!(summary.promotion_count, 2);
        assert_eq!(summary.billable_count, 2);
        assert_eq!(summary.success + summary.failed, summary.total);
        assert_eq!(
            summary.consultation_count + summary.promotion_count,
            summary.success
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let api = Arc::new(FakeApi::default());
        let summary = sender(&api)
            .batch_smart_send::<&str>(&[], "hello", None)
            .await;

        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_only_between_sends() {
        let api = Arc::new(FakeApi::default());
        let sender = sender(&api).with_batch_delay(Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        sender
            .batch_smart_send(&["u1", "u2", "u3"], "hello", None)
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(600));
    }
}
