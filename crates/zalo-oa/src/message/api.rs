//! Zalo OA message endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ZaloConfig;
use crate::error::{Result, ZaloError};
use crate::http_client::read_json;

/// Free-tier consultation endpoint.
pub const CONSULTATION_PATH: &str = "/v3.0/oa/message/cs";

/// Paid-tier promotion endpoint.
pub const PROMOTION_PATH: &str = "/v3.0/oa/message/promotion";

/// Decoded send envelope. A non-zero `error` is returned as data, not as
/// `Err`, because the sender branches on it. A reply without `error` is a
/// decode error, never a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub error: i64,
    pub message: String,
    pub message_id: Option<String>,
}

impl MessageResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error == 0
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    message_id: Option<String>,
}

impl TryFrom<Envelope> for MessageResponse {
    type Error = ZaloError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        let error = envelope
            .error
            .ok_or_else(|| ZaloError::Decode("response has no `error` code".to_string()))?;

        Ok(Self {
            error,
            message: envelope.message.unwrap_or_default(),
            message_id: envelope.data.and_then(|d| d.message_id),
        })
    }
}

/// Outbound message calls.
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Send a plain text through the free consultation channel.
    async fn send_consultation(
        &self,
        access_token: &str,
        user_id: &str,
        text: &str,
    ) -> Result<MessageResponse>;

    /// Send a promotion message referencing an uploaded attachment.
    async fn send_promotion(
        &self,
        access_token: &str,
        user_id: &str,
        attachment_id: &str,
    ) -> Result<MessageResponse>;
}

pub(crate) fn consultation_payload(user_id: &str, text: &str) -> Value {
    json!({
        "recipient": { "user_id": user_id },
        "message": { "text": text },
    })
}

pub(crate) fn promotion_payload(user_id: &str, attachment_id: &str) -> Value {
    json!({
        "recipient": { "user_id": user_id },
        "message": {
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "promotion",
                    "elements": [
                        { "attachment_id": attachment_id }
                    ],
                },
            },
        },
    })
}

/// [`MessageApi`] over HTTP.
pub struct HttpMessageApi {
    client: Client,
    consultation_url: String,
    promotion_url: String,
}

impl HttpMessageApi {
    pub fn new(client: Client, config: &ZaloConfig) -> Self {
        Self {
            client,
            consultation_url: config.openapi_url(CONSULTATION_PATH),
            promotion_url: config.openapi_url(PROMOTION_PATH),
        }
    }

    async fn post(
        &self,
        url: &str,
        access_token: &str,
        payload: &Value,
    ) -> Result<MessageResponse> {
        let response = self
            .client
            .post(url)
            .header("access_token", access_token)
            .json(payload)
            .send()
            .await?;

        let envelope: Envelope = read_json(response).await?;
        let response = MessageResponse::try_from(envelope)?;
        debug!(url, error = response.error, "Zalo message endpoint replied");
        Ok(response)
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn send_consultation(
        &self,
        access_token: &str,
        user_id: &str,
        text: &str,
    ) -> Result<MessageResponse> {
        let payload = consultation_payload(user_id, text);
        self.post(&self.consultation_url, access_token, &payload)
            .await
    }

    async fn send_promotion(
        &self,
        access_token: &str,
        user_id: &str,
        attachment_id: &str,
    ) -> Result<MessageResponse> {
        let payload = promotion_payload(user_id, attachment_id);
        self.post(&self.promotion_url, access_token, &payload).await
    }
}
