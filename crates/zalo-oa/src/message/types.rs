//! Send results and batch accounting.

use serde::Serialize;

/// Channel a message was delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    /// Free-tier consultation message.
    Consultation,
    /// Paid-tier promotion message; consumes one quota unit.
    Promotion,
}

impl DeliveryChannel {
    #[inline]
    pub fn is_billable(self) -> bool {
        matches!(self, Self::Promotion)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consultation => "consultation",
            Self::Promotion => "promotion",
        }
    }
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one recipient. Channel and billing only exist on delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered {
        channel: DeliveryChannel,
        message_id: Option<String>,
    },
    Failed {
        /// Upstream `error` code, when Zalo answered.
        error_code: Option<i64>,
        error: String,
    },
}

/// Result of delivering to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "SendResultView")]
pub struct SendResult {
    pub recipient_id: String,
    pub outcome: SendOutcome,
}

impl SendResult {
    pub fn delivered(
        recipient_id: impl Into<String>,
        channel: DeliveryChannel,
        message_id: Option<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            outcome: SendOutcome::Delivered {
                channel,
                message_id,
            },
        }
    }

    pub fn failed(
        recipient_id: impl Into<String>,
        error_code: Option<i64>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            outcome: SendOutcome::Failed {
                error_code,
                error: error.into(),
            },
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SendOutcome::Delivered { .. })
    }

    pub fn channel(&self) -> Option<DeliveryChannel> {
        match &self.outcome {
            SendOutcome::Delivered { channel, .. } => Some(*channel),
            SendOutcome::Failed { .. } => None,
        }
    }

    /// Whether this delivery consumed a paid quota unit.
    pub fn is_billable(&self) -> bool {
        self.channel().is_some_and(DeliveryChannel::is_billable)
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.outcome {
            SendOutcome::Failed { error_code, .. } => *error_code,
            SendOutcome::Delivered { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            SendOutcome::Failed { error, .. } => Some(error),
            SendOutcome::Delivered { .. } => None,
        }
    }
}

/// Flat wire shape for [`SendResult`].
#[derive(Serialize)]
struct SendResultView {
    recipient_id: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<DeliveryChannel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<SendResult> for SendResultView {
    fn from(result: SendResult) -> Self {
        match result.outcome {
            SendOutcome::Delivered {
                channel,
                message_id,
            } => Self {
                recipient_id: result.recipient_id,
                success: true,
                channel: Some(channel),
                billable: Some(channel.is_billable()),
                message_id,
                error_code: None,
                error: None,
            },
            SendOutcome::Failed { error_code, error } => Self {
                recipient_id: result.recipient_id,
                success: false,
                channel: None,
                billable: None,
                message_id: None,
                error_code,
                error: Some(error),
            },
        }
    }
}

/// Aggregate of a batch send.
///
/// `success + failed == total` and
/// `consultation_count + promotion_count == success` hold once every
/// recipient has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub consultation_count: usize,
    pub promotion_count: usize,
    /// Deliveries that consumed paid quota.
    pub billable_count: usize,
    pub results: Vec<SendResult>,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
            ..Default::default()
        }
    }

    pub fn record(&mut self, result: SendResult) {
        match result.channel() {
            Some(channel) => {
                self.success += 1;
                match channel {
                    DeliveryChannel::Consultation => self.consultation_count += 1,
                    DeliveryChannel::Promotion => self.promotion_count += 1,
                }
                if channel.is_billable() {
                    self.billable_count += 1;
                }
            }
            None => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Recipients that failed, for resubmission.
    pub fn failed_recipients(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.recipient_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_view() {
        let result = SendResult::delivered("u1", DeliveryChannel::Promotion, Some("m1".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "recipient_id": "u1",
                "success": true,
                "channel": "promotion",
                "billable": true,
                "message_id": "m1"
            })
        );
    }

    #[test]
    fn test_failed_view_has_no_channel() {
        let result = SendResult::failed("u2", Some(-201), "invalid parameter");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], -201);
        assert!(json.get("channel").is_none());
        assert!(json.get("billable").is_none());
        assert!(!result.is_billable());
    }

    #[test]
    fn test_batch_summary_counts() {
        let mut summary = BatchSummary::new(4);
        summary.record(SendResult::delivered("a", DeliveryChannel::Consultation, None));
        summary.record(SendResult::delivered("b", DeliveryChannel::Promotion, None));
        summary.record(SendResult::failed("c", None, "network"));
        summary.record(SendResult::delivered("d", DeliveryChannel::Promotion, None));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.consultation_count, 1);
        assert_eq!(summary.promotion_count, 2);
        assert_eq!(summary.billable_count, 2);
        assert_eq!(summary.success + summary.failed, summary.total);
        assert_eq!(summary.failed_recipients(), vec!["c"]);
    }
}
