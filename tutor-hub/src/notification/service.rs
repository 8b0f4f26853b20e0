//! Delivery of school events through the Zalo OA.

use tracing::info;
use zalo_oa::{BatchSummary, SendResult, SmartSender};

use super::events::NotificationEvent;
use crate::error::Result;

/// Sends rendered events with the configured promotion attachment as the
/// paid fallback.
#[derive(Clone)]
pub struct ZaloNotifier {
    sender: SmartSender,
    attachment_id: Option<String>,
}

impl ZaloNotifier {
    pub fn new(sender: SmartSender, attachment_id: Option<String>) -> Self {
        Self {
            sender,
            attachment_id: attachment_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Attachment used when a recipient cannot receive free messages.
    pub fn attachment_id(&self) -> Option<&str> {
        self.attachment_id.as_deref()
    }

    pub fn sender(&self) -> &SmartSender {
        &self.sender
    }

    /// Send `text` to one recipient. An explicit `attachment_id` overrides
    /// the configured one.
    pub async fn send_text(
        &self,
        user_id: &str,
        text: &str,
        attachment_id: Option<&str>,
    ) -> Result<SendResult> {
        let attachment = attachment_id.or(self.attachment_id());
        Ok(self
            .sender
            .send_smart_message(user_id, text, attachment)
            .await?)
    }

    /// Send `text` to every recipient in order.
    pub async fn broadcast_text<S: AsRef<str>>(
        &self,
        user_ids: &[S],
        text: &str,
        attachment_id: Option<&str>,
    ) -> BatchSummary {
        let attachment = attachment_id.or(self.attachment_id());
        self.sender
            .batch_smart_send(user_ids, text, attachment)
            .await
    }

    /// Render `event` and send it to every recipient.
    pub async fn notify<S: AsRef<str>>(
        &self,
        user_ids: &[S],
        event: &NotificationEvent,
    ) -> BatchSummary {
        let text = event.render();
        let summary = self.broadcast_text(user_ids, &text, None).await;

        info!(
            event_type = event.event_type(),
            class = event.class_name(),
            recipients = summary.total,
            delivered = summary.success,
            billable = summary.billable_count,
            "Notification sent"
        );

        summary
    }
}
