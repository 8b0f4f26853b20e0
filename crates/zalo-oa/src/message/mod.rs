//! Tiered message delivery.
//!
//! A text goes out through the free consultation channel first. When Zalo
//! rejects it because the recipient is outside the interaction window (or does
//! not follow the OA), the same recipient is reached through a paid promotion
//! message built from a pre-uploaded attachment.

mod api;
mod sender;
mod types;

pub use api::{CONSULTATION_PATH, HttpMessageApi, MessageApi, MessageResponse, PROMOTION_PATH};
pub use sender::{MISSING_ATTACHMENT_ERROR, SmartSender};
pub use types::{BatchSummary, DeliveryChannel, SendOutcome, SendResult};
