//! Zalo notifications for school events.
//!
//! Events are rendered to plain text and delivered through
//! [`zalo_oa::SmartSender`], so each recipient is reached through the free
//! consultation channel when possible and through the configured promotion
//! attachment otherwise.
//!
//! # Example
//!
//! ```ignore
//! use tutor_hub::notification::{NotificationEvent, ZaloNotifier};
//!
//! let notifier = ZaloNotifier::new(client.sender().clone(), Some("attachment-id".into()));
//! let summary = notifier
//!     .notify(&["user-1", "user-2"], &NotificationEvent::ClassAnnouncement {
//!         class_name: "Toán 9A".into(),
//!         message: "Lớp nghỉ ngày mai".into(),
//!     })
//!     .await;
//! ```

pub mod events;
pub mod service;

pub use events::NotificationEvent;
pub use service::ZaloNotifier;
