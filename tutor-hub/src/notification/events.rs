//! School events that trigger a Zalo notification.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A new assignment was posted to a class.
    AssignmentPublished {
        class_name: String,
        title: String,
        #[serde(default)]
        due_at: Option<DateTime<Utc>>,
    },
    /// An assignment deadline is approaching.
    AssignmentDueSoon {
        class_name: String,
        title: String,
        due_at: DateTime<Utc>,
    },
    /// A student missed a class session.
    StudentAbsent {
        student_name: String,
        class_name: String,
        session_date: NaiveDate,
    },
    /// A document or video was added to the class materials.
    MaterialUploaded { class_name: String, title: String },
    /// Free-form message from the tutor.
    ClassAnnouncement { class_name: String, message: String },
}

impl NotificationEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AssignmentPublished { .. } => "assignment_published",
            Self::AssignmentDueSoon { .. } => "assignment_due_soon",
            Self::StudentAbsent { .. } => "student_absent",
            Self::MaterialUploaded { .. } => "material_uploaded",
            Self::ClassAnnouncement { .. } => "class_announcement",
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::AssignmentPublished { class_name, .. }
            | Self::AssignmentDueSoon { class_name, .. }
            | Self::StudentAbsent { class_name, .. }
            | Self::MaterialUploaded { class_name, .. }
            | Self::ClassAnnouncement { class_name, .. } => class_name,
        }
    }

    /// Get a human-readable title for this event.
    pub fn title(&self) -> String {
        match self {
            Self::AssignmentPublished { class_name, .. } => {
                format!("📝 Bài tập mới - {}", class_name)
            }
            Self::AssignmentDueSoon { class_name, .. } => {
                format!("⏰ Sắp đến hạn nộp bài - {}", class_name)
            }
            Self::StudentAbsent { class_name, .. } => {
                format!("⚠️ Thông báo vắng học - {}", class_name)
            }
            Self::MaterialUploaded { class_name, .. } => {
                format!("📚 Tài liệu mới - {}", class_name)
            }
            Self::ClassAnnouncement { class_name, .. } => {
                format!("📢 Thông báo - {}", class_name)
            }
        }
    }

    /// Get a detailed description of this event.
    pub fn description(&self) -> String {
        match self {
            Self::AssignmentPublished { title, due_at, .. } => match due_at {
                Some(due) => format!("{}\nHạn nộp: {}", title, format_local(due)),
                None => title.clone(),
            },
            Self::AssignmentDueSoon { title, due_at, .. } => {
                format!("{}\nHạn nộp: {}", title, format_local(due_at))
            }
            Self::StudentAbsent {
                student_name,
                session_date,
                ..
            } => format!(
                "Học sinh {} vắng mặt buổi học ngày {}.",
                student_name,
                session_date.format("%d/%m/%Y")
            ),
            Self::MaterialUploaded { title, .. } => title.clone(),
            Self::ClassAnnouncement { message, .. } => message.clone(),
        }
    }

    /// Full message text sent to the recipient.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.title(), self.description())
    }
}

fn format_local(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M %d/%m/%Y").to_string()
}
