use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a notification. Together with `related_id` it forms the dedup key.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum NotificationType {
    Task,
    Goal,
    Event,
    Meeting,
    /// One-time challenge completion alert.
    Performance,
    /// Recurring challenge deadline / progress alert.
    Challenge,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Task => "task",
            NotificationType::Goal => "goal",
            NotificationType::Event => "event",
            NotificationType::Meeting => "meeting",
            NotificationType::Performance => "performance",
            NotificationType::Challenge => "challenge",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub r#type: NotificationType, // 'type' is a reserved keyword
    pub related_id: String,
    pub priority: Priority,
    pub is_read: bool,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Visible notifications are the ones the user has not dismissed.
    pub fn is_visible(&self) -> bool {
        self.dismissed_at.is_none()
    }
}

/// The fields a caller supplies when creating a notification.
/// Identity, ownership and timestamps are assigned by the store.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub r#type: NotificationType,
    pub related_id: String,
    pub priority: Priority,
}
