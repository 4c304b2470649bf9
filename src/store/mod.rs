pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::notification::{NewNotification, Notification};

/// Result of a notification insert.
///
/// A uniqueness conflict is an expected outcome (another writer got there
/// first inside the dedup window), so it is reported as `AlreadyExists`
/// rather than folded into `Failed`.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Notification),
    AlreadyExists,
    Failed(anyhow::Error),
}

/// Durable record of every notification ever created.
/// Implementations: PgStore (Postgres), MemoryStore (tests / local runs).
///
/// Every call is scoped to `user_id`; implementations must never touch another
/// user's rows.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification, refusing when a record with the same
    /// `(type, related_id)` was created for this user within the dedup window.
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> InsertOutcome;

    /// Everything the engine needs in memory: all visible notifications plus
    /// dismissed ones created at or after `dismissed_since`. Newest first.
    async fn list(
        &self,
        user_id: Uuid,
        dismissed_since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Notification>>;

    /// Returns the updated record, or `None` if it does not exist for this user.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>>;

    /// Marks every visible unread notification read. Returns the rows touched.
    async fn mark_all_read(&self, user_id: Uuid) -> anyhow::Result<u64>;

    /// Sets `dismissed_at`. Returns the updated record, or `None` if unknown.
    async fn dismiss(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>>;

    /// Dismisses every visible notification that is already read.
    /// Returns the ids that were dismissed together with the dismissal time.
    async fn dismiss_read(&self, user_id: Uuid) -> anyhow::Result<(Vec<Uuid>, DateTime<Utc>)>;
}
