//! Notification emitter and the per-user notification list.
//!
//! `NotificationCenter` owns the in-memory list for one user: visible
//! notifications plus dismissed ones still inside the dedup window. The list
//! is what the duplicate guard checks and what the API serves. It is only
//! ever mutated after the corresponding store call succeeded, so a failed
//! user action leaves it untouched until the next refresh reconciles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classifier::Alert;
use super::guard::DuplicateGuard;
use crate::clock::Clock;
use crate::errors::AppError;
use crate::metrics::SCAN_METRICS;
use crate::models::notification::{NewNotification, Notification};
use crate::notification::webhook::WebhookNotifier;
use crate::store::{InsertOutcome, NotificationStore};

pub struct NotificationCenter {
    user_id: Uuid,
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    guard: DuplicateGuard,
    webhook: Option<WebhookNotifier>,
    /// Newest first. Includes recently dismissed records.
    list: RwLock<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new(
        user_id: Uuid,
        store: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        guard: DuplicateGuard,
    ) -> Self {
        Self {
            user_id,
            store,
            clock,
            guard,
            webhook: None,
            list: RwLock::new(Vec::new()),
        }
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Visible (non-dismissed) notifications, newest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.list
            .read()
            .await
            .iter()
            .filter(|n| n.is_visible())
            .cloned()
            .collect()
    }

    /// Always recomputed from the visible list.
    pub async fn unread_count(&self) -> usize {
        self.list
            .read()
            .await
            .iter()
            .filter(|n| n.is_visible() && !n.is_read)
            .count()
    }

    /// Has an equivalent alert already been recorded inside the window?
    pub async fn is_duplicate(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        let list = self.list.read().await;
        self.guard.is_duplicate(alert, &list, now)
    }

    /// Drop dismissed records that have aged out of the dedup window.
    /// They no longer block anything and the store would not return them.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.guard.cutoff(now);
        let mut list = self.list.write().await;
        let before = list.len();
        list.retain(|n| n.is_visible() || n.created_at >= cutoff);
        before - list.len()
    }

    /// Persist one notification and prepend it to the list.
    ///
    /// Returns `Ok(None)` when the store reports the alert already exists
    /// (another writer won the race inside the dedup window).
    pub async fn create_notification(
        &self,
        new: NewNotification,
    ) -> Result<Option<Notification>, AppError> {
        match self.store.insert(self.user_id, &new).await {
            InsertOutcome::Inserted(notification) => {
                self.list.write().await.insert(0, notification.clone());
                SCAN_METRICS.emitted(notification.r#type, notification.priority);
                if let Some(webhook) = &self.webhook {
                    webhook.dispatch(&notification);
                }
                debug!(
                    user_id = %self.user_id,
                    notification_id = %notification.id,
                    kind = notification.r#type.as_str(),
                    related_id = %notification.related_id,
                    "notification created"
                );
                Ok(Some(notification))
            }
            InsertOutcome::AlreadyExists => {
                SCAN_METRICS.suppressed(new.r#type, "conflict");
                debug!(
                    user_id = %self.user_id,
                    kind = new.r#type.as_str(),
                    related_id = %new.related_id,
                    "notification already exists inside dedup window, skipping"
                );
                Ok(None)
            }
            InsertOutcome::Failed(e) => Err(AppError::Internal(e)),
        }
    }

    /// Reload the list from the store.
    pub async fn refresh_notifications(&self) -> Result<usize, AppError> {
        let since = self.guard.cutoff(self.clock.now());
        let rows = self
            .store
            .list(self.user_id, since)
            .await
            .map_err(|e| self.action_failed("refresh_notifications", e))?;
        let count = rows.len();
        *self.list.write().await = rows;
        debug!(user_id = %self.user_id, count, "notifications refreshed");
        Ok(count)
    }

    pub async fn mark_as_read(&self, id: Uuid) -> Result<(), AppError> {
        let updated = self
            .store
            .mark_read(self.user_id, id)
            .await
            .map_err(|e| self.action_failed("mark_as_read", e))?
            .ok_or(AppError::NotificationNotFound)?;
        self.replace(updated).await;
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<u64, AppError> {
        let touched = self
            .store
            .mark_all_read(self.user_id)
            .await
            .map_err(|e| self.action_failed("mark_all_as_read", e))?;
        for n in self.list.write().await.iter_mut().filter(|n| n.is_visible()) {
            n.is_read = true;
        }
        Ok(touched)
    }

    /// Dismiss one notification. The record is kept for deduplication.
    pub async fn delete_notification(&self, id: Uuid) -> Result<(), AppError> {
        let updated = self
            .store
            .dismiss(self.user_id, id)
            .await
            .map_err(|e| self.action_failed("delete_notification", e))?
            .ok_or(AppError::NotificationNotFound)?;
        self.replace(updated).await;
        Ok(())
    }

    /// Dismiss every read notification.
    pub async fn delete_all_read(&self) -> Result<usize, AppError> {
        let (ids, at) = self
            .store
            .dismiss_read(self.user_id)
            .await
            .map_err(|e| self.action_failed("delete_all_read", e))?;
        let mut list = self.list.write().await;
        for n in list.iter_mut().filter(|n| ids.contains(&n.id)) {
            n.dismissed_at = Some(at);
            n.updated_at = at;
        }
        info!(user_id = %self.user_id, count = ids.len(), "read notifications cleared");
        Ok(ids.len())
    }

    async fn replace(&self, updated: Notification) {
        let mut list = self.list.write().await;
        match list.iter_mut().find(|n| n.id == updated.id) {
            Some(slot) => *slot = updated,
            None => {
                // Created elsewhere since the last refresh; keep newest-first order.
                let pos = list
                    .iter()
                    .position(|n| n.created_at < updated.created_at)
                    .unwrap_or(list.len());
                list.insert(pos, updated);
            }
        }
    }

    fn action_failed(&self, action: &'static str, e: anyhow::Error) -> AppError {
        warn!(user_id = %self.user_id, action, error = %e, "notification action failed");
        AppError::Internal(e)
    }
}
