//! In-process notification store.
//!
//! Mirrors the Postgres store's contract (rolling-window uniqueness, soft
//! dismissal, per-user scoping) so the engine can run without a database.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{InsertOutcome, NotificationStore};
use crate::clock::Clock;
use crate::models::notification::{NewNotification, Notification};

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    dedup_window: Duration,
    rows: Mutex<Vec<Notification>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>, dedup_window: Duration) -> Self {
        Self {
            clock,
            dedup_window,
            rows: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every insert for `related_id` fail with an I/O-style error.
    pub async fn fail_inserts_for(&self, related_id: &str) {
        self.failing.lock().await.insert(related_id.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    /// Every stored row, dismissed included, oldest first.
    pub async fn all(&self) -> Vec<Notification> {
        self.rows.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> InsertOutcome {
        if self.failing.lock().await.contains(&new.related_id) {
            return InsertOutcome::Failed(anyhow::anyhow!(
                "simulated store failure for {}",
                new.related_id
            ));
        }

        let now = self.clock.now();
        let cutoff = now - self.dedup_window;
        let mut rows = self.rows.lock().await;

        let conflict = rows.iter().any(|n| {
            n.user_id == user_id
                && n.r#type == new.r#type
                && n.related_id == new.related_id
                && n.created_at > cutoff
        });
        if conflict {
            return InsertOutcome::AlreadyExists;
        }

        let row = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: new.title.clone(),
            message: new.message.clone(),
            r#type: new.r#type,
            related_id: new.related_id.clone(),
            priority: new.priority,
            is_read: false,
            dismissed_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        InsertOutcome::Inserted(row)
    }

    async fn list(
        &self,
        user_id: Uuid,
        dismissed_since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Notification>> {
        let rows = self.rows.lock().await;
        let mut out: Vec<Notification> = rows
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| n.dismissed_at.is_none() || n.created_at >= dismissed_since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        Ok(rows
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.is_read = true;
                n.updated_at = now;
                n.clone()
            }))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let mut touched = 0;
        for n in rows
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.is_visible() && !n.is_read)
        {
            n.is_read = true;
            n.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn dismiss(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        Ok(rows
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                if n.dismissed_at.is_none() {
                    n.dismissed_at = Some(now);
                    n.updated_at = now;
                }
                n.clone()
            }))
    }

    async fn dismiss_read(&self, user_id: Uuid) -> anyhow::Result<(Vec<Uuid>, DateTime<Utc>)> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let mut ids = Vec::new();
        for n in rows
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.is_visible() && n.is_read)
        {
            n.dismissed_at = Some(now);
            n.updated_at = now;
            ids.push(n.id);
        }
        Ok((ids, now))
    }
}
