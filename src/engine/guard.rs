//! Duplicate guard: suppresses re-alerting the same item inside the dedup window.
//!
//! Advisory only: it saves a store round-trip when the in-memory list already
//! shows a recent alert. The store's insert is the authoritative check.

use chrono::{DateTime, Duration, Utc};

use super::classifier::{Alert, COMPLETION_MARKER};
use crate::models::notification::Notification;

/// Default rolling window inside which an item is alerted at most once.
pub const DEFAULT_DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard {
    window: Duration,
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_DEDUP_WINDOW_HOURS))
    }
}

impl DuplicateGuard {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Oldest `created_at` that still counts as recent at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// True if `known` (dismissed records included) already holds an alert
    /// equivalent to `alert` created within the window.
    pub fn is_duplicate(&self, alert: &Alert, known: &[Notification], now: DateTime<Utc>) -> bool {
        let cutoff = self.cutoff(now);
        known.iter().any(|n| {
            n.r#type == alert.r#type
                && n.related_id == alert.related_id
                && n.created_at > cutoff
                && (!alert.is_completion() || n.title.to_lowercase().contains(COMPLETION_MARKER))
        })
    }
}
