//! Per-user engine sessions.
//!
//! A session exists while a user is signed in: it owns that user's
//! notification list, scanner and scan loop. Activating a session runs the
//! first pass immediately; deactivating it stops future passes.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::emitter::NotificationCenter;
use crate::engine::guard::DuplicateGuard;
use crate::engine::scan::DeadlineScanner;
use crate::engine::sources::Sources;
use crate::errors::AppError;
use crate::jobs::deadline_scan::{self, ScanSchedule, ScheduleState};
use crate::models::source::Actor;
use crate::notification::webhook::WebhookNotifier;
use crate::store::NotificationStore;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub scan_interval: Duration,
    pub dedup_window: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(deadline_scan::DEFAULT_SCAN_INTERVAL_SECS),
            dedup_window: DuplicateGuard::default().window(),
        }
    }
}

pub struct UserSession {
    pub actor: Actor,
    pub center: Arc<NotificationCenter>,
    pub scanner: Arc<DeadlineScanner>,
    schedule: ScanSchedule,
}

impl UserSession {
    pub fn schedule_state(&self) -> ScheduleState {
        self.schedule.state()
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn NotificationStore>,
    sources: Sources,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    webhook: Option<WebhookNotifier>,
    sessions: Arc<DashMap<Uuid, Arc<UserSession>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sources: Sources,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            sources,
            clock,
            settings,
            webhook: None,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        if webhook.is_enabled() {
            self.webhook = Some(webhook);
        }
        self
    }

    /// Start (or restart) the engine for `actor`.
    pub async fn activate(&self, actor: Actor) -> Arc<UserSession> {
        if let Some((_, previous)) = self.sessions.remove(&actor.user_id) {
            previous.schedule.stop();
        }

        let mut center = NotificationCenter::new(
            actor.user_id,
            self.store.clone(),
            self.clock.clone(),
            DuplicateGuard::new(self.settings.dedup_window),
        );
        if let Some(webhook) = &self.webhook {
            center = center.with_webhook(webhook.clone());
        }
        let center = Arc::new(center);

        // The store still enforces the window, so a failed preload only costs
        // extra round-trips on the first pass.
        if let Err(e) = center.refresh_notifications().await {
            warn!(user_id = %actor.user_id, error = %e, "session: initial notification load failed");
        }

        let scanner = Arc::new(DeadlineScanner::new(
            actor.clone(),
            self.sources.clone(),
            center.clone(),
        ));
        let schedule = deadline_scan::spawn(scanner.clone(), self.settings.scan_interval);

        let session = Arc::new(UserSession {
            actor: actor.clone(),
            center,
            scanner,
            schedule,
        });
        self.sessions.insert(actor.user_id, session.clone());
        info!(user_id = %actor.user_id, role = ?actor.role, "session activated");
        session
    }

    /// Stop the user's scan loop. Returns false if no session was active.
    pub fn deactivate(&self, user_id: Uuid) -> bool {
        match self.sessions.remove(&user_id) {
            Some((_, session)) => {
                session.schedule.stop();
                info!(user_id = %user_id, "session deactivated");
                true
            }
            None => false,
        }
    }

    /// Resolve the caller's session; no session is a caller error.
    pub fn get(&self, user_id: Uuid) -> Result<Arc<UserSession>, AppError> {
        self.sessions
            .get(&user_id)
            .map(|s| s.value().clone())
            .ok_or(AppError::Unauthenticated)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn deactivate_all(&self) {
        let users: Vec<Uuid> = self.sessions.iter().map(|e| *e.key()).collect();
        for user_id in users {
            self.deactivate(user_id);
        }
    }
}
