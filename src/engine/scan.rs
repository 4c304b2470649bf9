//! One scan pass over the five watched sources.
//!
//! Sources are visited in a fixed order (tasks, goals, events, meetings,
//! challenges) and items in their collection's order. Each emitted
//! notification lands in the center's list before the next item is
//! classified, so the guard never works from a stale snapshot within a pass.
//! A failure on one item or one source is logged and counted; the pass
//! always runs to the end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classifier::{
    challenge_candidates, classify_event, classify_goal, classify_meeting, classify_task, Alert,
};
use super::emitter::NotificationCenter;
use super::sources::Sources;
use crate::metrics::SCAN_METRICS;
use crate::models::source::Actor;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub evaluated: usize,
    pub emitted: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub tasks: SourceReport,
    pub goals: SourceReport,
    pub events: SourceReport,
    pub meetings: SourceReport,
    pub challenges: SourceReport,
}

impl ScanReport {
    fn sources(&self) -> [&SourceReport; 5] {
        [&self.tasks, &self.goals, &self.events, &self.meetings, &self.challenges]
    }

    pub fn emitted(&self) -> usize {
        self.sources().iter().map(|s| s.emitted).sum()
    }

    pub fn suppressed(&self) -> usize {
        self.sources().iter().map(|s| s.suppressed).sum()
    }

    pub fn failed(&self) -> usize {
        self.sources().iter().map(|s| s.failed).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Another pass for this user was still in flight.
    AlreadyRunning,
}

/// Resets the in-flight flag however the pass ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeadlineScanner {
    actor: Actor,
    sources: Sources,
    center: Arc<NotificationCenter>,
    scanning: AtomicBool,
}

impl DeadlineScanner {
    pub fn new(actor: Actor, sources: Sources, center: Arc<NotificationCenter>) -> Self {
        Self {
            actor,
            sources,
            center,
            scanning: AtomicBool::new(false),
        }
    }

    pub fn center(&self) -> &Arc<NotificationCenter> {
        &self.center
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Run one full pass. Returns `AlreadyRunning` instead of overlapping
    /// with a pass that is still in flight.
    pub async fn check_and_create_deadline_notifications(&self) -> ScanOutcome {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(user_id = %self.actor.user_id, "scan pass already in flight, skipping");
            return ScanOutcome::AlreadyRunning;
        }
        let _in_flight = InFlight(&self.scanning);

        let started = Instant::now();
        let now = self.center.now();
        let pruned = self.center.prune_expired(now).await;
        if pruned > 0 {
            debug!(user_id = %self.actor.user_id, pruned, "scan: dropped expired dismissed records");
        }
        let brokers = self.broker_names().await;
        let broker = |id: &Option<String>| id.as_ref().and_then(|id| brokers.get(id)).map(String::as_str);

        debug!(user_id = %self.actor.user_id, "scan: starting deadline pass");

        let mut report = ScanReport::default();

        let tasks = self.sources.tasks.list_tasks(&self.actor).await;
        report.tasks = self
            .scan_source("tasks", tasks, now, |t| {
                classify_task(t, broker(&t.broker_id), now).into_iter().collect()
            })
            .await;

        let goals = self.sources.goals.list_goals(&self.actor).await;
        report.goals = self
            .scan_source("goals", goals, now, |g| {
                classify_goal(g, broker(&g.broker_id), now).into_iter().collect()
            })
            .await;

        let events = self.sources.events.list_events(&self.actor).await;
        report.events = self
            .scan_source("events", events, now, |e| classify_event(e, now).into_iter().collect())
            .await;

        let meetings = self.sources.meetings.list_meetings(&self.actor).await;
        report.meetings = self
            .scan_source("meetings", meetings, now, |m| classify_meeting(m, now).into_iter().collect())
            .await;

        let challenges = self.sources.challenges.list_challenges(&self.actor).await;
        report.challenges = self
            .scan_source("challenges", challenges, now, |c| {
                challenge_candidates(c, broker(&c.broker_id), now)
            })
            .await;

        SCAN_METRICS.observe_pass(started.elapsed().as_secs_f64());
        if report.emitted() > 0 || report.failed() > 0 {
            info!(
                user_id = %self.actor.user_id,
                emitted = report.emitted(),
                suppressed = report.suppressed(),
                failed = report.failed(),
                "scan: deadline pass complete"
            );
        } else {
            debug!(user_id = %self.actor.user_id, "scan: deadline pass complete, nothing new");
        }

        ScanOutcome::Completed(report)
    }

    async fn broker_names(&self) -> HashMap<String, String> {
        match self.sources.brokers.list_brokers(&self.actor).await {
            Ok(brokers) => brokers.into_iter().map(|b| (b.id, b.name)).collect(),
            Err(e) => {
                // Messages just lose the broker clause.
                warn!(user_id = %self.actor.user_id, error = %e, "scan: failed to load brokers");
                SCAN_METRICS.failed("brokers");
                HashMap::new()
            }
        }
    }

    async fn scan_source<T, F>(
        &self,
        source: &'static str,
        items: anyhow::Result<Vec<T>>,
        now: DateTime<Utc>,
        classify: F,
    ) -> SourceReport
    where
        F: Fn(&T) -> Vec<Alert>,
    {
        let mut report = SourceReport::default();
        let items = match items {
            Ok(items) => items,
            Err(e) => {
                warn!(user_id = %self.actor.user_id, source, error = %e, "scan: failed to load source");
                SCAN_METRICS.failed(source);
                report.failed += 1;
                return report;
            }
        };

        for item in &items {
            report.evaluated += 1;

            // Candidates in precedence order; the first one not yet recorded wins.
            for alert in classify(item) {
                if self.center.is_duplicate(&alert, now).await {
                    SCAN_METRICS.suppressed(alert.r#type, "guard");
                    report.suppressed += 1;
                    continue;
                }

                match self.center.create_notification(alert.to_new_notification()).await {
                    Ok(Some(_)) => report.emitted += 1,
                    Ok(None) => {
                        report.suppressed += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            user_id = %self.actor.user_id,
                            source,
                            related_id = %alert.related_id,
                            error = %e,
                            "scan: failed to emit notification"
                        );
                        SCAN_METRICS.failed(source);
                        report.failed += 1;
                    }
                }
                break;
            }
        }

        report
    }
}
