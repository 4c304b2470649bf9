//! Background job: periodic deadline scan for one user session.
//!
//! Runs one pass immediately on activation, then every `period`
//! (5 minutes by default). Stopping only prevents future passes; a pass
//! already in flight runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::engine::scan::{DeadlineScanner, ScanOutcome};

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Idle,
    Scanning,
    Stopped,
}

/// Handle to a running scan loop. Dropping it stops the loop.
pub struct ScanSchedule {
    scanner: Arc<DeadlineScanner>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

/// Spawn the scan loop. Call once per activated session.
pub fn spawn(scanner: Arc<DeadlineScanner>, period: Duration) -> ScanSchedule {
    let (shutdown, mut stop_rx) = watch::channel(false);
    let job_scanner = scanner.clone();

    let handle = tokio::spawn(async move {
        let mut interval = time::interval(period);
        // A slow pass pushes the next one back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = interval.tick() => {}
            }

            match job_scanner.check_and_create_deadline_notifications().await {
                ScanOutcome::Completed(report) if report.failed() > 0 => {
                    tracing::warn!(
                        user_id = %job_scanner.center().user_id(),
                        failed = report.failed(),
                        "deadline scan finished with failures"
                    );
                }
                ScanOutcome::Completed(_) => {}
                ScanOutcome::AlreadyRunning => {
                    tracing::debug!("deadline scan tick skipped, manual pass in flight");
                }
            }
        }
        tracing::debug!(
            user_id = %job_scanner.center().user_id(),
            "deadline scan loop stopped"
        );
    });

    ScanSchedule {
        scanner,
        shutdown,
        handle: Some(handle),
    }
}

impl ScanSchedule {
    pub fn scanner(&self) -> &Arc<DeadlineScanner> {
        &self.scanner
    }

    /// Stop future passes. Does not wait for an in-flight pass.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn state(&self) -> ScheduleState {
        if self.handle.as_ref().map_or(true, |h| h.is_finished()) {
            ScheduleState::Stopped
        } else if self.scanner.is_scanning() {
            ScheduleState::Scanning
        } else {
            ScheduleState::Idle
        }
    }

    /// Stop and wait for the loop (and any in-flight pass) to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("deadline scan loop panicked: {}", e);
            }
        }
    }
}

impl Drop for ScanSchedule {
    fn drop(&mut self) {
        self.stop();
    }
}
