//! End-to-end scan passes against the in-memory store and sources.
//!
//! Every test runs on a `ManualClock`, so "now" only moves when a test says so.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use notifier::clock::ManualClock;
use notifier::engine::emitter::NotificationCenter;
use notifier::engine::guard::DuplicateGuard;
use notifier::engine::scan::{DeadlineScanner, ScanOutcome, ScanReport};
use notifier::engine::sources::{BrokerDirectory, MemorySources, Sources, TaskSource};
use notifier::models::notification::{Notification, NotificationType, Priority};
use notifier::models::source::{
    Actor, Broker, Event, Goal, Meeting, PerformanceChallenge, Role, Task, TaskStatus, TrackStatus,
};
use notifier::store::memory::MemoryStore;

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    data: Arc<MemorySources>,
    center: Arc<NotificationCenter>,
    scanner: Arc<DeadlineScanner>,
}

impl Harness {
    fn new(role: Role, broker_id: Option<&str>) -> Self {
        let data = Arc::new(MemorySources::new());
        Self::with_sources(role, broker_id, data.clone(), Sources::from_backend(data))
    }

    fn with_sources(
        role: Role,
        broker_id: Option<&str>,
        data: Arc<MemorySources>,
        sources: Sources,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryStore::new(clock.clone(), Duration::hours(24)));
        let actor = Actor {
            user_id: Uuid::new_v4(),
            broker_id: broker_id.map(String::from),
            role,
        };
        let center = Arc::new(NotificationCenter::new(
            actor.user_id,
            store.clone(),
            clock.clone(),
            DuplicateGuard::default(),
        ));
        let scanner = Arc::new(DeadlineScanner::new(actor, sources, center.clone()));
        Self {
            clock,
            store,
            data,
            center,
            scanner,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        use notifier::clock::Clock;
        self.clock.now()
    }

    async fn scan(&self) -> ScanReport {
        match self.scanner.check_and_create_deadline_notifications().await {
            ScanOutcome::Completed(report) => report,
            ScanOutcome::AlreadyRunning => panic!("unexpected overlapping pass"),
        }
    }

    async fn of_type(&self, kind: NotificationType) -> Vec<Notification> {
        self.center
            .notifications()
            .await
            .into_iter()
            .filter(|n| n.r#type == kind)
            .collect()
    }
}

fn task(id: &str, title: &str, due: DateTime<Utc>, status: TaskStatus) -> Task {
    Task {
        id: id.into(),
        title: title.into(),
        due_date: due,
        status,
        broker_id: None,
    }
}

fn challenge(id: &str, end: DateTime<Utc>, progress: f64, broker: Option<&str>) -> PerformanceChallenge {
    PerformanceChallenge {
        id: id.into(),
        title: format!("Desafio {}", id),
        end_date: end,
        status: TrackStatus::Active,
        total_progress: progress,
        broker_id: broker.map(String::from),
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_overdue_task_emits_high_priority_alert() {
        let h = Harness::new(Role::Broker, None);
        *h.data.tasks.write().await = vec![task(
            "t1",
            "Enviar contrato",
            h.now() - Duration::days(1),
            TaskStatus::InProgress,
        )];

        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 1);

        let alerts = h.of_type(NotificationType::Task).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, Priority::High);
        assert_eq!(alerts[0].related_id, "t1");
        assert!(alerts[0].message.contains("atrasada"));
        assert!(alerts[0].message.contains("Enviar contrato"));
    }

    #[tokio::test]
    async fn test_goal_two_days_out_is_high_with_progress() {
        let h = Harness::new(Role::Broker, None);
        *h.data.goals.write().await = vec![Goal {
            id: "g1".into(),
            title: "Vender 10 imóveis".into(),
            end_date: h.now() + Duration::days(2),
            status: TrackStatus::Active,
            progress: 40.0,
            broker_id: None,
        }];

        h.scan().await;

        let alerts = h.of_type(NotificationType::Goal).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, Priority::High);
        assert!(alerts[0].message.contains("3 dias"));
        assert!(alerts[0].message.contains("40"));
    }

    #[tokio::test]
    async fn test_completed_challenge_alerts_once() {
        let h = Harness::new(Role::Manager, None);
        *h.data.challenges.write().await =
            vec![challenge("c1", h.now() + Duration::days(30), 100.0, None)];

        let first = h.scan().await;
        assert_eq!(first.challenges.emitted, 1);

        let alerts = h.of_type(NotificationType::Performance).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, Priority::High);
        assert!(alerts[0].title.to_lowercase().contains("concluído"));

        h.clock.advance(Duration::minutes(5));
        let second = h.scan().await;
        assert_eq!(second.challenges.emitted, 0);
        assert_eq!(second.challenges.suppressed, 1);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_past_event_never_alerts() {
        let h = Harness::new(Role::Broker, None);
        *h.data.events.write().await = vec![
            Event {
                id: "e1".into(),
                title: "Feira de imóveis".into(),
                datetime: h.now() - Duration::hours(2),
                priority: Some("Alta".into()),
            },
            Event {
                id: "e2".into(),
                title: "Workshop".into(),
                datetime: h.now() - Duration::days(3),
                priority: None,
            },
        ];

        let report = h.scan().await;
        assert_eq!(report.events.evaluated, 2);
        assert_eq!(report.events.emitted, 0);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_meeting_not_repeated_within_window() {
        let h = Harness::new(Role::Broker, None);
        *h.data.meetings.write().await = vec![Meeting {
            id: "m1".into(),
            client_name: "Carlos Souza".into(),
            meeting_date: h.now() + Duration::hours(12),
        }];

        h.scan().await;
        let alerts = h.of_type(NotificationType::Meeting).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, Priority::High);

        h.clock.advance(Duration::minutes(5));
        let report = h.scan().await;
        assert_eq!(report.meetings.emitted, 0);
        assert_eq!(h.of_type(NotificationType::Meeting).await.len(), 1);
    }
}

mod dedup {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_with_unchanged_sources_emits_nothing() {
        let h = Harness::new(Role::Manager, None);
        let now = h.now();
        *h.data.tasks.write().await = vec![
            task("t1", "Ligar para cliente", now + Duration::hours(3), TaskStatus::Pending),
            task("t2", "Revisar proposta", now + Duration::days(2), TaskStatus::Pending),
        ];
        *h.data.meetings.write().await = vec![Meeting {
            id: "m1".into(),
            client_name: "Ana".into(),
            meeting_date: now + Duration::days(1) + Duration::hours(6),
        }];
        *h.data.challenges.write().await = vec![challenge("c1", now + Duration::days(20), 85.0, None)];

        let first = h.scan().await;
        assert_eq!(first.emitted(), 4);

        let second = h.scan().await;
        assert_eq!(second.emitted(), 0);
        assert_eq!(second.suppressed(), 4);
        assert_eq!(h.store.len().await, 4);
    }

    #[tokio::test]
    async fn test_dismissed_alert_is_not_raised_again() {
        let h = Harness::new(Role::Broker, None);
        *h.data.tasks.write().await = vec![task(
            "t1",
            "Enviar contrato",
            h.now() - Duration::hours(1),
            TaskStatus::Pending,
        )];

        h.scan().await;
        let id = h.center.notifications().await[0].id;
        h.center.delete_notification(id).await.unwrap();
        assert!(h.center.notifications().await.is_empty());

        h.clock.advance(Duration::minutes(5));
        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 0);
        assert!(h.center.notifications().await.is_empty());
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_alert_raised_again_after_window() {
        let h = Harness::new(Role::Broker, None);
        *h.data.tasks.write().await = vec![task(
            "t1",
            "Enviar contrato",
            h.now() - Duration::hours(1),
            TaskStatus::Pending,
        )];

        h.scan().await;
        h.clock.advance(Duration::hours(25));
        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 1);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_escalation_waits_for_window() {
        let h = Harness::new(Role::Broker, None);
        *h.data.tasks.write().await = vec![task(
            "t1",
            "Enviar contrato",
            h.now() + Duration::hours(25),
            TaskStatus::Pending,
        )];

        h.scan().await;
        assert_eq!(h.center.notifications().await[0].priority, Priority::Medium);

        // Inside 24h now, but the key was recorded two hours ago.
        h.clock.advance(Duration::hours(2));
        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 0);
        assert_eq!(report.tasks.suppressed, 1);

        h.clock.advance(Duration::hours(23));
        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 1);
        assert_eq!(h.center.notifications().await[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_near_completion_does_not_block_completion() {
        let h = Harness::new(Role::Manager, None);
        *h.data.challenges.write().await =
            vec![challenge("c1", h.now() + Duration::days(30), 90.0, None)];

        h.scan().await;
        assert_eq!(h.of_type(NotificationType::Challenge).await.len(), 1);

        h.data.challenges.write().await[0].total_progress = 100.0;
        h.clock.advance(Duration::minutes(5));
        let report = h.scan().await;
        assert_eq!(report.challenges.emitted, 1);
        assert_eq!(h.of_type(NotificationType::Performance).await.len(), 1);
    }
}

mod challenge_progress {
    use super::*;

    async fn completion_follows_deadline_alert(end_offset: Duration) {
        let h = Harness::new(Role::Manager, None);
        *h.data.challenges.write().await = vec![challenge("c1", h.now() + end_offset, 100.0, None)];

        let first = h.scan().await;
        assert_eq!(first.challenges.emitted, 1);
        assert_eq!(h.of_type(NotificationType::Challenge).await.len(), 1);
        assert!(h.of_type(NotificationType::Performance).await.is_empty());

        // Deadline alert is already recorded, so the completion rule gets its turn.
        h.clock.advance(Duration::minutes(5));
        let second = h.scan().await;
        assert_eq!(second.challenges.emitted, 1);
        assert_eq!(second.challenges.suppressed, 1);
        let done = h.of_type(NotificationType::Performance).await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].priority, Priority::High);

        h.clock.advance(Duration::minutes(5));
        let third = h.scan().await;
        assert_eq!(third.challenges.emitted, 0);
        assert_eq!(third.challenges.suppressed, 2);
        assert_eq!(h.of_type(NotificationType::Performance).await.len(), 1);
    }

    #[tokio::test]
    async fn test_completion_alert_after_expired_deadline_alert() {
        completion_follows_deadline_alert(-Duration::days(1)).await;
    }

    #[tokio::test]
    async fn test_completion_alert_when_ending_within_three_days() {
        completion_follows_deadline_alert(Duration::days(2)).await;
    }

    #[tokio::test]
    async fn test_expired_challenge_completion_raised_once_over_days() {
        let h = Harness::new(Role::Manager, None);
        *h.data.challenges.write().await =
            vec![challenge("c1", h.now() - Duration::days(1), 100.0, None)];

        h.scan().await;
        h.clock.advance(Duration::minutes(5));
        h.scan().await;
        for _ in 0..5 {
            h.clock.advance(Duration::days(1));
            h.scan().await;
        }

        let completions: Vec<_> = h
            .store
            .all()
            .await
            .into_iter()
            .filter(|n| n.r#type == NotificationType::Performance)
            .collect();
        assert!(!completions.is_empty());
        // At most one completion alert inside any 24h window.
        for pair in completions.windows(2) {
            assert!(pair[1].created_at - pair[0].created_at >= Duration::hours(24));
        }
    }

    #[tokio::test]
    async fn test_near_completion_waits_behind_recorded_deadline_alert() {
        let h = Harness::new(Role::Manager, None);
        *h.data.challenges.write().await = vec![challenge("c1", h.now() + Duration::days(2), 90.0, None)];

        h.scan().await;
        h.clock.advance(Duration::minutes(5));
        let second = h.scan().await;

        // Same (challenge, id) key as the deadline alert, so both are held back.
        assert_eq!(second.challenges.emitted, 0);
        assert_eq!(second.challenges.suppressed, 2);
        assert_eq!(h.store.len().await, 1);
    }
}

mod pass_behaviour {
    use super::*;

    struct FailingTasks;

    #[async_trait]
    impl TaskSource for FailingTasks {
        async fn list_tasks(&self, _actor: &Actor) -> anyhow::Result<Vec<Task>> {
            anyhow::bail!("tasks table unavailable")
        }
    }

    struct FailingBrokers;

    #[async_trait]
    impl BrokerDirectory for FailingBrokers {
        async fn list_brokers(&self, _actor: &Actor) -> anyhow::Result<Vec<Broker>> {
            anyhow::bail!("brokers table unavailable")
        }
    }

    #[tokio::test]
    async fn test_failed_insert_does_not_abort_pass() {
        let h = Harness::new(Role::Broker, None);
        let now = h.now();
        *h.data.tasks.write().await = vec![
            task("t1", "Primeira", now - Duration::hours(1), TaskStatus::Pending),
            task("t2", "Segunda", now - Duration::hours(1), TaskStatus::Pending),
        ];
        *h.data.meetings.write().await = vec![Meeting {
            id: "m1".into(),
            client_name: "Ana".into(),
            meeting_date: now + Duration::hours(2),
        }];
        h.store.fail_inserts_for("t1").await;

        let report = h.scan().await;
        assert_eq!(report.tasks.failed, 1);
        assert_eq!(report.tasks.emitted, 1);
        assert_eq!(report.meetings.emitted, 1);

        // The failed alert is retried on the next pass.
        h.store.clear_failures().await;
        let retry = h.scan().await;
        assert_eq!(retry.tasks.emitted, 1);
        assert_eq!(retry.tasks.failed, 0);
    }

    #[tokio::test]
    async fn test_failed_source_is_counted_and_others_still_scanned() {
        let data = Arc::new(MemorySources::new());
        let mut sources = Sources::from_backend(data.clone());
        sources.tasks = Arc::new(FailingTasks);
        let h = Harness::with_sources(Role::Broker, None, data, sources);
        *h.data.meetings.write().await = vec![Meeting {
            id: "m1".into(),
            client_name: "Ana".into(),
            meeting_date: h.now() + Duration::hours(2),
        }];

        let report = h.scan().await;
        assert_eq!(report.tasks.failed, 1);
        assert_eq!(report.tasks.evaluated, 0);
        assert_eq!(report.meetings.emitted, 1);
    }

    #[tokio::test]
    async fn test_broker_name_included_when_known() {
        let h = Harness::new(Role::Manager, None);
        *h.data.brokers.write().await = vec![Broker {
            id: "b1".into(),
            name: "Ana Lima".into(),
        }];
        let mut t = task("t1", "Enviar contrato", h.now() - Duration::hours(1), TaskStatus::Pending);
        t.broker_id = Some("b1".into());
        *h.data.tasks.write().await = vec![t];

        h.scan().await;
        let alerts = h.of_type(NotificationType::Task).await;
        assert!(alerts[0].message.contains("do corretor Ana Lima"));
    }

    #[tokio::test]
    async fn test_broker_lookup_failure_drops_clause_only() {
        let data = Arc::new(MemorySources::new());
        let mut sources = Sources::from_backend(data.clone());
        sources.brokers = Arc::new(FailingBrokers);
        let h = Harness::with_sources(Role::Manager, None, data, sources);
        let mut t = task("t1", "Enviar contrato", h.now() - Duration::hours(1), TaskStatus::Pending);
        t.broker_id = Some("b1".into());
        *h.data.tasks.write().await = vec![t];

        let report = h.scan().await;
        assert_eq!(report.tasks.emitted, 1);
        let alerts = h.of_type(NotificationType::Task).await;
        assert!(!alerts[0].message.contains("corretor"));
    }

    #[tokio::test]
    async fn test_skipped_items_emit_nothing() {
        let h = Harness::new(Role::Broker, None);
        let now = h.now();
        *h.data.tasks.write().await = vec![
            task("t1", "Feita", now - Duration::days(1), TaskStatus::Done),
            task("temp-123", "Rascunho", now - Duration::days(1), TaskStatus::Pending),
            task("t3", "Distante", now + Duration::days(10), TaskStatus::Pending),
        ];
        *h.data.goals.write().await = vec![Goal {
            id: "g1".into(),
            title: "Cancelada".into(),
            end_date: now - Duration::days(1),
            status: TrackStatus::Cancelled,
            progress: 10.0,
            broker_id: None,
        }];

        let report = h.scan().await;
        assert_eq!(report.tasks.evaluated, 3);
        assert_eq!(report.emitted(), 0);
    }

    #[tokio::test]
    async fn test_broker_only_sees_own_challenges() {
        let h = Harness::new(Role::Broker, Some("b1"));
        let end = h.now() + Duration::hours(6);
        *h.data.challenges.write().await = vec![
            challenge("c1", end, 20.0, Some("b1")),
            challenge("c2", end, 20.0, Some("b2")),
        ];

        let report = h.scan().await;
        assert_eq!(report.challenges.evaluated, 1);
        let alerts = h.of_type(NotificationType::Challenge).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].related_id, "c1");
    }

    #[tokio::test]
    async fn test_unread_count_tracks_visible_unread() {
        let h = Harness::new(Role::Broker, None);
        let now = h.now();
        *h.data.tasks.write().await = (1..=4)
            .map(|i| task(&format!("t{}", i), "Tarefa", now - Duration::hours(i), TaskStatus::Pending))
            .collect();
        h.scan().await;

        let unread = |list: &[Notification]| list.iter().filter(|n| !n.is_read).count();

        let list = h.center.notifications().await;
        assert_eq!(h.center.unread_count().await, unread(&list));

        h.center.mark_as_read(list[0].id).await.unwrap();
        h.center.delete_notification(list[1].id).await.unwrap();
        let list = h.center.notifications().await;
        assert_eq!(list.len(), 3);
        assert_eq!(h.center.unread_count().await, unread(&list));
        assert_eq!(h.center.unread_count().await, 2);

        h.center.delete_all_read().await.unwrap();
        let list = h.center.notifications().await;
        assert_eq!(list.len(), 2);
        assert_eq!(h.center.unread_count().await, unread(&list));
    }
}

mod overlap {
    use super::*;
    use tokio::sync::Notify;

    /// Blocks the pass inside the task load until released.
    struct GatedTasks(Arc<Notify>);

    #[async_trait]
    impl TaskSource for GatedTasks {
        async fn list_tasks(&self, _actor: &Actor) -> anyhow::Result<Vec<Task>> {
            self.0.notified().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_overlapping_pass_reports_already_running() {
        let gate = Arc::new(Notify::new());
        let data = Arc::new(MemorySources::new());
        let mut sources = Sources::from_backend(data.clone());
        sources.tasks = Arc::new(GatedTasks(gate.clone()));
        let h = Harness::with_sources(Role::Broker, None, data, sources);

        let scanner = h.scanner.clone();
        let first = tokio::spawn(async move { scanner.check_and_create_deadline_notifications().await });
        while !h.scanner.is_scanning() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            h.scanner.check_and_create_deadline_notifications().await,
            ScanOutcome::AlreadyRunning
        );

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), ScanOutcome::Completed(_)));
        assert!(!h.scanner.is_scanning());
    }
}
