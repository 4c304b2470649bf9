use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{InsertOutcome, NotificationStore};
use crate::engine::sources::{
    BrokerDirectory, ChallengeSource, EventSource, GoalSource, MeetingSource, TaskSource,
};
use crate::models::notification::{NewNotification, Notification};
use crate::models::source::{
    Actor, Broker, Event, Goal, Meeting, PerformanceChallenge, Task,
};

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `exclusion_violation` (the rolling dedup window constraint).
const EXCLUSION_VIOLATION: &str = "23P01";

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, type, related_id, priority, \
                                    is_read, dismissed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    dedup_window: Duration,
}

impl PgStore {
    pub async fn connect(database_url: &str, dedup_window: Duration) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool, dedup_window })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn is_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(UNIQUE_VIOLATION) | Some(EXCLUSION_VIOLATION)
        ),
        _ => false,
    }
}

// -- Notification Operations --

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> InsertOutcome {
        // `dedup_until` bounds the row's slot in the exclusion constraint
        // over (user_id, type, related_id, [created_at, dedup_until)).
        let sql = format!(
            r#"INSERT INTO notifications (user_id, title, message, type, related_id, priority, dedup_until)
               VALUES ($1, $2, $3, $4, $5, $6, NOW() + make_interval(secs => $7))
               RETURNING {}"#,
            NOTIFICATION_COLUMNS
        );
        let result = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(&new.title)
            .bind(&new.message)
            .bind(new.r#type)
            .bind(&new.related_id)
            .bind(new.priority)
            .bind(self.dedup_window.num_seconds() as f64)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => InsertOutcome::Inserted(row),
            Err(e) if is_conflict(&e) => InsertOutcome::AlreadyExists,
            Err(e) => InsertOutcome::Failed(e.into()),
        }
    }

    async fn list(
        &self,
        user_id: Uuid,
        dismissed_since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Notification>> {
        let sql = format!(
            r#"SELECT {}
               FROM notifications
               WHERE user_id = $1
                 AND (dismissed_at IS NULL OR created_at >= $2)
               ORDER BY created_at DESC"#,
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(dismissed_since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>> {
        let sql = format!(
            r#"UPDATE notifications SET is_read = true, updated_at = NOW()
               WHERE id = $1 AND user_id = $2
               RETURNING {}"#,
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications SET is_read = true, updated_at = NOW()
               WHERE user_id = $1 AND is_read = false AND dismissed_at IS NULL"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn dismiss(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Notification>> {
        let sql = format!(
            r#"UPDATE notifications
               SET dismissed_at = COALESCE(dismissed_at, NOW()), updated_at = NOW()
               WHERE id = $1 AND user_id = $2
               RETURNING {}"#,
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn dismiss_read(&self, user_id: Uuid) -> anyhow::Result<(Vec<Uuid>, DateTime<Utc>)> {
        let rows = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"UPDATE notifications SET dismissed_at = NOW(), updated_at = NOW()
               WHERE user_id = $1 AND is_read = true AND dismissed_at IS NULL
               RETURNING id, dismissed_at"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let at = rows.first().map(|(_, at)| *at).unwrap_or_else(Utc::now);
        Ok((rows.into_iter().map(|(id, _)| id).collect(), at))
    }
}

// -- Source Snapshots (read-only) --
//
// These tables belong to the back-office CRUD modules; only SELECTs here.

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    due_date: DateTime<Utc>,
    status: String,
    broker_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct GoalRow {
    id: String,
    title: String,
    end_date: DateTime<Utc>,
    status: String,
    progress: f64,
    broker_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ChallengeRow {
    id: String,
    title: String,
    end_date: DateTime<Utc>,
    status: String,
    total_progress: f64,
    broker_id: Option<String>,
}

/// Rows with a status the engine does not know are skipped, not fatal.
fn parse_rows<R, T>(rows: Vec<R>, table: &'static str, convert: impl Fn(R) -> anyhow::Result<T>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match convert(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping row with unrecognised status");
                None
            }
        })
        .collect()
}

#[async_trait]
impl TaskSource for PgStore {
    async fn list_tasks(&self, actor: &Actor) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"SELECT id::text AS id, title, due_date, status, broker_id::text AS broker_id
               FROM tasks
               WHERE user_id = $1 AND due_date IS NOT NULL
               ORDER BY due_date ASC"#,
        )
        .bind(actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(parse_rows(rows, "tasks", |r| {
            Ok(Task {
                status: r.status.parse()?,
                id: r.id,
                title: r.title,
                due_date: r.due_date,
                broker_id: r.broker_id,
            })
        }))
    }
}

#[async_trait]
impl GoalSource for PgStore {
    async fn list_goals(&self, actor: &Actor) -> anyhow::Result<Vec<Goal>> {
        let rows = sqlx::query_as::<_, GoalRow>(
            r#"SELECT id::text AS id, title, end_date, status,
                      COALESCE(progress, 0)::float8 AS progress, broker_id::text AS broker_id
               FROM goals
               WHERE user_id = $1
               ORDER BY end_date ASC"#,
        )
        .bind(actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(parse_rows(rows, "goals", |r| {
            Ok(Goal {
                status: r.status.parse()?,
                id: r.id,
                title: r.title,
                end_date: r.end_date,
                progress: r.progress,
                broker_id: r.broker_id,
            })
        }))
    }
}

#[async_trait]
impl EventSource for PgStore {
    async fn list_events(&self, actor: &Actor) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>, Option<String>)>(
            r#"SELECT id::text, title, datetime, priority
               FROM events
               WHERE user_id = $1
               ORDER BY datetime ASC"#,
        )
        .bind(actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, datetime, priority)| Event {
                id,
                title,
                datetime,
                priority,
            })
            .collect())
    }
}

#[async_trait]
impl MeetingSource for PgStore {
    async fn list_meetings(&self, actor: &Actor) -> anyhow::Result<Vec<Meeting>> {
        let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            r#"SELECT id::text, client_name, meeting_date
               FROM meetings
               WHERE user_id = $1
               ORDER BY meeting_date ASC"#,
        )
        .bind(actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, client_name, meeting_date)| Meeting {
                id,
                client_name,
                meeting_date,
            })
            .collect())
    }
}

#[async_trait]
impl BrokerDirectory for PgStore {
    async fn list_brokers(&self, _actor: &Actor) -> anyhow::Result<Vec<Broker>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT id::text, name FROM brokers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| Broker { id, name }).collect())
    }
}

#[async_trait]
impl ChallengeSource for PgStore {
    async fn list_challenges(&self, actor: &Actor) -> anyhow::Result<Vec<PerformanceChallenge>> {
        const BASE: &str = r#"SELECT id::text AS id, title, end_date, status,
                                     COALESCE(total_progress, 0)::float8 AS total_progress,
                                     broker_id::text AS broker_id
                              FROM performance_challenges"#;

        let rows = if actor.role.sees_all_challenges() {
            sqlx::query_as::<_, ChallengeRow>(&format!("{} ORDER BY end_date ASC", BASE))
                .fetch_all(&self.pool)
                .await?
        } else {
            let Some(broker_id) = actor.broker_id.as_deref() else {
                return Ok(Vec::new());
            };
            sqlx::query_as::<_, ChallengeRow>(&format!(
                "{} WHERE broker_id::text = $1 ORDER BY end_date ASC",
                BASE
            ))
            .bind(broker_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(parse_rows(rows, "performance_challenges", |r| {
            Ok(PerformanceChallenge {
                status: r.status.parse()?,
                id: r.id,
                title: r.title,
                end_date: r.end_date,
                total_progress: r.total_progress,
                broker_id: r.broker_id,
            })
        }))
    }
}
