//! Threshold classifier: decides whether a source item warrants an alert.
//!
//! Every function here is pure: `(item, broker name, now) → Option<Alert>`.
//! Distances are `deadline - now` measured on the wall clock at scan time,
//! never against calendar-day boundaries. The first matching rung wins:
//!
//! | Source    | Skip                      | overdue | ≤ 24h          | ≤ 3 days        | ≤ 7 days |
//! |-----------|---------------------------|---------|----------------|-----------------|----------|
//! | Task      | done, placeholder id      | high    | high           | medium          | low      |
//! | Goal      | completed, cancelled      | high    | (as ≤ 3 days)  | high            | medium   |
//! | Event     | -                         | skip    | high / medium  | medium / low    | -        |
//! | Meeting   | -                         | skip    | high           | medium          | -        |
//! | Challenge | completed                 | high    | high           | medium          | -        |
//!
//! Challenges with no deadline alert this pass (no rung, or the rung's alert
//! is already recorded) are then checked for completion (≥ 100%, one-time
//! `performance` alert) or near completion (≥ 80%).

use chrono::{DateTime, Duration, Utc};

use crate::models::notification::{NewNotification, NotificationType, Priority};
use crate::models::source::{Event, Goal, Meeting, PerformanceChallenge, Task, TaskStatus, TrackStatus};

pub const TASK_TITLE: &str = "Prazo de Tarefa";
pub const GOAL_TITLE: &str = "Prazo de Meta";
pub const EVENT_TITLE: &str = "Evento Próximo";
pub const MEETING_TITLE: &str = "Reunião Próxima";
pub const CHALLENGE_TITLE: &str = "Desafio de Performance";
pub const COMPLETION_TITLE: &str = "Desafio Concluído!";

/// Title fragment that identifies a one-time completion alert.
pub const COMPLETION_MARKER: &str = "concluído";

pub const NEAR_COMPLETION_PERCENT: f64 = 80.0;
pub const COMPLETE_PERCENT: f64 = 100.0;

/// How close a deadline is, relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Overdue,
    Within24Hours,
    Within3Days,
    Within7Days,
    Later,
}

pub fn proximity(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Proximity {
    let remaining = deadline - now;
    if remaining < Duration::zero() {
        Proximity::Overdue
    } else if remaining <= Duration::hours(24) {
        Proximity::Within24Hours
    } else if remaining <= Duration::days(3) {
        Proximity::Within3Days
    } else if remaining <= Duration::days(7) {
        Proximity::Within7Days
    } else {
        Proximity::Later
    }
}

/// A positive classification, ready to be checked against the guard and emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub r#type: NotificationType,
    pub related_id: String,
    pub title: &'static str,
    pub message: String,
    pub priority: Priority,
}

impl Alert {
    fn new(
        r#type: NotificationType,
        related_id: &str,
        title: &'static str,
        priority: Priority,
        message: String,
    ) -> Self {
        Self {
            r#type,
            related_id: related_id.to_string(),
            title,
            message,
            priority,
        }
    }

    /// Completion alerts are deduplicated on title as well as key.
    pub fn is_completion(&self) -> bool {
        self.r#type == NotificationType::Performance
    }

    pub fn to_new_notification(&self) -> NewNotification {
        NewNotification {
            title: self.title.to_string(),
            message: self.message.clone(),
            r#type: self.r#type,
            related_id: self.related_id.clone(),
            priority: self.priority,
        }
    }
}

fn broker_clause(broker: Option<&str>) -> String {
    match broker {
        Some(name) if !name.trim().is_empty() => format!(" do corretor {}", name.trim()),
        _ => String::new(),
    }
}

fn percent(progress: f64) -> String {
    format!("{:.0}%", progress)
}

pub fn classify_task(task: &Task, broker: Option<&str>, now: DateTime<Utc>) -> Option<Alert> {
    // Optimistic rows get re-keyed on save; an alert would point at a dead id.
    if task.status == TaskStatus::Done || task.is_placeholder() {
        return None;
    }

    let subject = format!("A tarefa \"{}\"{}", task.title, broker_clause(broker));
    let (priority, message) = match proximity(task.due_date, now) {
        Proximity::Overdue => (Priority::High, format!("{} está atrasada!", subject)),
        Proximity::Within24Hours => (
            Priority::High,
            format!("{} vence em menos de 24 horas!", subject),
        ),
        Proximity::Within3Days => (Priority::Medium, format!("{} vence em até 3 dias.", subject)),
        Proximity::Within7Days => (Priority::Low, format!("{} vence em até 7 dias.", subject)),
        Proximity::Later => return None,
    };
    Some(Alert::new(NotificationType::Task, &task.id, TASK_TITLE, priority, message))
}

pub fn classify_goal(goal: &Goal, broker: Option<&str>, now: DateTime<Utc>) -> Option<Alert> {
    if matches!(goal.status, TrackStatus::Completed | TrackStatus::Cancelled) {
        return None;
    }

    let subject = format!("A meta \"{}\"{}", goal.title, broker_clause(broker));
    let progress = percent(goal.progress);
    let (priority, message) = match proximity(goal.end_date, now) {
        Proximity::Overdue => (
            Priority::High,
            format!("{} está atrasada! Progresso atual: {}", subject, progress),
        ),
        Proximity::Within24Hours | Proximity::Within3Days => (
            Priority::High,
            format!("{} vence em até 3 dias! Progresso atual: {}", subject, progress),
        ),
        Proximity::Within7Days => (
            Priority::Medium,
            format!("{} vence em até 7 dias. Progresso atual: {}", subject, progress),
        ),
        Proximity::Later => return None,
    };
    Some(Alert::new(NotificationType::Goal, &goal.id, GOAL_TITLE, priority, message))
}

pub fn classify_event(event: &Event, now: DateTime<Utc>) -> Option<Alert> {
    let important = event.is_high_priority();
    let (priority, message) = match proximity(event.datetime, now) {
        Proximity::Within24Hours => (
            if important { Priority::High } else { Priority::Medium },
            format!("O evento \"{}\" acontece em menos de 24 horas.", event.title),
        ),
        Proximity::Within3Days => (
            if important { Priority::Medium } else { Priority::Low },
            format!("O evento \"{}\" acontece em até 3 dias.", event.title),
        ),
        // Past events never alert.
        Proximity::Overdue | Proximity::Within7Days | Proximity::Later => return None,
    };
    Some(Alert::new(NotificationType::Event, &event.id, EVENT_TITLE, priority, message))
}

pub fn classify_meeting(meeting: &Meeting, now: DateTime<Utc>) -> Option<Alert> {
    let (priority, message) = match proximity(meeting.meeting_date, now) {
        Proximity::Within24Hours => (
            Priority::High,
            format!("Reunião com {} em menos de 24 horas.", meeting.client_name),
        ),
        Proximity::Within3Days => (
            Priority::Medium,
            format!("Reunião com {} em até 3 dias.", meeting.client_name),
        ),
        Proximity::Overdue | Proximity::Within7Days | Proximity::Later => return None,
    };
    Some(Alert::new(NotificationType::Meeting, &meeting.id, MEETING_TITLE, priority, message))
}

/// The alert a challenge would raise if nothing had been recorded yet.
pub fn classify_challenge(
    challenge: &PerformanceChallenge,
    broker: Option<&str>,
    now: DateTime<Utc>,
) -> Option<Alert> {
    challenge_candidates(challenge, broker, now).into_iter().next()
}

/// Challenge alerts in precedence order: the deadline rung first, then the
/// progress rule. The scanner emits the first one the guard lets through, so
/// progress is only reported when no deadline alert fires this pass.
pub fn challenge_candidates(
    challenge: &PerformanceChallenge,
    broker: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    if challenge.status == TrackStatus::Completed {
        return Vec::new();
    }

    let subject = format!("O desafio \"{}\"{}", challenge.title, broker_clause(broker));
    let progress = percent(challenge.total_progress);
    let mut candidates = Vec::with_capacity(2);

    let deadline = match proximity(challenge.end_date, now) {
        Proximity::Overdue => Some((
            Priority::High,
            format!("{} expirou! Progresso final: {}", subject, progress),
        )),
        Proximity::Within24Hours => Some((
            Priority::High,
            format!("{} expira em menos de 24 horas! Progresso: {}", subject, progress),
        )),
        Proximity::Within3Days => Some((
            Priority::Medium,
            format!("{} expira em 3 dias. Progresso: {}", subject, progress),
        )),
        Proximity::Within7Days | Proximity::Later => None,
    };
    if let Some((priority, message)) = deadline {
        candidates.push(Alert::new(
            NotificationType::Challenge,
            &challenge.id,
            CHALLENGE_TITLE,
            priority,
            message,
        ));
    }

    if challenge.total_progress >= COMPLETE_PERCENT {
        candidates.push(Alert::new(
            NotificationType::Performance,
            &challenge.id,
            COMPLETION_TITLE,
            Priority::High,
            format!("Parabéns! {} foi concluído com {} de progresso.", subject, progress),
        ));
    } else if challenge.total_progress >= NEAR_COMPLETION_PERCENT {
        candidates.push(Alert::new(
            NotificationType::Challenge,
            &challenge.id,
            CHALLENGE_TITLE,
            Priority::Medium,
            format!("{} está quase concluído! Progresso: {}", subject, progress),
        ));
    }

    candidates
}
