//! Read-only snapshots of the domain collections the deadline scanner watches.
//!
//! These are owned by their respective back-office modules; the scanner only
//! ever reads them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix the back-office uses for records that have not been persisted yet.
pub const PLACEHOLDER_ID_PREFIX: &str = "temp-";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum TaskStatus {
    #[serde(rename = "Pendente")]
    Pending,
    #[serde(rename = "Em Progresso")]
    InProgress,
    #[serde(rename = "Concluída")]
    Done,
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendente" | "pending" | "todo" => Ok(TaskStatus::Pending),
            "em progresso" | "em_progresso" | "in_progress" => Ok(TaskStatus::InProgress),
            "concluída" | "concluida" | "done" | "completed" => Ok(TaskStatus::Done),
            other => anyhow::bail!("unknown task status: {}", other),
        }
    }
}

/// Lifecycle shared by goals and performance challenges.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Active,
    Completed,
    Cancelled,
}

impl FromStr for TrackStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "ativo" | "ativa" => Ok(TrackStatus::Active),
            "completed" | "concluido" | "concluído" | "concluida" | "concluída" => {
                Ok(TrackStatus::Completed)
            }
            "cancelled" | "canceled" | "cancelado" | "cancelada" => Ok(TrackStatus::Cancelled),
            other => anyhow::bail!("unknown status: {}", other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub status: TaskStatus,
    pub broker_id: Option<String>,
}

impl Task {
    /// True for optimistic rows that will be re-keyed once persisted.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_ID_PREFIX)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub end_date: DateTime<Utc>,
    pub status: TrackStatus,
    /// Percentage, 0..=100 (may exceed 100 when over-achieved).
    pub progress: f64,
    pub broker_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub datetime: DateTime<Utc>,
    /// Free-form priority label; "Alta" marks an important event.
    pub priority: Option<String>,
}

impl Event {
    pub fn is_high_priority(&self) -> bool {
        self.priority
            .as_deref()
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("alta"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Meeting {
    pub id: String,
    pub client_name: String,
    pub meeting_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Broker {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceChallenge {
    pub id: String,
    pub title: String,
    pub end_date: DateTime<Utc>,
    pub status: TrackStatus,
    pub total_progress: f64,
    pub broker_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Broker,
}

impl Role {
    /// Managers and admins see every broker's challenges.
    pub fn sees_all_challenges(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" | "gerente" => Ok(Role::Manager),
            "broker" | "corretor" => Ok(Role::Broker),
            other => anyhow::bail!("unknown role: {}", other),
        }
    }
}

/// The authenticated user a session (and every store call) is scoped to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Actor {
    pub user_id: Uuid,
    pub broker_id: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_parses_portuguese_labels() {
        assert_eq!("Em Progresso".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("Concluída".parse::<TaskStatus>().unwrap(), TaskStatus::Done);
        assert_eq!("pendente".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert!("arquivada".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_placeholder_task_ids() {
        let task = Task {
            id: "temp-1718000000".into(),
            title: "Ligar para cliente".into(),
            due_date: Utc::now(),
            status: TaskStatus::Pending,
            broker_id: None,
        };
        assert!(task.is_placeholder());
    }

    #[test]
    fn test_event_priority_label_is_case_insensitive() {
        let mut event = Event {
            id: "ev1".into(),
            title: "Visita".into(),
            datetime: Utc::now(),
            priority: Some("ALTA".into()),
        };
        assert!(event.is_high_priority());
        event.priority = Some("Média".into());
        assert!(!event.is_high_priority());
        event.priority = None;
        assert!(!event.is_high_priority());
    }

    #[test]
    fn test_role_visibility() {
        assert!(Role::Manager.sees_all_challenges());
        assert!(!Role::Broker.sees_all_challenges());
        assert_eq!("corretor".parse::<Role>().unwrap(), Role::Broker);
    }
}
