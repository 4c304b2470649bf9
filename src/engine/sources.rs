//! Read-only capabilities over the collections the scanner watches.
//!
//! Each collection is owned by a different back-office module, so the scanner
//! depends on one narrow trait per source rather than on any concrete store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::source::{
    Actor, Broker, Event, Goal, Meeting, PerformanceChallenge, Task,
};

#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_tasks(&self, actor: &Actor) -> anyhow::Result<Vec<Task>>;
}

#[async_trait]
pub trait GoalSource: Send + Sync {
    async fn list_goals(&self, actor: &Actor) -> anyhow::Result<Vec<Goal>>;
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_events(&self, actor: &Actor) -> anyhow::Result<Vec<Event>>;
}

#[async_trait]
pub trait MeetingSource: Send + Sync {
    async fn list_meetings(&self, actor: &Actor) -> anyhow::Result<Vec<Meeting>>;
}

#[async_trait]
pub trait BrokerDirectory: Send + Sync {
    async fn list_brokers(&self, actor: &Actor) -> anyhow::Result<Vec<Broker>>;
}

#[async_trait]
pub trait ChallengeSource: Send + Sync {
    /// Role-aware: managers and admins get every challenge, brokers only
    /// the ones assigned to their own broker id.
    async fn list_challenges(&self, actor: &Actor) -> anyhow::Result<Vec<PerformanceChallenge>>;
}

/// The full set of capabilities one scan pass reads from.
#[derive(Clone)]
pub struct Sources {
    pub tasks: Arc<dyn TaskSource>,
    pub goals: Arc<dyn GoalSource>,
    pub events: Arc<dyn EventSource>,
    pub meetings: Arc<dyn MeetingSource>,
    pub brokers: Arc<dyn BrokerDirectory>,
    pub challenges: Arc<dyn ChallengeSource>,
}

impl Sources {
    /// Use one backend for every capability.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: TaskSource
            + GoalSource
            + EventSource
            + MeetingSource
            + BrokerDirectory
            + ChallengeSource
            + 'static,
    {
        Self {
            tasks: backend.clone(),
            goals: backend.clone(),
            events: backend.clone(),
            meetings: backend.clone(),
            brokers: backend.clone(),
            challenges: backend,
        }
    }
}

// ── In-memory snapshots ──────────────────────────────────────

/// Snapshot collections held in memory, refreshed by whoever owns them.
#[derive(Default)]
pub struct MemorySources {
    pub tasks: RwLock<Vec<Task>>,
    pub goals: RwLock<Vec<Goal>>,
    pub events: RwLock<Vec<Event>>,
    pub meetings: RwLock<Vec<Meeting>>,
    pub brokers: RwLock<Vec<Broker>>,
    pub challenges: RwLock<Vec<PerformanceChallenge>>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskSource for MemorySources {
    async fn list_tasks(&self, _actor: &Actor) -> anyhow::Result<Vec<Task>> {
        Ok(self.tasks.read().await.clone())
    }
}

#[async_trait]
impl GoalSource for MemorySources {
    async fn list_goals(&self, _actor: &Actor) -> anyhow::Result<Vec<Goal>> {
        Ok(self.goals.read().await.clone())
    }
}

#[async_trait]
impl EventSource for MemorySources {
    async fn list_events(&self, _actor: &Actor) -> anyhow::Result<Vec<Event>> {
        Ok(self.events.read().await.clone())
    }
}

#[async_trait]
impl MeetingSource for MemorySources {
    async fn list_meetings(&self, _actor: &Actor) -> anyhow::Result<Vec<Meeting>> {
        Ok(self.meetings.read().await.clone())
    }
}

#[async_trait]
impl BrokerDirectory for MemorySources {
    async fn list_brokers(&self, _actor: &Actor) -> anyhow::Result<Vec<Broker>> {
        Ok(self.brokers.read().await.clone())
    }
}

#[async_trait]
impl ChallengeSource for MemorySources {
    async fn list_challenges(&self, actor: &Actor) -> anyhow::Result<Vec<PerformanceChallenge>> {
        let challenges = self.challenges.read().await;
        Ok(challenges
            .iter()
            .filter(|c| {
                actor.role.sees_all_challenges()
                    || (actor.broker_id.is_some() && c.broker_id == actor.broker_id)
            })
            .cloned()
            .collect())
    }
}
