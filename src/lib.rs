//! Notifier: deadline-driven notification engine for the brokerage back-office.
//!
//! The binary in `main.rs` wires these modules to Postgres and axum; the
//! integration tests in `tests/` drive them with in-memory backends.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod session;
pub mod store;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub sessions: session::SessionRegistry,
    pub config: config::Config,
}

impl AppState {
    pub fn new(sessions: session::SessionRegistry, config: config::Config) -> Arc<Self> {
        Arc::new(Self { sessions, config })
    }
}
