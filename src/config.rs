use std::time::Duration;

use serde::Deserialize;

use crate::engine::guard::DEFAULT_DEDUP_WINDOW_HOURS;
use crate::jobs::deadline_scan::DEFAULT_SCAN_INTERVAL_SECS;
use crate::session::EngineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: String,
    /// Seconds between scan passes for each active session.
    /// Set via NOTIFIER_SCAN_INTERVAL_SECS. Default: 300.
    pub scan_interval_secs: u64,
    /// Rolling dedup window in hours. Set via NOTIFIER_DEDUP_WINDOW_HOURS. Default: 24.
    pub dedup_window_hours: i64,
    /// Comma-separated list of URLs that receive high-priority alerts.
    pub webhook_urls: Vec<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            dedup_window: chrono::Duration::hours(self.dedup_window_hours),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let admin_key = std::env::var("NOTIFIER_ADMIN_KEY")
        .unwrap_or_else(|_| "CHANGE_ME_ADMIN_KEY".into());

    if admin_key == "CHANGE_ME_ADMIN_KEY" {
        let env_mode = std::env::var("NOTIFIER_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "NOTIFIER_ADMIN_KEY is still the insecure placeholder. \
                 Set a real key before running in production."
            );
        }
        tracing::warn!("NOTIFIER_ADMIN_KEY is not set, using insecure placeholder");
    }

    let scan_interval_secs = std::env::var("NOTIFIER_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS);

    let dedup_window_hours = std::env::var("NOTIFIER_DEDUP_WINDOW_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|hours| *hours > 0)
        .unwrap_or(DEFAULT_DEDUP_WINDOW_HOURS);

    Ok(Config {
        port: std::env::var("NOTIFIER_PORT")
            .unwrap_or_else(|_| "8450".into())
            .parse()
            .unwrap_or(8450),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/brokerage".into()),
        admin_key,
        scan_interval_secs,
        dedup_window_hours,
        webhook_urls: std::env::var("NOTIFIER_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        webhook_secret: std::env::var("NOTIFIER_WEBHOOK_SECRET").ok(),
    })
}
