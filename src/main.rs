use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use notifier::clock::{Clock, SystemClock};
use notifier::config::{self, Config};
use notifier::engine::emitter::NotificationCenter;
use notifier::engine::guard::DuplicateGuard;
use notifier::engine::scan::{DeadlineScanner, ScanOutcome};
use notifier::engine::sources::Sources;
use notifier::models::source::{Actor, Role};
use notifier::notification::webhook::WebhookNotifier;
use notifier::session::SessionRegistry;
use notifier::store::postgres::PgStore;
use notifier::{api, cli, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Scan {
            user_id,
            broker_id,
            role,
        }) => run_single_scan(&cfg, &user_id, broker_id, &role).await,
        Some(cli::Commands::Notifications { command }) => {
            handle_notification_command(&cfg, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Logs go to stdout; spans are also exported over OTLP when
/// OTEL_EXPORTER_OTLP_ENDPOINT is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "notifier"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json_logs = std::env::var("NOTIFIER_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (fmt_plain, fmt_json) = if json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "notifier=debug,tower_http=debug".into()),
        ))
        .with(fmt_plain)
        .with(fmt_json)
        .with(telemetry_layer)
        .init();
    Ok(())
}

async fn connect_store(cfg: &Config) -> anyhow::Result<Arc<PgStore>> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url, cfg.engine_settings().dedup_window).await?;
    tracing::info!("Running migrations...");
    db.migrate().await?;
    Ok(Arc::new(db))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let db = connect_store(&cfg).await?;

    let webhook = WebhookNotifier::new(cfg.webhook_urls.clone(), cfg.webhook_secret.clone())?;
    if webhook.is_enabled() {
        tracing::info!(targets = cfg.webhook_urls.len(), "High-priority webhook forwarding enabled");
    }

    let sessions = SessionRegistry::new(
        db.clone(),
        Sources::from_backend(db),
        Arc::new(SystemClock),
        cfg.engine_settings(),
    )
    .with_webhook(webhook);

    let state = AppState::new(sessions, cfg);

    let app = axum::Router::new()
        // Health + metrics endpoints (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/metrics", axum::routing::get(metrics_handler))
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state.clone())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-admin-key"),
                    HeaderName::from_static("x-user-id"),
                ])
        })
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        scan_interval_secs = state.config.scan_interval_secs,
        dedup_window_hours = state.config.dedup_window_hours,
        "Notifier listening on {}",
        addr
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(active = state.sessions.active_count(), "Stopping scan loops");
    state.sessions.deactivate_all();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn metrics_handler() -> impl axum::response::IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

fn center_for(db: &Arc<PgStore>, cfg: &Config, user_id: Uuid) -> NotificationCenter {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    NotificationCenter::new(
        user_id,
        db.clone(),
        clock,
        DuplicateGuard::new(cfg.engine_settings().dedup_window),
    )
}

async fn run_single_scan(
    cfg: &Config,
    user_id: &str,
    broker_id: Option<String>,
    role: &str,
) -> anyhow::Result<()> {
    let user_id = Uuid::parse_str(user_id).context("Invalid user_id")?;
    let role: Role = role.parse()?;
    let db = connect_store(cfg).await?;

    let center = Arc::new(center_for(&db, cfg, user_id));
    center.refresh_notifications().await?;

    let actor = Actor {
        user_id,
        broker_id,
        role,
    };
    let scanner = DeadlineScanner::new(actor, Sources::from_backend(db), center);

    match scanner.check_and_create_deadline_notifications().await {
        ScanOutcome::Completed(report) => {
            println!(
                "{:<12} {:>10} {:>8} {:>11} {:>7}",
                "SOURCE", "EVALUATED", "EMITTED", "SUPPRESSED", "FAILED"
            );
            for (name, s) in [
                ("tasks", report.tasks),
                ("goals", report.goals),
                ("events", report.events),
                ("meetings", report.meetings),
                ("challenges", report.challenges),
            ] {
                println!(
                    "{:<12} {:>10} {:>8} {:>11} {:>7}",
                    name, s.evaluated, s.emitted, s.suppressed, s.failed
                );
            }
        }
        ScanOutcome::AlreadyRunning => println!("A scan pass is already running."),
    }
    Ok(())
}

async fn handle_notification_command(
    cfg: &Config,
    cmd: cli::NotificationCommands,
) -> anyhow::Result<()> {
    let user_id = match &cmd {
        cli::NotificationCommands::List { user_id }
        | cli::NotificationCommands::ReadAll { user_id }
        | cli::NotificationCommands::ClearRead { user_id } => {
            Uuid::parse_str(user_id).context("Invalid user_id")?
        }
    };
    let db = connect_store(cfg).await?;
    let center = center_for(&db, cfg, user_id);
    center.refresh_notifications().await?;

    match cmd {
        cli::NotificationCommands::List { .. } => {
            let notifications = center.notifications().await;
            if notifications.is_empty() {
                println!("No notifications.");
            } else {
                println!(
                    "{:<38} {:<12} {:<8} {:<6} {:<25} TITLE",
                    "ID", "TYPE", "PRIORITY", "READ", "CREATED"
                );
                for n in notifications {
                    println!(
                        "{:<38} {:<12} {:<8} {:<6} {:<25} {}",
                        n.id,
                        n.r#type.as_str(),
                        n.priority.as_str(),
                        n.is_read,
                        n.created_at.to_rfc3339(),
                        n.title
                    );
                }
            }
        }
        cli::NotificationCommands::ReadAll { .. } => {
            let updated = center.mark_all_as_read().await?;
            println!("Marked {} notification(s) as read.", updated);
        }
        cli::NotificationCommands::ClearRead { .. } => {
            let dismissed = center.delete_all_read().await?;
            println!("Dismissed {} read notification(s).", dismissed);
        }
    }
    Ok(())
}
