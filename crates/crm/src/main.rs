//! Cellionyx CRM - lead intake, sales portal and credit ledger API.
//!
//! This binary serves the JSON API on port 8080.
//!
//! # Architecture
//!
//! - Axum web framework, bearer token authentication
//! - `PostgreSQL` store via sqlx (in-memory store when no database is set)
//! - SMTP notification emails rendered with Askama
//! - Stripe for credit package charges

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use cellionyx_crm::config::CrmConfig;
use cellionyx_crm::db::{self, MemoryStore, PgStore, Store};
use cellionyx_crm::payments::{PaymentProcessor, StripeClient};
use cellionyx_crm::services::{Mailer, NoopMailer, SmtpMailer, performance};
use cellionyx_crm::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CrmConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = CrmConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cellionyx_crm=info,tower_http=debug".into());

    // Use JSON format on Fly.io for structured log parsing, text format locally
    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p cellionyx-cli -- migrate
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.email {
        Some(email) => Arc::new(
            SmtpMailer::new(
                email,
                config.notifications.clone(),
                config.portal_url.clone(),
            )
            .expect("Failed to configure SMTP"),
        ),
        None => {
            tracing::warn!("SMTP not configured, notification emails are disabled");
            Arc::new(NoopMailer)
        }
    };

    let processor: Option<Arc<dyn PaymentProcessor>> = match &config.stripe {
        Some(stripe) => Some(Arc::new(
            StripeClient::new(stripe).expect("Failed to create Stripe client"),
        )),
        None => {
            tracing::warn!("Stripe not configured, credit purchases are unavailable");
            None
        }
    };

    let state = AppState::new(config.clone(), store, mailer, processor);

    // Periodic rep performance refresh in the background
    if let Some(every) = config.performance_refresh_interval {
        tokio::spawn(performance::run_periodic(state.store_handle(), every));
        tracing::info!(interval_secs = every.as_secs(), "Performance refresh scheduled");
    }

    let app = cellionyx_crm::app(state, true);

    // Start server
    let addr = config.socket_addr();
    tracing::info!("crm listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
