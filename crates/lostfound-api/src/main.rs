//! lostfound-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lostfound_api::services::{identity_from_key, maintenance};
use lostfound_api::{build_router, AppConfig, AppState, StoreBackend};
use lostfound_db::{Database, Stores};
use lostfound_media::{CloudinaryHost, DisabledImageHost, ImageHost};
use lostfound_notify::{LogMailer, Mailer, SmtpConfig, SmtpMailer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "lostfound_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lostfound_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("lostfound-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env();

    let (stores, db) = match config.store_backend {
        StoreBackend::Postgres => {
            info!("Connecting to database...");
            let db = Database::connect(&config.database_url).await?;
            info!("Running migrations...");
            db.migrate().await?;
            (Stores::postgres(&db), Some(db))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores, data is lost on restart");
            (Stores::in_memory(), None)
        }
    };

    let mailer: Arc<dyn Mailer> = match (&config.email_user, &config.email_pass) {
        (Some(user), Some(pass)) => {
            let mut smtp = SmtpConfig::new(user, pass);
            smtp.host = config.smtp_host.clone();
            smtp.port = config.smtp_port;
            smtp.from_name = config.mail_from_name.clone();
            Arc::new(SmtpMailer::new(smtp)?)
        }
        _ => {
            warn!("EMAIL_USER/EMAIL_PASS not set, outbound email will only be logged");
            Arc::new(LogMailer)
        }
    };

    let images: Arc<dyn ImageHost> = match CloudinaryHost::from_env() {
        Some(host) => Arc::new(host),
        None => {
            warn!("Cloudinary credentials not set, image uploads are disabled");
            Arc::new(DisabledImageHost)
        }
    };

    let identity = identity_from_key(config.firebase_api_key.as_deref());

    let host = config.host.clone();
    let port = config.port;
    let sweep_interval = Duration::from_secs(config.maintenance_interval_secs);
    let state = AppState::new(config, stores.clone(), mailer, images, identity)?;

    maintenance::spawn(stores, db, sweep_interval);

    if state.rate_limiter.is_some() {
        info!(
            requests = state.config.rate_limit_requests,
            period_secs = state.config.rate_limit_period_secs,
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled");
    }

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
