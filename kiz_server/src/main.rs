//! Session server: login, refresh, logout and session checks over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use kiz_server::{
    api::{self, AppState},
    config::{CliOverrides, ServerConfig},
    logging, metrics,
};
use kiz_session::{
    SessionManager,
    auth::{AuthUser, TokenCodec},
    db::{Database, InMemoryTokenStore, InMemoryUserDirectory},
};
use pico_args::Arguments;

const HELP: &str = "\
Run the KIZ-SPACE session server

USAGE:
  kiz_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT  Server socket bind address   [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url        URL      Database connection string   [default: env DATABASE_URL]
  --metrics-bind  IP:PORT  Prometheus listener address  [default: env METRICS_BIND, disabled]

FLAGS:
  --ephemeral              Keep sessions in memory with a single demo account
  -h, --help               Print help information

ENVIRONMENT:
  JWT_ACCESS_SECRET        Access token signing secret (required, >= 32 chars)
  JWT_REFRESH_SECRET       Refresh token signing secret (required, >= 32 chars, distinct)
  JWT_ACCESS_EXPIRES_IN    Access token lifetime  [default: 15m]
  JWT_REFRESH_EXPIRES_IN   Refresh token lifetime [default: 7d]
  PASSWORD_PEPPER          Password hashing pepper
  APP_ENV                  `production` marks cookies Secure
  COOKIE_SAME_SITE         lax | strict [default: lax]
  DEMO_EMAIL               Ephemeral demo account email    [default: demo@kiz.space]
  DEMO_PASSWORD            Ephemeral demo account password [default: demo-password]
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
        ephemeral: pargs.contains("--ephemeral"),
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        tracing::info!("Prometheus metrics on http://{addr}/metrics");
    }

    let codec = TokenCodec::new(config.codec_config());
    let state = if config.ephemeral {
        ephemeral_state(&config, codec).await?
    } else {
        database_state(&config, codec).await?
    };

    match state.sessions.purge_expired().await {
        Ok(purged) => tracing::info!("Purged {purged} expired or revoked session(s)"),
        Err(e) => tracing::warn!("Session purge failed: {e}"),
    }

    let app = api::create_router(state);

    tracing::info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Shutting down server...");

    Ok(())
}

async fn database_state(config: &ServerConfig, codec: TokenCodec) -> Result<AppState, Error> {
    tracing::info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected successfully");

    let sessions = SessionManager::new(
        codec,
        Arc::new(db.token_store()),
        Arc::new(db.user_directory(config.security.password_pepper.clone())),
    );

    Ok(AppState::new(sessions, config.cookie_policy()).with_database(db))
}

async fn ephemeral_state(config: &ServerConfig, codec: TokenCodec) -> Result<AppState, Error> {
    let email = std::env::var("DEMO_EMAIL").unwrap_or_else(|_| "demo@kiz.space".to_string());
    let password = std::env::var("DEMO_PASSWORD").unwrap_or_else(|_| "demo-password".to_string());

    let users = InMemoryUserDirectory::new(config.security.password_pepper.clone());
    users
        .add_user(
            AuthUser {
                id: "demo".to_string(),
                email: email.clone(),
                nickname: "Demo".to_string(),
                avatar: None,
                verified: true,
            },
            &password,
        )
        .await?;
    tracing::warn!("Ephemeral mode: sessions are kept in memory, demo account {email}");

    let sessions = SessionManager::new(codec, Arc::new(InMemoryTokenStore::new()), Arc::new(users));
    Ok(AppState::new(sessions, config.cookie_policy()))
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {e}");
        std::future::pending::<()>().await;
    }
}
