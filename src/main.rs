use rust_crm_api::{app, config::Config, handlers::AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are swept from the store.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Main entry point for the application.
///
/// Initializes logging, configuration and storage (in-memory mock or
/// PostgreSQL), starts the expired-session sweeper, then serves the API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_crm_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let store = app::open_store(&config).await?;

    let app_state = Arc::new(AppState::new(store, config.clone()));

    let sweeper_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper_state
                .store
                .purge_expired_sessions(chrono::Utc::now())
                .await
            {
                Ok(0) => {}
                Ok(purged) => tracing::info!("Purged {} expired session(s)", purged),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    });

    let app = app::build_router(app_state)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Connect info lets the rate limiter fall back to the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
