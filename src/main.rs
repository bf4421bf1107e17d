use anyhow::Result;
use cas_gateway::{
    cas::{session::spawn_session_sweeper, MemorySessionStore},
    tenants, web, AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CAS gateway");

    // Load configuration from environment
    let config = cas_gateway::config::Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        connect_timeout_secs = config.http_connect_timeout_secs,
        request_timeout_secs = config.http_request_timeout_secs,
        session_idle_timeout_secs = config.session_idle_timeout_secs,
        "Configuration loaded"
    );

    // Load and validate tenant descriptor (logs summary internally)
    let registry = tenants::load_tenants(&config.tenants)?;

    // Idle sessions are dropped on access and swept once a minute
    let sessions = Arc::new(MemorySessionStore::with_idle_timeout(Duration::from_secs(
        config.session_idle_timeout_secs,
    )));
    spawn_session_sweeper(sessions.clone(), Duration::from_secs(60));

    let bind_address = config.bind_address();
    let state = Arc::new(AppState::new(config, registry, sessions)?);

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("CAS gateway listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
