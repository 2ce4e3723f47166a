//! eLearn API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use elearn_common::config::AppConfig;
use elearn_common::db::{create_pool, run_migrations};
use elearn_common::redis_pool::create_redis_pool;
use elearn_realtime::{ChannelLayer, ChatHub, RedisRelay};

use elearn_api::routes::create_router;
use elearn_api::state::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "elearn_api=debug,elearn_engine=debug,elearn_realtime=debug,tower_http=debug",
        )
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting eLearn API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    // Chat channel layer: in-process only, or relayed through Redis
    let hub = Arc::new(ChatHub::new(config.chat_broadcast_capacity));
    let channels = if config.chat_redis_relay {
        let (client, manager) = create_redis_pool(&config.redis_url).await?;
        RedisRelay::spawn_listener(client, hub.clone());
        tracing::info!("Chat relay enabled");
        ChannelLayer::relayed(hub, RedisRelay::new(manager))
    } else {
        ChannelLayer::local(hub)
    };

    let addr: SocketAddr = config.api_bind_addr.parse().map_err(|e| {
        anyhow::anyhow!("API_BIND_ADDR '{}' is invalid: {}", config.api_bind_addr, e)
    })?;

    // Build application state
    let state = AppState::new(pool, config, channels);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
