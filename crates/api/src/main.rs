use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_api::chat::EventRouter;
use bazaar_api::config::ServerConfig;
use bazaar_api::router::build_app_router;
use bazaar_api::state::AppState;
use bazaar_api::ws;
use bazaar_db::{ChatStore, MemoryChatStore, PgChatStore};
use bazaar_events::{Backplane, EventBus, LocalBackplane, RedisBackplane, TopicHub};
use bazaar_presence::{
    MemoryPresenceDirectory, PresenceCounter, PresenceDirectory, RedisPresenceDirectory,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(database_url) => {
            let pool = bazaar_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            bazaar_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            bazaar_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgChatStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, rooms and messages are kept in memory");
            Arc::new(MemoryChatStore::new())
        }
    };

    // --- Hub, backplane, presence ---
    let hub = Arc::new(TopicHub::new());
    let listener_cancel = CancellationToken::new();

    let (backplane, presence, listener_handle): (
        Arc<dyn Backplane>,
        Arc<dyn PresenceDirectory>,
        Option<tokio::task::JoinHandle<()>>,
    ) = match &config.redis_url {
        Some(redis_url) => {
            let backplane =
                RedisBackplane::connect(redis_url, config.redis_key_prefix.clone(), Arc::clone(&hub))
                    .await
                    .expect("Failed to connect backplane to Redis");
            let handle = backplane.spawn_listener(listener_cancel.clone());

            let presence = RedisPresenceDirectory::connect(
                redis_url,
                config.redis_key_prefix.clone(),
                Duration::from_secs(config.presence_ttl_secs),
            )
            .await
            .expect("Failed to connect presence directory to Redis");
            tracing::info!(prefix = %config.redis_key_prefix, "Redis presence and backplane ready");

            let backplane: Arc<dyn Backplane> = Arc::new(backplane);
            let presence: Arc<dyn PresenceDirectory> = Arc::new(presence);
            (backplane, presence, Some(handle))
        }
        None => {
            tracing::warn!("REDIS_URL not set, presence and broadcast are process-local");
            let backplane: Arc<dyn Backplane> = Arc::new(LocalBackplane::new(Arc::clone(&hub)));
            let presence: Arc<dyn PresenceDirectory> = Arc::new(MemoryPresenceDirectory::new());
            (backplane, presence, None)
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let reporter_handle = tokio::spawn(bazaar_events::bus::run_reporter(event_bus.subscribe()));
    tracing::info!("Event bus created");

    // --- Chat router ---
    let chat = Arc::new(EventRouter::new(
        backplane,
        presence,
        store,
        Arc::new(PresenceCounter::new()),
        Arc::clone(&event_bus),
    ));

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&chat),
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        chat: Arc::clone(&chat),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    let ws_count = hub.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    hub.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    listener_cancel.cancel();
    if let Some(handle) = listener_handle {
        let _ = tokio::time::timeout(drain, handle).await;
    }

    // The reporter exits once every EventBus handle is gone.
    drop(chat);
    drop(event_bus);
    let _ = tokio::time::timeout(drain, reporter_handle).await;
    tracing::info!("Event reporter stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
