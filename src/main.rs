use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;

use arena_backend::api;
use arena_backend::config::Config;
use arena_backend::controller::{spawn_housekeeping, spawn_matchmaking_worker, Controller};
use arena_backend::metrics;
use arena_backend::rate_limit::RateLimiter;
use arena_backend::registry::ConnectionRegistry;
use arena_backend::store::{MemoryBotStore, MemoryMatchStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let cfg = Config::load();
    tracing::info!(
        tick_rate = cfg.tick_rate,
        decision_timeout_ms = cfg.decision_timeout_ms,
        "Starting arena backend"
    );

    let registry = Arc::new(ConnectionRegistry::new());
    let rate_limiter = RateLimiter::new(cfg.rate_limits);
    let bot_store = Arc::new(MemoryBotStore::new());
    let match_store = Arc::new(MemoryMatchStore::new());

    let controller = Controller::new(
        cfg.clone(),
        registry.clone(),
        bot_store,
        match_store,
        rate_limiter.clone(),
    );

    // Background tasks: the matchmaking pairing pass and the stale-session sweep.
    let matchmaking_task = spawn_matchmaking_worker(controller.clone(), cfg.matchmaking_interval_ms);
    let housekeeping_task = spawn_housekeeping(registry.clone(), cfg.connection_stale_ms);

    let app = api::router(registry, controller.clone(), rate_limiter)
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", addr));

    tracing::info!("Arena backend listening on port {}", cfg.port);

    // On ctrl-c: stop matchmaking first, then terminate live matches, then
    // let the server drain.
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
        matchmaking_task.abort();
        housekeeping_task.abort();
        controller.shutdown();
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .expect("Failed to start server");
}
