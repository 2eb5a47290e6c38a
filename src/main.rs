use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Redis client for the rate limiter backend (construction only; the
    // limiter falls back to in-memory when the connection fails)
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url.clone())?);

    // Event channel and processor
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Aggregate app services used by HTTP handlers
    let services = api::AppServices::new(db.clone(), &cfg, event_sender.clone());

    let config = Arc::new(cfg);
    let app_state = api::AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    // Rate limiter: built once, injected through middleware state so every
    // request shares the same counters
    let rl_config = api::rate_limiter::RateLimitConfig {
        requests_per_window: config.rate_limit_requests_per_window,
        window_duration: Duration::from_secs(config.rate_limit_window_seconds),
        enable_headers: config.rate_limit_enable_headers,
    };
    let rl_backend = if config.rate_limit_use_redis {
        api::rate_limiter::RateLimitBackend::Redis {
            client: redis_client,
            namespace: config.rate_limit_namespace.clone(),
        }
    } else {
        api::rate_limiter::RateLimitBackend::InMemory
    };
    let rate_limit_state = api::rate_limiter::RateLimitState {
        limiter: Arc::new(api::rate_limiter::RateLimiter::new(rl_config, rl_backend)),
        jwt_secret: config.jwt_secret.clone(),
    };

    let cors_layer = if config.is_production() {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer)
        .layer(axum::middleware::from_fn_with_state(
            rate_limit_state,
            api::rate_limiter::rate_limit_middleware,
        ))
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
