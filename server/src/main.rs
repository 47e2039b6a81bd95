use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use relay_server::enrich::object_store::{ObjectStore, ObjectStoreConfig};
use relay_server::enrich::speech::{SpeechClient, SpeechConfig};
use relay_server::handlers::{self, AppState};
use relay_server::health::HealthState;
use relay_server::metrics::MetricsRecorder;
use relay_server::realtime::registry::ConnectionRegistry;
use relay_server::realtime::websocket::WsState;
use relay_server::middleware::rate_limit::RateLimiter;
use relay_server::store::pg::{init_db, DbConfig, PgTable};
use relay_server::store::Table;
use relay_server::{changestream, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            "debug".to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            "warn".to_string()
        }
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting relay server");

    let metrics_recorder = MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();

    let pool = init_db(DbConfig::default()).await?;
    let table: Arc<dyn Table> = Arc::new(PgTable::new(pool));
    tracing::info!("table gateway initialized");

    let registry = Arc::new(ConnectionRegistry::new());
    let object_store = Arc::new(ObjectStore::new(ObjectStoreConfig::default()).await?);
    let speech = Arc::new(SpeechClient::new(SpeechConfig::default()));

    let dispatcher_ctx = Arc::new(changestream::DispatcherContext::new(
        table.clone(),
        registry.clone(),
        object_store.clone(),
        speech.clone(),
    ));
    tokio::spawn(jobs::run_changestream_worker(dispatcher_ctx));
    tokio::spawn(jobs::run_ttl_sweep_worker(table.clone()));
    tracing::info!("background workers started");

    let app_state = AppState {
        table: table.clone(),
        registry: registry.clone(),
    };
    let ws_state = WsState {
        table: table.clone(),
        registry: registry.clone(),
        object_store: object_store.clone(),
    };
    let health_state = HealthState {
        table: table.clone(),
        registry: registry.clone(),
    };

    let metrics_router = if matches!(
        std::env::var("ENABLE_METRICS").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    ) {
        Router::new()
            .route("/metrics", get(relay_server::metrics::metrics_handler))
            .with_state(metrics_handle)
    } else {
        Router::new()
    };

    let stage = std::env::var("STAGE").unwrap_or_else(|_| "prod".to_string());
    let rate_limiter = Arc::new(RateLimiter::default());
    {
        let rate_limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                ticker.tick().await;
                rate_limiter
                    .cleanup_old_buckets(std::time::Duration::from_secs(600))
                    .await;
            }
        });
    }

    let http_router = Router::new()
        .route(&format!("/{stage}/reqotp"), post(handlers::req_otp))
        .route(&format!("/{stage}/login"), post(handlers::login_handler))
        .route("/webhook/{bot_name}/{bot_kind}", post(handlers::webhook))
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            relay_server::middleware::rate_limit::rate_limit_middleware,
        ))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/admin/push", post(handlers::admin_push))
        .with_state(app_state.clone());

    let ws_router = Router::new()
        .route("/ws", get(relay_server::realtime::websocket::upgrade))
        .with_state(ws_state);

    let health_router = Router::new()
        .route("/health", get(relay_server::health::health))
        .route("/health/live", get(relay_server::health::liveness))
        .route("/health/ready", get(relay_server::health::readiness))
        .with_state(health_state);

    let app = Router::new()
        .merge(http_router)
        .merge(admin_router)
        .merge(ws_router)
        .merge(health_router)
        .merge(metrics_router)
        .layer(axum::middleware::from_fn(
            relay_server::middleware::logging::log_request_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("SERVER_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
