use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use harmonia_events::{BridgeConfig, ChangeBridge, EventBus, NotificationHub, NotificationRouter, PgChangeFeed};
use harmonia_generation::{GenerationClient, GenerationConfig, HttpFetcher, PredictionApi};
use harmonia_pipeline::{DispatcherConfig, JobDispatcher, PgArrangementStore, Worker};
use harmonia_storage::{BlobStore, LocalBlobStore, S3BlobStore};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harmonia_api::auth::{IdentityResolver, JwtResolver, UserInfoResolver};
use harmonia_api::config::{IdentityConfig, ServerConfig, StorageConfig};
use harmonia_api::{routes, state, ws};

use state::AppState;

/// How long each background task gets to stop after shutdown.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harmonia_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        instance_id = %config.instance_id,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = harmonia_db::create_pool(&database_url, &config.instance_id)
        .await
        .expect("Failed to connect to database");
    harmonia_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    harmonia_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Notification hub, event bus, router ---
    let hub = Arc::new(NotificationHub::new());
    let event_bus = Arc::new(EventBus::default());
    let router_handle = tokio::spawn(
        NotificationRouter::new(Arc::clone(&hub)).run(event_bus.subscribe()),
    );

    // --- Change bridge (writes from other processes) ---
    let bridge_cancel = CancellationToken::new();
    let feed = PgChangeFeed::connect(&pool)
        .await
        .expect("Failed to listen for arrangement changes");
    let bridge = ChangeBridge::new(
        feed,
        Arc::clone(&hub),
        BridgeConfig::default().with_local_origin(config.instance_id.clone()),
    );
    let bridge_handle = tokio::spawn(bridge.run(bridge_cancel.clone()));

    // --- Heartbeat ---
    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&hub), heartbeat_cancel.clone());

    // --- Blob storage ---
    let blobs: Arc<dyn BlobStore> = match &config.storage {
        StorageConfig::S3(s3) => Arc::new(S3BlobStore::from_env(s3.clone()).await),
        StorageConfig::Local { path } => Arc::new(
            LocalBlobStore::open(path)
                .await
                .expect("Failed to open local blob storage"),
        ),
    };

    // --- Identity ---
    let identity: Arc<dyn IdentityResolver> = match &config.identity {
        IdentityConfig::UserInfo { url, client_id } => Arc::new(
            UserInfoResolver::new(url.clone(), client_id.clone())
                .expect("Failed to build identity HTTP client"),
        ),
        IdentityConfig::Jwt { secret } => Arc::new(JwtResolver::new(secret)),
    };

    // --- Generation pipeline ---
    let abort = CancellationToken::new();
    let generation = GenerationClient::new(
        Arc::new(PredictionApi::new(
            config.generation.api_url.clone(),
            config.generation.api_token.clone(),
        )),
        Arc::new(HttpFetcher::new().expect("Failed to build download HTTP client")),
        GenerationConfig {
            melody_version: config.generation.melody_version.clone(),
            stem_version: config.generation.stem_version.clone(),
            ..GenerationConfig::default()
        },
    )
    .with_cancellation(abort.clone());

    let worker = Worker::new(
        Arc::new(PgArrangementStore::new(pool.clone())),
        generation,
        Arc::clone(&blobs),
        Arc::clone(&event_bus),
    );
    let dispatcher = Arc::new(
        JobDispatcher::new(
            worker,
            DispatcherConfig {
                pool_size: config.worker_pool_size,
                drain_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            },
        )
        .with_abort_token(abort),
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        hub: Arc::clone(&hub),
        dispatcher: Arc::clone(&dispatcher),
        blobs,
        identity,
    };

    let cors = build_cors_layer(&config);
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::app_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

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

    bridge_cancel.cancel();
    let _ = tokio::time::timeout(TASK_STOP_TIMEOUT, bridge_handle).await;
    tracing::info!("Change bridge stopped");

    // In-flight jobs still report through the bus, so drain before closing it.
    let drained = dispatcher.shutdown().await;
    tracing::info!(drained, "Job dispatcher stopped");

    // Dropping the last bus handles closes the channel and stops the router.
    drop(dispatcher);
    drop(event_bus);
    let _ = tokio::time::timeout(TASK_STOP_TIMEOUT, router_handle).await;
    tracing::info!("Notification router stopped");

    let connections = hub.connection_count().await;
    tracing::info!(connections, "Closing remaining realtime connections");
    hub.shutdown_all().await;

    heartbeat_cancel.cancel();
    let _ = heartbeat_handle.await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
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
            tracing::info!("Received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// CORS layer for the configured origins. Panics on an unparsable origin.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
