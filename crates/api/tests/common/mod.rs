#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use harmonia_api::auth::{IdentityError, IdentityResolver};
use harmonia_api::config::{GenerationSettings, IdentityConfig, ServerConfig, StorageConfig};
use harmonia_api::routes;
use harmonia_api::state::AppState;
use harmonia_core::types::{DbId, OwnerId};
use harmonia_db::models::arrangement::{Arrangement, CreateArrangement};
use harmonia_db::models::status::ArrangementStatus;
use harmonia_db::repositories::ArrangementRepo;
use harmonia_events::{EventBus, NotificationHub};
use harmonia_generation::{
    AssetFetcher, GenerationClient, GenerationConfig, Prediction, PredictionApiError,
    PredictionBackend,
};
use harmonia_pipeline::{DispatcherConfig, JobDispatcher, PgArrangementStore, Worker};
use harmonia_storage::{BlobStore, LocalBlobStore};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

pub const OWNER: OwnerId = 42;
pub const OTHER_OWNER: OwnerId = 7;
pub const BOUNDARY: &str = "harmonia-test-boundary";

/// Credential the test resolver maps to `owner_id`.
pub fn token(owner_id: OwnerId) -> String {
    format!("owner-{owner_id}")
}

/// Accepts `owner-<id>` credentials.
pub struct TestIdentity;

#[async_trait]
impl IdentityResolver for TestIdentity {
    async fn resolve(&self, credential: &str) -> Result<OwnerId, IdentityError> {
        credential
            .strip_prefix("owner-")
            .and_then(|id| id.parse().ok())
            .ok_or(IdentityError::Rejected)
    }
}

/// A prediction service that refuses every request, so jobs fail fast.
struct RefusingBackend;

fn refused() -> PredictionApiError {
    PredictionApiError::ApiError {
        status: 422,
        body: "refused by test backend".into(),
    }
}

#[async_trait]
impl PredictionBackend for RefusingBackend {
    async fn create(
        &self,
        _version: &str,
        _input: &serde_json::Value,
    ) -> Result<Prediction, PredictionApiError> {
        Err(refused())
    }

    async fn get(&self, _id: &str) -> Result<Prediction, PredictionApiError> {
        Err(refused())
    }

    async fn cancel(&self, _id: &str) -> Result<(), PredictionApiError> {
        Ok(())
    }
}

struct NoFetch;

#[async_trait]
impl AssetFetcher for NoFetch {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, PredictionApiError> {
        Err(refused())
    }
}

pub fn test_config(blob_dir: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        ws_auth_timeout_secs: 1,
        instance_id: "harmonia-test".to_string(),
        worker_pool_size: 2,
        per_page: 2,
        host_url: "http://localhost:5000".to_string(),
        generation: GenerationSettings {
            api_url: "http://127.0.0.1:1".to_string(),
            api_token: "unused".to_string(),
            melody_version: "melody".to_string(),
            stem_version: "stem".to_string(),
        },
        identity: IdentityConfig::Jwt {
            secret: "unused".to_string(),
        },
        storage: StorageConfig::Local {
            path: blob_dir.to_string(),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _blob_dir: TempDir,
}

/// Build the application router over `pool` with test collaborators:
/// `owner-<id>` credentials, a temp-dir blob store, and a prediction
/// service that refuses every job.
pub async fn build_test_app(pool: PgPool) -> TestApp {
    let blob_dir = tempfile::tempdir().unwrap();
    let config = test_config(blob_dir.path().to_str().unwrap());

    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::open(blob_dir.path()).await.unwrap());
    let hub = Arc::new(NotificationHub::new());
    let bus = Arc::new(EventBus::default());

    let generation = GenerationClient::new(
        Arc::new(RefusingBackend),
        Arc::new(NoFetch),
        GenerationConfig::default(),
    );
    let worker = Worker::new(
        Arc::new(PgArrangementStore::new(pool.clone())),
        generation,
        Arc::clone(&blobs),
        bus,
    );
    let dispatcher = Arc::new(JobDispatcher::new(
        worker,
        DispatcherConfig {
            pool_size: config.worker_pool_size,
            drain_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        },
    ));

    let state = AppState {
        pool,
        config: Arc::new(config),
        hub,
        dispatcher,
        blobs,
        identity: Arc::new(TestIdentity),
    };

    let router = Router::new()
        .merge(routes::health::router())
        .merge(routes::app_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    TestApp {
        router,
        state,
        _blob_dir: blob_dir,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn authed(method: &str, uri: &str, owner_id: OwnerId) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token(owner_id)))
}

/// Send a request and decode the body as JSON (`Null` when empty or not JSON).
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, _, bytes) = send_raw(router, request).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn send_raw(
    router: &Router,
    request: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes.to_vec())
}

pub async fn get(router: &Router, uri: &str, owner_id: OwnerId) -> (StatusCode, serde_json::Value) {
    send(router, authed("GET", uri, owner_id).body(Body::empty()).unwrap()).await
}

/// Encode text fields and an optional `file` part as multipart/form-data.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"drums.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn create_request(owner_id: OwnerId, body: Vec<u8>) -> Request<Body> {
    authed("POST", "/api/arrangements", owner_id)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// A short mono 16-bit WAV.
pub fn wav(secs: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(secs * 8000.0) as usize {
            let t = i as f32 / 8000.0;
            let sample = (t * 110.0 * std::f32::consts::TAU).sin() * 0.5;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn seed(pool: &PgPool, owner_id: OwnerId, name: &str, tags: &str) -> Arrangement {
    ArrangementRepo::create(
        pool,
        &CreateArrangement {
            owner_id,
            name: name.to_string(),
            bpm: 120.0,
            tags: tags.to_string(),
        },
    )
    .await
    .unwrap()
}

/// Seed an arrangement and complete it with `mix` stored as its blob.
pub async fn seed_completed(app: &TestApp, owner_id: OwnerId, name: &str, mix: &[u8]) -> Arrangement {
    let record = seed(&app.state.pool, owner_id, name, "rock").await;
    let blob = harmonia_storage::new_blob_name();
    app.state.blobs.put(&blob, mix.to_vec()).await.unwrap();
    ArrangementRepo::transition(
        &app.state.pool,
        record.id,
        ArrangementStatus::Completed,
        Some(&blob),
    )
    .await
    .unwrap()
    .unwrap()
}

/// Poll until the arrangement reaches a terminal status.
pub async fn wait_for_terminal(pool: &PgPool, id: DbId) -> Arrangement {
    for _ in 0..250 {
        let record = ArrangementRepo::find_by_id(pool, id).await.unwrap().unwrap();
        if record.status().is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("arrangement {id} never finished");
}
