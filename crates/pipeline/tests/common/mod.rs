//! In-memory collaborators for pipeline tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harmonia_audio::{AudioBuffer, AudioFormat};
use harmonia_core::types::{DbId, OwnerId};
use harmonia_db::models::arrangement::Arrangement;
use harmonia_db::models::status::ArrangementStatus;
use harmonia_events::{EventBus, JobEvent, NotificationHub, NotificationRouter};
use harmonia_generation::{
    AssetFetcher, GenerationClient, GenerationConfig, Prediction, PredictionApiError,
    PredictionBackend, PredictionStatus,
};
use harmonia_pipeline::{ArrangementStore, JobRequest, Worker};
use harmonia_storage::{BlobStore, StorageError};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const OWNER: OwnerId = 42;
pub const RATE: u32 = 8_000;

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// A 16-bit mono sine WAV, `secs` long.
pub fn wav(secs: f64, freq: f32) -> Vec<u8> {
    let frames = (secs * f64::from(RATE)) as usize;
    let samples = (0..frames)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
        .collect();
    AudioBuffer {
        format: AudioFormat {
            sample_rate: RATE,
            channels: 1,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
        channels: vec![samples],
    }
    .encode()
    .unwrap()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<DbId, Arrangement>>,
    /// Transitions into this status fail with a database error.
    pub failing_status: Mutex<Option<ArrangementStatus>>,
    /// `find` on this id panics.
    pub panic_on: Mutex<Option<DbId>>,
}

impl MemoryStore {
    pub fn with_pending(ids: &[DbId]) -> Arc<Self> {
        let store = Self::default();
        for &id in ids {
            store.insert(id, ArrangementStatus::Pending);
        }
        Arc::new(store)
    }

    pub fn insert(&self, id: DbId, status: ArrangementStatus) {
        let now = chrono::Utc::now();
        self.rows.lock().unwrap().insert(
            id,
            Arrangement {
                id,
                owner_id: OWNER,
                name: format!("arrangement {id}"),
                bpm: 120.0,
                tags: "rock".into(),
                status_id: status.id(),
                asset_ref: None,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn get(&self, id: DbId) -> Option<Arrangement> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ArrangementStore for MemoryStore {
    async fn find(&self, id: DbId) -> Result<Option<Arrangement>, sqlx::Error> {
        if *self.panic_on.lock().unwrap() == Some(id) {
            panic!("store exploded on {id}");
        }
        Ok(self.get(id))
    }

    async fn transition(
        &self,
        id: DbId,
        to: ArrangementStatus,
        asset_ref: Option<&str>,
    ) -> Result<Option<Arrangement>, sqlx::Error> {
        if *self.failing_status.lock().unwrap() == Some(to) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        assert_eq!(
            asset_ref.is_some(),
            to == ArrangementStatus::Completed,
            "asset_ref must be set exactly for COMPLETED"
        );

        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if !row.status().can_transition_to(to) {
            return Ok(None);
        }
        row.status_id = to.id();
        row.asset_ref = asset_ref.map(str::to_string);
        Ok(Some(row.clone()))
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_puts: Mutex<bool>,
}

impl MemoryBlobs {
    pub fn get_blob(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        if *self.fail_puts.lock().unwrap() {
            return Err(StorageError::S3("bucket unavailable".into()));
        }
        self.blobs.lock().unwrap().insert(name.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get_blob(name))
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.lock().unwrap().remove(name).is_some())
    }
}

// ---------------------------------------------------------------------------
// Prediction service
// ---------------------------------------------------------------------------

/// Every created prediction follows the statuses in `melody` (first
/// creation of a run) or `stem` (second creation), then stays on the last.
pub struct FakeBackend {
    melody: Vec<PredictionStatus>,
    stem: Vec<PredictionStatus>,
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    created: usize,
    scripts: HashMap<String, VecDeque<PredictionStatus>>,
    last: HashMap<String, PredictionStatus>,
    pub gets: HashMap<String, usize>,
}

impl FakeBackend {
    pub fn new(melody: Vec<PredictionStatus>, stem: Vec<PredictionStatus>) -> Arc<Self> {
        Arc::new(Self {
            melody,
            stem,
            state: Mutex::new(BackendState::default()),
        })
    }

    /// Melody succeeds on the second poll, stem on the first.
    pub fn happy() -> Arc<Self> {
        Self::new(
            vec![PredictionStatus::Processing, PredictionStatus::Succeeded],
            vec![PredictionStatus::Succeeded],
        )
    }

    /// Never leaves `starting`.
    pub fn stalled() -> Arc<Self> {
        Self::new(Vec::new(), Vec::new())
    }

    /// Polls made on the prediction with the given id.
    pub fn polls(&self, id: &str) -> usize {
        self.state.lock().unwrap().gets.get(id).copied().unwrap_or(0)
    }
}

fn prediction(id: &str, status: PredictionStatus) -> Prediction {
    let output = if id.starts_with("melody") {
        serde_json::json!({"variation_01": format!("https://cdn.test/{id}.wav")})
    } else {
        serde_json::json!({"other": format!("https://cdn.test/{id}.wav")})
    };
    Prediction {
        id: id.to_string(),
        status,
        output: (status == PredictionStatus::Succeeded).then_some(output),
        error: None,
    }
}

#[async_trait]
impl PredictionBackend for FakeBackend {
    async fn create(
        &self,
        _version: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, PredictionApiError> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let (id, script) = if input.get("prompt").is_some() {
            (format!("melody-{}", state.created), self.melody.clone())
        } else {
            (format!("stem-{}", state.created), self.stem.clone())
        };
        state.scripts.insert(id.clone(), script.into());
        Ok(prediction(&id, PredictionStatus::Starting))
    }

    async fn get(&self, id: &str) -> Result<Prediction, PredictionApiError> {
        let mut state = self.state.lock().unwrap();
        *state.gets.entry(id.to_string()).or_default() += 1;
        let next = state.scripts.get_mut(id).and_then(VecDeque::pop_front);
        let status = match next {
            Some(status) => {
                state.last.insert(id.to_string(), status);
                status
            }
            None => state
                .last
                .get(id)
                .copied()
                .unwrap_or(PredictionStatus::Starting),
        };
        Ok(prediction(id, status))
    }

    async fn cancel(&self, _id: &str) -> Result<(), PredictionApiError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Returns `body` (or fails every time when `body` is `None`), optionally
/// waiting on `gate` first. Records attempt instants and peak concurrency.
pub struct FakeFetcher {
    body: Option<Vec<u8>>,
    pub gate: Option<Arc<Semaphore>>,
    attempts: Mutex<Vec<Instant>>,
    active: Mutex<(usize, usize)>,
}

impl FakeFetcher {
    pub fn serving(body: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body),
            gate: None,
            attempts: Mutex::new(Vec::new()),
            active: Mutex::new((0, 0)),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            gate: None,
            attempts: Mutex::new(Vec::new()),
            active: Mutex::new((0, 0)),
        })
    }

    pub fn gated(body: Vec<u8>, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body),
            gate: Some(gate),
            attempts: Mutex::new(Vec::new()),
            active: Mutex::new((0, 0)),
        })
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.active.lock().unwrap().1
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, PredictionApiError> {
        self.attempts.lock().unwrap().push(Instant::now());
        {
            let mut active = self.active.lock().unwrap();
            active.0 += 1;
            active.1 = active.1.max(active.0);
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.active.lock().unwrap().0 -= 1;

        self.body.clone().ok_or(PredictionApiError::ApiError {
            status: 502,
            body: "bad gateway".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobs>,
    pub backend: Arc<FakeBackend>,
    pub fetcher: Arc<FakeFetcher>,
    pub bus: Arc<EventBus>,
    pub hub: Arc<NotificationHub>,
    pub events: broadcast::Receiver<JobEvent>,
    pub abort: CancellationToken,
}

impl Harness {
    pub fn new(store: Arc<MemoryStore>, backend: Arc<FakeBackend>, fetcher: Arc<FakeFetcher>) -> Self {
        let bus = Arc::new(EventBus::default());
        let hub = Arc::new(NotificationHub::new());
        let events = bus.subscribe();
        tokio::spawn(NotificationRouter::new(Arc::clone(&hub)).run(bus.subscribe()));
        Self {
            store,
            blobs: Arc::new(MemoryBlobs::default()),
            backend,
            fetcher,
            bus,
            hub,
            events,
            abort: CancellationToken::new(),
        }
    }

    pub fn worker(&self) -> Worker {
        let generation = GenerationClient::new(
            Arc::clone(&self.backend) as Arc<dyn PredictionBackend>,
            Arc::clone(&self.fetcher) as Arc<dyn AssetFetcher>,
            GenerationConfig::default(),
        )
        .with_cancellation(self.abort.clone());
        Worker::new(
            Arc::clone(&self.store) as Arc<dyn ArrangementStore>,
            generation,
            Arc::clone(&self.blobs) as Arc<dyn BlobStore>,
            Arc::clone(&self.bus),
        )
    }

    /// Drain every job event published so far.
    pub fn drain_events(&mut self) -> Vec<JobEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn job(id: DbId, source: Vec<u8>) -> JobRequest {
    JobRequest {
        arrangement_id: id,
        source_audio: source,
        bpm: 120.0,
        tags: "rock".into(),
    }
}

/// Let background tasks (the router) catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
