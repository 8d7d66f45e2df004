//! In-memory prediction service and fetcher for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::api::{PredictionApiError, PredictionBackend};
use crate::download::AssetFetcher;
use crate::prediction::{Prediction, PredictionStatus};

/// One scripted answer to `get`.
#[derive(Debug, Clone)]
pub enum Step {
    Status(PredictionStatus),
    /// A 503 from the service.
    Transient,
    /// A 404 from the service.
    Fatal,
}

/// Behaviour of one created prediction.
#[derive(Debug, Clone)]
pub struct Script {
    steps: VecDeque<Step>,
    output: serde_json::Value,
    last: PredictionStatus,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            output: serde_json::Value::Null,
            last: PredictionStatus::Starting,
        }
    }

    /// Never leaves `starting`.
    pub fn stalled() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = output;
        self
    }
}

#[derive(Default)]
struct State {
    pending: VecDeque<Script>,
    active: HashMap<String, Script>,
    created: Vec<(String, serde_json::Value)>,
    get_times: Vec<Instant>,
    cancelled: Vec<String>,
}

/// Hands out scripts in creation order; ids are `p1`, `p2`, ...
pub struct ScriptedBackend {
    state: Mutex<State>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            state: Mutex::new(State {
                pending: scripts.into(),
                ..State::default()
            }),
        }
    }

    pub fn created(&self) -> Vec<(String, serde_json::Value)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn get_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().get_times.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

fn prediction(id: &str, status: PredictionStatus, output: &serde_json::Value) -> Prediction {
    Prediction {
        id: id.to_string(),
        status,
        output: (status == PredictionStatus::Succeeded).then(|| output.clone()),
        error: (status == PredictionStatus::Failed).then(|| serde_json::json!("model crashed")),
    }
}

#[async_trait]
impl PredictionBackend for ScriptedBackend {
    async fn create(
        &self,
        version: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, PredictionApiError> {
        let mut state = self.state.lock().unwrap();
        state.created.push((version.to_string(), input.clone()));
        let id = format!("p{}", state.created.len());
        let script = state.pending.pop_front().unwrap_or_else(Script::stalled);
        state.active.insert(id.clone(), script);
        Ok(prediction(&id, PredictionStatus::Starting, &serde_json::Value::Null))
    }

    async fn get(&self, id: &str) -> Result<Prediction, PredictionApiError> {
        let mut state = self.state.lock().unwrap();
        state.get_times.push(Instant::now());
        let script = state.active.get_mut(id).ok_or(PredictionApiError::ApiError {
            status: 404,
            body: "unknown prediction".into(),
        })?;

        match script.steps.pop_front() {
            Some(Step::Status(status)) => {
                script.last = status;
                Ok(prediction(id, status, &script.output))
            }
            Some(Step::Transient) => Err(PredictionApiError::ApiError {
                status: 503,
                body: "unavailable".into(),
            }),
            Some(Step::Fatal) => Err(PredictionApiError::ApiError {
                status: 404,
                body: "gone".into(),
            }),
            None => Ok(prediction(id, script.last, &script.output)),
        }
    }

    async fn cancel(&self, id: &str) -> Result<(), PredictionApiError> {
        self.state.lock().unwrap().cancelled.push(id.to_string());
        Ok(())
    }
}

/// Fetcher that fails a fixed number of times before returning `body`.
pub struct FlakyFetcher {
    failures: Mutex<u32>,
    body: Vec<u8>,
    attempts: Mutex<Vec<(String, Instant)>>,
}

impl FlakyFetcher {
    pub fn new(failures: u32, body: Vec<u8>) -> Self {
        Self {
            failures: Mutex::new(failures),
            body,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX, Vec::new())
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetFetcher for FlakyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PredictionApiError> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(PredictionApiError::ApiError {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self.body.clone())
    }
}
