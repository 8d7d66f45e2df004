//! Two-stage generation client.
//!
//! Stage 1 synthesizes a melody from the tags prompt at the requested
//! tempo; stage 2 isolates the non-drum stem of that melody; the isolated
//! track is then downloaded. Each stage follows the poll protocol in
//! [`crate::poller`].

use std::sync::Arc;

use harmonia_core::music::max_generation_secs;
use tokio_util::sync::CancellationToken;

use crate::api::PredictionBackend;
use crate::download::{download_with_retry, AssetFetcher, RetryPolicy};
use crate::error::GenerationError;
use crate::poller::{poll_until_terminal, PollConfig, SignalSender, Stage};

/// Default melody model version.
pub const DEFAULT_MELODY_VERSION: &str =
    "f8140d0457c2b39ad8728a80736fea9a67a0ec0cd37b35f40b68cce507db2366";

/// Default stem-isolation model version.
pub const DEFAULT_STEM_VERSION: &str =
    "5a7041cc9b82e5a558fea6b3d7b12dea89625e89da33f0447bd727c2d0ab9e77";

/// Output key carrying the melody locator.
const MELODY_OUTPUT_KEY: &str = "variation_01";

/// Output key carrying the isolated stem locator.
const STEM_OUTPUT_KEY: &str = "other";

/// Model versions and timing for a [`GenerationClient`].
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub melody_version: String,
    pub stem_version: String,
    pub melody_poll: PollConfig,
    pub stem_poll: PollConfig,
    pub download_retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            melody_version: DEFAULT_MELODY_VERSION.to_string(),
            stem_version: DEFAULT_STEM_VERSION.to_string(),
            melody_poll: PollConfig::melody(),
            stem_poll: PollConfig::stem(),
            download_retry: RetryPolicy::default(),
        }
    }
}

/// Drives both remote stages and the download for one arrangement.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn PredictionBackend>,
    fetcher: Arc<dyn AssetFetcher>,
    config: GenerationConfig,
    cancel: CancellationToken,
}

impl GenerationClient {
    pub fn new(
        backend: Arc<dyn PredictionBackend>,
        fetcher: Arc<dyn AssetFetcher>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            backend,
            fetcher,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight polls and retry waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run stage 1, stage 2 and the download; return the isolated track bytes.
    ///
    /// `signals` receives [`GenerationSignal`](crate::poller::GenerationSignal)s
    /// as the remote jobs progress.
    pub async fn generate(
        &self,
        bpm: f64,
        tags: &str,
        signals: Option<&SignalSender>,
    ) -> Result<Vec<u8>, GenerationError> {
        let melody_url = self.generate_melody(bpm, tags, signals).await?;
        let stem_url = self.isolate_stem(&melody_url, signals).await?;
        self.download(&stem_url).await
    }

    /// Stage 1: return the locator of the synthesized melody.
    pub async fn generate_melody(
        &self,
        bpm: f64,
        tags: &str,
        signals: Option<&SignalSender>,
    ) -> Result<String, GenerationError> {
        let input = melody_input(bpm, tags);
        self.run_stage(
            Stage::Melody,
            &self.config.melody_version,
            &input,
            &self.config.melody_poll,
            MELODY_OUTPUT_KEY,
            signals,
        )
        .await
    }

    /// Stage 2: return the locator of the isolated stem of `melody_url`.
    pub async fn isolate_stem(
        &self,
        melody_url: &str,
        signals: Option<&SignalSender>,
    ) -> Result<String, GenerationError> {
        let input = stem_input(melody_url);
        self.run_stage(
            Stage::Stem,
            &self.config.stem_version,
            &input,
            &self.config.stem_poll,
            STEM_OUTPUT_KEY,
            signals,
        )
        .await
    }

    /// Fetch the bytes behind `url` with the configured retry policy.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        download_with_retry(
            self.fetcher.as_ref(),
            url,
            &self.config.download_retry,
            &self.cancel,
        )
        .await
    }

    async fn run_stage(
        &self,
        stage: Stage,
        version: &str,
        input: &serde_json::Value,
        poll: &PollConfig,
        output_key: &str,
        signals: Option<&SignalSender>,
    ) -> Result<String, GenerationError> {
        let created = self
            .backend
            .create(version, input)
            .await
            .map_err(|e| GenerationError::api(stage, e))?;
        tracing::info!(prediction_id = %created.id, %stage, "Prediction created");

        let done = poll_until_terminal(
            self.backend.as_ref(),
            stage,
            created,
            poll,
            signals,
            &self.cancel,
        )
        .await?;

        let url = done.output_url(output_key).ok_or_else(|| {
            GenerationError::remote(
                stage,
                format!("prediction {} succeeded without output `{output_key}`", done.id),
            )
        })?;
        tracing::info!(prediction_id = %done.id, %stage, "Prediction succeeded");
        Ok(url.to_string())
    }
}

/// Input for the melody model.
pub fn melody_input(bpm: f64, tags: &str) -> serde_json::Value {
    serde_json::json!({
        "bpm": bpm,
        "seed": -1,
        "top_k": 250,
        "top_p": 0,
        "prompt": tags,
        "variations": 1,
        "temperature": 1,
        "max_duration": max_generation_secs(bpm),
        "model_version": "medium",
        "output_format": "wav",
        "classifier_free_guidance": 3,
    })
}

/// Input for the stem-isolation model.
pub fn stem_input(audio_url: &str) -> serde_json::Value {
    serde_json::json!({
        "jobs": 0,
        "stem": "other",
        "audio": audio_url,
        "model": "htdemucs",
        "split": true,
        "shifts": 1,
        "overlap": 0.25,
        "clip_mode": "rescale",
        "mp3_preset": 2,
        "wav_format": "int24",
        "mp3_bitrate": 320,
        "output_format": "wav",
    })
}
