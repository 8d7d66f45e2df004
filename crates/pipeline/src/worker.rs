//! Per-job state machine.
//!
//! ```text
//! PENDING ──(melody processing)──> PROCESSING
//!    │                                  │
//!    └──────────────┬───────────────────┘
//!                   ├──(generate, mix, store ok)──> COMPLETED (asset_ref set)
//!                   └──(any failure)──────────────> FAILED
//! ```
//!
//! Every persisted transition is followed by one [`JobEvent`] on the bus;
//! the terminal transition is the last. The worker is the only writer of
//! a job's terminal state, so each job yields exactly one terminal event.

use std::sync::Arc;

use harmonia_core::types::DbId;
use harmonia_db::models::arrangement::Arrangement;
use harmonia_db::models::status::ArrangementStatus;
use harmonia_events::{EventBus, JobEvent};
use harmonia_generation::{GenerationClient, GenerationSignal};
use harmonia_storage::{new_blob_name, BlobStore};
use tokio::sync::mpsc;

use crate::error::WorkerError;
use crate::store::ArrangementStore;

/// Everything needed to process one submitted arrangement.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub arrangement_id: DbId,
    /// The uploaded percussion recording (WAV).
    pub source_audio: Vec<u8>,
    pub bpm: f64,
    pub tags: String,
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { asset_ref: String },
    Failed,
    /// The job record was absent or already terminal; nothing was done.
    Skipped,
    /// Another writer finished the job first; this run's result was dropped.
    Superseded,
}

/// Runs jobs end to end. Cheap to share via `Arc<Worker>`.
pub struct Worker {
    store: Arc<dyn ArrangementStore>,
    generation: GenerationClient,
    blobs: Arc<dyn BlobStore>,
    bus: Arc<EventBus>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn ArrangementStore>,
        generation: GenerationClient,
        blobs: Arc<dyn BlobStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            generation,
            blobs,
            bus,
        }
    }

    /// Process one job to a terminal state. Never returns an error: every
    /// failure becomes a FAILED transition.
    pub async fn run(&self, job: JobRequest) -> JobOutcome {
        let id = job.arrangement_id;

        let record = match self.store.find(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(arrangement_id = id, "Arrangement not found, skipping job");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(arrangement_id = id, error = %e, "Failed to load arrangement");
                return self.fail(id, &WorkerError::Persistence(e)).await;
            }
        };
        if record.status().is_terminal() {
            tracing::warn!(arrangement_id = id, status = %record.status(), "Arrangement already finished, skipping job");
            return JobOutcome::Skipped;
        }

        tracing::info!(arrangement_id = id, owner_id = record.owner_id, bpm = job.bpm, "Arrangement job started");

        match self.produce(&job).await {
            Ok(asset_ref) => self.complete(id, asset_ref).await,
            Err(e) => self.fail(id, &e).await,
        }
    }

    /// Generate, mix and store; return the stored blob name.
    async fn produce(&self, job: &JobRequest) -> Result<String, WorkerError> {
        let generated = self.generate(job).await?;

        let source = job.source_audio.clone();
        let (bpm, tags) = (job.bpm, job.tags.clone());
        let mixed = tokio::task::spawn_blocking(move || {
            harmonia_audio::mix(&source, &generated, bpm, &tags)
        })
        .await??;

        let name = new_blob_name();
        self.blobs.put(&name, mixed).await?;
        Ok(name)
    }

    /// Drive the generation client while persisting its progress signals.
    async fn generate(&self, job: &JobRequest) -> Result<Vec<u8>, WorkerError> {
        let id = job.arrangement_id;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = self.generation.generate(job.bpm, &job.tags, Some(&tx));
        tokio::pin!(generation);

        let result = loop {
            tokio::select! {
                biased;
                Some(signal) = rx.recv() => self.on_signal(id, signal).await,
                result = &mut generation => break result,
            }
        };
        while let Ok(signal) = rx.try_recv() {
            self.on_signal(id, signal).await;
        }

        Ok(result?)
    }

    async fn on_signal(&self, id: DbId, signal: GenerationSignal) {
        match signal {
            GenerationSignal::Processing => {
                match self.store.transition(id, ArrangementStatus::Processing, None).await {
                    Ok(Some(record)) => self.emit(&record),
                    Ok(None) => {
                        tracing::debug!(arrangement_id = id, "Processing transition not applicable");
                    }
                    Err(e) => {
                        tracing::warn!(arrangement_id = id, error = %e, "Failed to record processing status");
                    }
                }
            }
            GenerationSignal::RemoteFailed => {
                tracing::info!(arrangement_id = id, "Remote service reported failure");
            }
        }
    }

    async fn complete(&self, id: DbId, asset_ref: String) -> JobOutcome {
        match self
            .store
            .transition(id, ArrangementStatus::Completed, Some(&asset_ref))
            .await
        {
            Ok(Some(record)) => {
                tracing::info!(arrangement_id = id, asset_ref = %asset_ref, "Arrangement completed");
                self.emit(&record);
                JobOutcome::Completed { asset_ref }
            }
            Ok(None) => {
                tracing::warn!(arrangement_id = id, "Arrangement finished elsewhere, discarding result");
                self.discard_blob(&asset_ref).await;
                JobOutcome::Superseded
            }
            Err(e) => {
                self.discard_blob(&asset_ref).await;
                self.fail(id, &WorkerError::Persistence(e)).await
            }
        }
    }

    /// Record `cause` as the job's terminal FAILED transition and emit its
    /// event. A job that is already terminal is left alone.
    pub async fn fail(&self, id: DbId, cause: &WorkerError) -> JobOutcome {
        tracing::error!(arrangement_id = id, error = %cause, "Arrangement job failed");

        match self.store.transition(id, ArrangementStatus::Failed, None).await {
            Ok(Some(record)) => {
                self.emit(&record);
                JobOutcome::Failed
            }
            Ok(None) => JobOutcome::Superseded,
            Err(e) => {
                tracing::error!(arrangement_id = id, error = %e, "Failed to record failure");
                JobOutcome::Failed
            }
        }
    }

    async fn discard_blob(&self, name: &str) {
        if let Err(e) = self.blobs.delete(name).await {
            tracing::warn!(blob = name, error = %e, "Failed to delete orphaned blob");
        }
    }

    fn emit(&self, record: &Arrangement) {
        self.bus
            .publish(JobEvent::new(record.id, record.owner_id, record.status()));
    }
}
