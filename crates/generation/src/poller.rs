//! Poll-until-terminal state machine for one remote prediction.
//!
//! After creation the prediction is polled on a fixed interval. The whole
//! wait is bounded by [`PollConfig::ceiling`] through `tokio::time::timeout`
//! rather than wall-clock bookkeeping, and every suspension point is a tick
//! of the interval. The first observed move into `processing` is reported
//! once on the signal channel; a remote `failed`/`canceled` is reported as
//! [`GenerationSignal::RemoteFailed`] before the stage returns its error.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::PredictionBackend;
use crate::error::GenerationError;
use crate::prediction::{Prediction, PredictionStatus};

/// The two remote stages of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Melody synthesis from the tags prompt.
    Melody,
    /// Isolation of the non-drum stem from the synthesized melody.
    Stem,
}

impl Stage {
    /// Only the melody stage drives the job's `PROCESSING` transition.
    fn reports_processing(self) -> bool {
        matches!(self, Self::Melody)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Melody => f.write_str("melody"),
            Self::Stem => f.write_str("stem"),
        }
    }
}

/// Progress reported to the worker while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSignal {
    /// The melody prediction started processing.
    Processing,
    /// The service reported a prediction as failed or canceled.
    RemoteFailed,
}

pub type SignalSender = mpsc::UnboundedSender<GenerationSignal>;

/// Timing of one stage's poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait between creation and the first poll.
    pub initial_delay: Duration,
    /// Wait between consecutive polls.
    pub interval: Duration,
    /// Budget for reaching a terminal state, counted from creation.
    pub ceiling: Duration,
}

impl PollConfig {
    /// Melody stage: first poll after 2s, then every 10s.
    pub fn melody() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(10),
            ceiling: Duration::from_secs(300),
        }
    }

    /// Stem stage: poll every 5s.
    pub fn stem() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(5),
            ceiling: Duration::from_secs(300),
        }
    }
}

/// Tracks what has already been reported for one prediction.
struct Progress<'a> {
    stage: Stage,
    signals: Option<&'a SignalSender>,
    processing_reported: bool,
}

impl<'a> Progress<'a> {
    fn new(stage: Stage, signals: Option<&'a SignalSender>) -> Self {
        Self {
            stage,
            signals,
            processing_reported: false,
        }
    }

    fn observe(&mut self, prediction: &Prediction) {
        if prediction.status == PredictionStatus::Processing
            && self.stage.reports_processing()
            && !self.processing_reported
        {
            self.processing_reported = true;
            tracing::info!(prediction_id = %prediction.id, stage = %self.stage, "Prediction processing");
            self.emit(GenerationSignal::Processing);
        }
    }

    fn emit(&self, signal: GenerationSignal) {
        if let Some(tx) = self.signals {
            let _ = tx.send(signal);
        }
    }
}

/// Poll `created` until it is terminal, then settle the outcome.
///
/// Returns the succeeded prediction; every other end state is an error.
pub async fn poll_until_terminal<B: PredictionBackend + ?Sized>(
    backend: &B,
    stage: Stage,
    created: Prediction,
    config: &PollConfig,
    signals: Option<&SignalSender>,
    cancel: &CancellationToken,
) -> Result<Prediction, GenerationError> {
    let mut progress = Progress::new(stage, signals);
    progress.observe(&created);

    let id = created.id.clone();
    let terminal = if created.status.is_terminal() {
        Ok(created)
    } else {
        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            polled = tokio::time::timeout(
                config.ceiling,
                poll_loop(backend, &id, config, &mut progress),
            ) => match polled {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout { stage, after: config.ceiling }),
            },
        }
    };

    match terminal {
        Ok(prediction) => settle(prediction, &progress),
        Err(e) => {
            if matches!(e, GenerationError::Timeout { .. } | GenerationError::Cancelled) {
                tracing::warn!(prediction_id = %id, %stage, error = %e, "Abandoning prediction");
                if let Err(cancel_err) = backend.cancel(&id).await {
                    tracing::warn!(prediction_id = %id, error = %cancel_err, "Failed to cancel prediction");
                }
            }
            Err(e)
        }
    }
}

async fn poll_loop<B: PredictionBackend + ?Sized>(
    backend: &B,
    id: &str,
    config: &PollConfig,
    progress: &mut Progress<'_>,
) -> Result<Prediction, GenerationError> {
    let stage = progress.stage;
    let mut ticker = tokio::time::interval_at(Instant::now() + config.initial_delay, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match backend.get(id).await {
            Ok(prediction) => {
                tracing::debug!(prediction_id = id, %stage, status = ?prediction.status, "Polled prediction");
                progress.observe(&prediction);
                if prediction.status.is_terminal() {
                    return Ok(prediction);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(prediction_id = id, %stage, error = %e, "Transient poll failure");
            }
            Err(e) => return Err(GenerationError::api(stage, e)),
        }
    }
}

fn settle(prediction: Prediction, progress: &Progress<'_>) -> Result<Prediction, GenerationError> {
    let stage = progress.stage;
    match prediction.status {
        PredictionStatus::Succeeded => Ok(prediction),
        PredictionStatus::Failed | PredictionStatus::Canceled => {
            progress.emit(GenerationSignal::RemoteFailed);
            Err(GenerationError::remote(
                stage,
                format!(
                    "prediction {} ended {:?}: {}",
                    prediction.id,
                    prediction.status,
                    prediction.error_message()
                ),
            ))
        }
        other => Err(GenerationError::remote(
            stage,
            format!("prediction {} ended in unexpected state {other:?}", prediction.id),
        )),
    }
}
