use std::time::Duration;

use crate::api::PredictionApiError;
use crate::poller::Stage;

/// Failures of a generation run.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The service reported failure or cancellation, returned a terminal
    /// payload without the expected output, or rejected a request.
    #[error("{stage} stage failed: {message}")]
    RemoteService { stage: Stage, message: String },

    /// The stage did not reach a terminal state within its budget.
    #[error("{stage} stage timed out after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },

    /// Every download attempt failed.
    #[error("Download failed after {attempts} attempts: {last_error}")]
    Download { attempts: u32, last_error: String },

    /// The run was cancelled during shutdown.
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub(crate) fn remote(stage: Stage, message: impl Into<String>) -> Self {
        Self::RemoteService {
            stage,
            message: message.into(),
        }
    }

    pub(crate) fn api(stage: Stage, err: PredictionApiError) -> Self {
        Self::remote(stage, err.to_string())
    }
}
