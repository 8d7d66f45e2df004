use harmonia_audio::MixError;
use harmonia_generation::GenerationError;
use harmonia_storage::StorageError;

/// Failures inside one worker run. Each one ends the job as FAILED.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Mix(#[from] MixError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Mix task aborted: {0}")]
    MixTask(#[from] tokio::task::JoinError),

    #[error("Job panicked")]
    Panicked,
}
