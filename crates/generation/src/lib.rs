//! Remote generation client.
//!
//! Drives the two external prediction jobs an arrangement depends on
//! (melody synthesis, then stem isolation) through a poll-until-terminal
//! protocol, then downloads the isolated track with bounded retries.
//!
//! - [`api`]: REST wrapper over the prediction service and the
//!   [`PredictionBackend`] seam.
//! - [`poller`]: the per-prediction poll state machine.
//! - [`download`]: asset fetch with fixed-spacing retries.
//! - [`client`]: [`GenerationClient`], which chains the stages.

pub mod api;
pub mod client;
pub mod download;
pub mod error;
pub mod poller;
pub mod prediction;

#[cfg(test)]
mod testing;

pub use api::{PredictionApi, PredictionApiError, PredictionBackend};
pub use client::{GenerationClient, GenerationConfig};
pub use download::{AssetFetcher, HttpFetcher, RetryPolicy};
pub use error::GenerationError;
pub use poller::{GenerationSignal, PollConfig, SignalSender, Stage};
pub use prediction::{Prediction, PredictionStatus};
