//! Arrangement job pipeline.
//!
//! - [`ArrangementStore`]: the keyed job-record seam the worker reads and
//!   transitions through.
//! - [`Worker`]: the per-job state machine: generate, mix, store, and
//!   report each status change on the event bus.
//! - [`JobDispatcher`]: the bounded pool that runs workers.

pub mod dispatcher;
pub mod error;
pub mod store;
pub mod worker;

pub use dispatcher::{DispatchError, DispatcherConfig, JobDispatcher};
pub use error::WorkerError;
pub use store::{ArrangementStore, PgArrangementStore};
pub use worker::{JobOutcome, JobRequest, Worker};
