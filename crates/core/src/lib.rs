//! Shared domain primitives for the Harmonia arrangement service.
//!
//! Zero internal dependencies: every other workspace crate builds on the
//! id/timestamp aliases, [`error::CoreError`], submission limits, musical
//! timing helpers, and realtime message shapes defined here.

pub mod arrangement;
pub mod error;
pub mod music;
pub mod realtime;
pub mod types;
