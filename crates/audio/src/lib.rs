//! Deterministic arrangement mixing.
//!
//! [`mix`] combines a percussion recording with a generated melody into a
//! fixed-length WAV. Everything here is pure and synchronous; callers on an
//! async runtime run it on a blocking thread.

pub mod conform;
pub mod error;
pub mod mixer;
pub mod normalize;
pub mod wav;

pub use error::MixError;
pub use mixer::{mix, validate_source};
pub use wav::{AudioBuffer, AudioFormat};
