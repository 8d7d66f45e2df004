//! Submission limits and validation for arrangement generation requests.

use serde::Deserialize;
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of an arrangement name (matches the `VARCHAR(255)` column).
pub const MAX_NAME_LEN: u64 = 255;

/// Maximum length of the free-text tags prompt.
pub const MAX_TAGS_LEN: u64 = 1000;

/// Slowest tempo accepted for generation.
pub const MIN_BPM: f64 = 20.0;

/// Fastest tempo accepted for generation.
pub const MAX_BPM: f64 = 300.0;

/// Upper bound on an uploaded percussion recording (25 MiB).
pub const MAX_SOURCE_BYTES: usize = 25 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Immutable generation parameters supplied at submission time.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ArrangementParams {
    #[validate(length(min = 1, max = MAX_NAME_LEN, message = "must be non-empty and within the length limit"))]
    pub name: String,

    #[validate(range(min = MIN_BPM, max = MAX_BPM, message = "is outside the accepted tempo range"))]
    pub bpm: f64,

    #[validate(length(min = 1, max = MAX_TAGS_LEN, message = "must be non-empty and within the length limit"))]
    pub tags: String,
}

impl ArrangementParams {
    /// Trim free-text fields and run field validation.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        self.name = self.name.trim().to_string();
        self.tags = self.tags.trim().to_string();
        if !self.bpm.is_finite() {
            return Err(CoreError::Validation("bpm must be a finite number".into()));
        }
        self.validate()?;
        Ok(self)
    }
}

/// Validate a replacement arrangement name.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("name must not be empty".into()));
    }
    if trimmed.chars().count() as u64 > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate the size of an uploaded source recording.
pub fn validate_source_size(len: usize) -> Result<(), CoreError> {
    if len == 0 {
        return Err(CoreError::Validation("file must not be empty".into()));
    }
    if len > MAX_SOURCE_BYTES {
        return Err(CoreError::Validation(format!(
            "file must not exceed {MAX_SOURCE_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Split a free-text search query into non-empty terms.
pub fn search_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
