//! Prediction resource as returned by the remote service.

use serde::{Deserialize, Serialize};

/// Lifecycle of a remote prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Any status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// `succeeded`, `failed` or `canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// A prediction job on the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    /// Model output; shape depends on the model.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Error detail reported by the service for failed predictions.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Prediction {
    /// Extract a string locator from the output object under `key`.
    pub fn output_url(&self, key: &str) -> Option<&str> {
        self.output.as_ref()?.get(key)?.as_str()
    }

    /// Human-readable error detail, if the service provided one.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no error detail".to_string(),
        }
    }
}
