//! Frames exchanged over the realtime notification channel.

use serde::{Deserialize, Serialize};

/// Reply status for a successful operation.
pub const STATUS_SUCCESS: &str = "success";

/// Reply status for a failed operation.
pub const STATUS_FAIL: &str = "fail";

/// Message pushed to an owner whenever one of their arrangements changes.
pub const MSG_DATA_UPDATED: &str = "Data updated";

/// Acknowledgement sent after a connection is registered.
pub const MSG_CONNECTED: &str = "Successfully connected";

/// Reply sent when the first frame carries no credential.
pub const MSG_MISSING_CREDENTIAL: &str = "Missing access_token";

/// A server-to-client frame: `{"status": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub status: String,
    pub message: String,
}

impl ChannelFrame {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAIL.to_string(),
            message: message.into(),
        }
    }

    /// The generic "data updated" push.
    pub fn data_updated() -> Self {
        Self::success(MSG_DATA_UPDATED)
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "status": self.status, "message": self.message }).to_string()
    }
}

/// The first client-to-server frame, carrying the credential.
#[derive(Debug, Deserialize)]
pub struct AuthFrame {
    pub access_token: Option<String>,
}
