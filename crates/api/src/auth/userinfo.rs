//! OAuth user-info identity resolution.
//!
//! The credential is posted as a form (`access_token`, `client_id`) to the
//! provider's user-info endpoint; the owner id is read from
//! `user.user_id`, which providers send as either a number or a string.

use std::time::Duration;

use async_trait::async_trait;
use harmonia_core::types::OwnerId;
use serde_json::Value;

use super::{IdentityError, IdentityResolver};

/// Upper bound on one user-info round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct UserInfoResolver {
    client: reqwest::Client,
    url: String,
    client_id: String,
}

impl UserInfoResolver {
    pub fn new(url: String, client_id: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, url, client_id))
    }

    pub fn with_client(client: reqwest::Client, url: String, client_id: String) -> Self {
        Self {
            client,
            url,
            client_id,
        }
    }
}

#[async_trait]
impl IdentityResolver for UserInfoResolver {
    async fn resolve(&self, credential: &str) -> Result<OwnerId, IdentityError> {
        let response = self
            .client
            .post(&self.url)
            .form(&[
                ("access_token", credential),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IdentityError::Provider(format!("HTTP {status}")));
        }
        if !status.is_success() {
            tracing::debug!(status = %status, "User-info request refused");
            return Err(IdentityError::Rejected);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;
        parse_user_id(&body).ok_or(IdentityError::Rejected)
    }
}

/// Extract `user.user_id` from a user-info response body.
fn parse_user_id(body: &Value) -> Option<OwnerId> {
    match body.get("user")?.get("user_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
