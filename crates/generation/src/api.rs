//! REST client for the prediction service.
//!
//! Wraps the HTTP API (create prediction, fetch prediction, cancel
//! prediction) using [`reqwest`], and defines the [`PredictionBackend`]
//! seam the poller is written against.

use async_trait::async_trait;

use crate::prediction::Prediction;

/// Operations the poll protocol needs from a prediction service.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    /// Start a prediction of model `version` with the given `input`.
    async fn create(
        &self,
        version: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, PredictionApiError>;

    /// Fetch the current state of a prediction.
    async fn get(&self, id: &str) -> Result<Prediction, PredictionApiError>;

    /// Ask the service to stop a prediction.
    async fn cancel(&self, id: &str) -> Result<(), PredictionApiError>;
}

/// Errors from the prediction REST layer.
#[derive(Debug, thiserror::Error)]
pub enum PredictionApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Prediction API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl PredictionApiError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Transport failures, throttling and 5xx responses are transient;
    /// other API errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// HTTP client for the prediction service.
pub struct PredictionApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl PredictionApi {
    /// * `api_url` - Base URL, e.g. `https://api.replicate.com/v1`.
    /// * `token` - API token sent as a bearer credential.
    pub fn new(api_url: String, token: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, token: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`PredictionApiError::ApiError`] with status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PredictionApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PredictionApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PredictionApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PredictionBackend for PredictionApi {
    /// `POST /predictions`
    async fn create(
        &self,
        version: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, PredictionApiError> {
        let body = serde_json::json!({
            "version": version,
            "input": input,
        });

        let response = self
            .client
            .post(format!("{}/predictions", self.api_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /predictions/{id}`
    async fn get(&self, id: &str) -> Result<Prediction, PredictionApiError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.api_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /predictions/{id}/cancel`
    async fn cancel(&self, id: &str) -> Result<(), PredictionApiError> {
        let response = self
            .client
            .post(format!("{}/predictions/{}/cancel", self.api_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
