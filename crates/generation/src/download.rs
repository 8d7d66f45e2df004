//! Asset download with fixed-spacing retries.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::PredictionApiError;
use crate::error::GenerationError;

/// Fetches the bytes behind an output locator.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PredictionApiError>;
}

/// [`AssetFetcher`] over plain HTTP GET.
pub struct HttpFetcher {
    client: reqwest::Client,
}

/// Per-request timeout for asset downloads.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PredictionApiError> {
        let response = self.client.get(url).send().await?;
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
        Ok(response.bytes().await?.to_vec())
    }
}

/// How many times to try a download and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Fetch `url`, retrying every failure up to `policy.max_attempts` in total.
pub async fn download_with_retry<F: AssetFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, GenerationError> {
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.max_attempts {
        match fetcher.fetch(url).await {
            Ok(bytes) => {
                tracing::debug!(url, attempt, bytes = bytes.len(), "Downloaded asset");
                return Ok(bytes);
            }
            Err(e) => {
                tracing::warn!(url, attempt, error = %e, "Download attempt {attempt} failed");
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }
    }

    Err(GenerationError::Download {
        attempts: policy.max_attempts,
        last_error,
    })
}
