//! Low-level HTTP transport with timeout and retry.

use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

use crate::config::DataverseConfig;
use crate::error::{Error, Result};
use crate::sdk::retry::{retry_api, BackoffParams};
use crate::VERSION;

/// User agent string for API requests.
fn user_agent() -> String {
    format!("dataverse-client-rs/{} (rust)", VERSION)
}

/// Thin wrapper over `reqwest::Client` that retries transient failures.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    backoff: BackoffParams,
}

impl HttpClient {
    /// Create a transport from client configuration.
    pub fn new(config: &DataverseConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            backoff: BackoffParams::from_config(config),
        })
    }

    /// Underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request, rebuilding it for every attempt.
    ///
    /// Non-2xx responses become [`Error::Api`] carrying the response body.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        retry_api(
            || async {
                let response = build(&self.client).send().await?;
                check_status(response).await
            },
            &self.backoff,
        )
        .await
    }
}

/// Turn an error status into [`Error::Api`].
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_text = status.canonical_reason().unwrap_or("Unknown");
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    debug!("{} returned {}: {}", url, status.as_u16(), body);
    Err(Error::api(status.as_u16(), status_text, body))
}
