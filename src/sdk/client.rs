//! Dataverse Web API client.
//!
//! [`DataverseClient`] owns the transport, the token cache and the client
//! configuration. Record, SQL, metadata, file and frame operations are
//! implemented on it in their own modules.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::DataverseConfig;
use crate::error::{Error, Result};
use crate::sdk::auth::AuthManager;
use crate::sdk::credentials::{resolve_credential, CredentialOptions, TokenCredential};
use crate::sdk::http::HttpClient;
use crate::API_PATH;

/// Request body variants sent by the client.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Empty,
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Payload::Empty => req,
            Payload::Json(v) => req.json(v),
            Payload::Text(s) => req.body(s.clone()),
            Payload::Bytes(b) => req.body(b.clone()),
        }
    }
}

/// Client for one Dataverse organisation.
#[derive(Debug, Clone)]
pub struct DataverseClient {
    http: HttpClient,
    auth: AuthManager,
    base_url: String,
    api: String,
    config: DataverseConfig,
}

impl DataverseClient {
    /// Create a client for `base_url` using `credential` for bearer tokens.
    pub fn new(
        base_url: &str,
        credential: Arc<dyn TokenCredential>,
        config: DataverseConfig,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("base_url is required.".to_string()));
        }

        let api = format!("{}/{}", base_url, API_PATH);
        Ok(Self {
            http: HttpClient::new(&config)?,
            auth: AuthManager::new(credential),
            base_url,
            api,
            config,
        })
    }

    /// Resolve a credential from `options` and create a client.
    pub async fn connect(
        base_url: &str,
        options: CredentialOptions,
        config: DataverseConfig,
    ) -> Result<Self> {
        let credential = resolve_credential(options).await?;
        Self::new(base_url, credential, config)
    }

    /// Organisation URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Web API root, `{base_url}/api/data/v9.2`.
    pub fn api_url(&self) -> &str {
        &self.api
    }

    pub fn config(&self) -> &DataverseConfig {
        &self.config
    }

    /// OAuth scope for this organisation.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.base_url)
    }

    /// Absolute URL for a path under the API root.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api, path.trim_start_matches('/'))
    }

    /// Standard OData headers with bearer auth, plus `extra` overrides.
    pub(crate) async fn headers(&self, extra: &[(&str, String)]) -> Result<HeaderMap> {
        let token = self.auth.acquire_token(&self.scope()).await?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.token))
            .map_err(|_| Error::Auth("access token is not a valid header value".to_string()))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert("odata-maxversion", HeaderValue::from_static("4.0"));
        headers.insert("odata-version", HeaderValue::from_static("4.0"));

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidArgument(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                Error::InvalidArgument(format!("invalid value for header '{}'", name))
            })?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Send an authenticated request to an absolute URL.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(&str, String)],
        query: &[(&str, String)],
        payload: Payload,
    ) -> Result<Response> {
        let headers = self.headers(extra_headers).await?;
        debug!("{} {}", method, url);

        self.http
            .send(|client| {
                let req = client.request(method.clone(), url).headers(headers.clone());
                let req = if query.is_empty() { req } else { req.query(query) };
                payload.apply(req)
            })
            .await
    }

    /// Send a request and decode the JSON response.
    pub(crate) async fn execute_json<R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(&str, String)],
        query: &[(&str, String)],
        payload: Payload,
    ) -> Result<R> {
        let response = self
            .execute(method, url, extra_headers, query, payload)
            .await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::UnexpectedResponse(format!("Failed to parse response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::credentials::StaticTokenCredential;

    fn client(url: &str) -> Result<DataverseClient> {
        DataverseClient::new(
            url,
            Arc::new(StaticTokenCredential::new("token")),
            DataverseConfig::default(),
        )
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let c = client("https://org.crm.dynamics.com/").unwrap();
        assert_eq!(c.base_url(), "https://org.crm.dynamics.com");
        assert_eq!(c.api_url(), "https://org.crm.dynamics.com/api/data/v9.2");
        assert_eq!(c.scope(), "https://org.crm.dynamics.com/.default");
        assert_eq!(
            c.url("accounts"),
            "https://org.crm.dynamics.com/api/data/v9.2/accounts"
        );
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let err = client("  / ").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg == "base_url is required."));
    }

    #[tokio::test]
    async fn test_headers() {
        let c = client("https://org.crm.dynamics.com").unwrap();
        let headers = c
            .headers(&[("Prefer", "return=representation".to_string())])
            .await
            .unwrap();

        assert_eq!(headers["authorization"], "Bearer token");
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["odata-maxversion"], "4.0");
        assert_eq!(headers["odata-version"], "4.0");
        assert_eq!(headers["prefer"], "return=representation");
    }

    #[tokio::test]
    async fn test_extra_header_overrides_content_type() {
        let c = client("https://org.crm.dynamics.com").unwrap();
        let headers = c
            .headers(&[("Content-Type", "application/octet-stream".to_string())])
            .await
            .unwrap();

        assert_eq!(headers.get_all("content-type").iter().count(), 1);
        assert_eq!(headers["content-type"], "application/octet-stream");
    }
}
