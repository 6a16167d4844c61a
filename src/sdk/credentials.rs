//! Credential resolution for the Dataverse Web API.
//!
//! Credentials are resolved in order:
//! 1. Explicit options
//! 2. Environment variables (DATAVERSE_ACCESS_TOKEN, or AZURE_TENANT_ID,
//!    AZURE_CLIENT_ID and AZURE_CLIENT_SECRET)
//! 3. Profile file (~/.dataverse/credentials.json)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};

/// Default Entra ID authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Request timeout for the token endpoint.
pub const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 30;

/// Tokens this close to expiry are refreshed.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Raw bearer token
    pub token: String,
    /// Absolute expiry time
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True when the token is within the refresh margin of its expiry.
    pub fn expires_soon(&self) -> bool {
        self.expires_on - Utc::now() <= Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Source of bearer tokens for a scope.
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// Acquire a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Credential wrapping a token acquired elsewhere (e.g. `az account get-access-token`).
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        // The real expiry is unknown; treat the token as valid for an hour.
        Ok(AccessToken::new(
            self.token.clone(),
            Utc::now() + Duration::hours(1),
        ))
    }
}

fn token_client(timeout: StdDuration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// OAuth2 client-credentials flow against Entra ID.
#[derive(Debug, Clone)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            http: token_client(StdDuration::from_secs(DEFAULT_TOKEN_TIMEOUT_SECS)),
        }
    }

    /// Override the token request timeout.
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.http = token_client(timeout);
        self
    }

    /// Override the authority host (sovereign clouds, tests).
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        debug!("Requesting client credentials token for scope {}", scope);

        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {}", status.as_u16()),
            };
            return Err(Error::Auth(message));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + Duration::seconds(token.expires_in),
        ))
    }
}

/// Explicit credential inputs, typically from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct CredentialOptions {
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: Option<String>,
}

impl CredentialOptions {
    /// Fill unset fields from the environment.
    fn or_env(mut self) -> Self {
        fn env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }
        if self.access_token.is_none() {
            self.access_token = env("DATAVERSE_ACCESS_TOKEN");
        }
        if self.tenant_id.is_none() {
            self.tenant_id = env("AZURE_TENANT_ID");
        }
        if self.client_id.is_none() {
            self.client_id = env("AZURE_CLIENT_ID");
        }
        if self.client_secret.is_none() {
            self.client_secret = env("AZURE_CLIENT_SECRET");
        }
        if self.authority_host.is_none() {
            self.authority_host = env("AZURE_AUTHORITY_HOST");
        }
        self
    }

    /// Fill unset fields from a profile file.
    fn or_profile(mut self, profile: ProfileFile) -> Self {
        self.access_token = self.access_token.or(profile.access_token);
        self.tenant_id = self.tenant_id.or(profile.tenant_id);
        self.client_id = self.client_id.or(profile.client_id);
        self.client_secret = self.client_secret.or(profile.client_secret);
        self.authority_host = self.authority_host.or(profile.authority_host);
        self
    }

    /// Build a credential if the options are sufficient.
    fn build(&self) -> Option<Arc<dyn TokenCredential>> {
        if let Some(token) = &self.access_token {
            return Some(Arc::new(StaticTokenCredential::new(token.clone())));
        }
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant), Some(client), Some(secret)) => {
                let mut cred = ClientSecretCredential::new(tenant, client, secret);
                if let Some(host) = &self.authority_host {
                    cred = cred.with_authority_host(host.clone());
                }
                Some(Arc::new(cred))
            }
            _ => None,
        }
    }
}

/// Profile file structure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFile {
    access_token: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    authority_host: Option<String>,
}

/// Get the path to the profile file.
fn profile_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".dataverse").join("credentials.json"))
}

/// Read the profile file.
async fn read_profile_file() -> Option<ProfileFile> {
    let path = profile_file_path()?;
    let content = fs::read_to_string(&path).await.ok()?;
    serde_json::from_str(&content).ok()
}

/// Resolve a credential from options, environment, or profile file.
///
/// # Errors
///
/// Returns an error if no source provides a usable credential.
pub async fn resolve_credential(options: CredentialOptions) -> Result<Arc<dyn TokenCredential>> {
    if let Some(cred) = options.build() {
        return Ok(cred);
    }

    let options = options.or_env();
    if let Some(cred) = options.build() {
        return Ok(cred);
    }

    if let Some(profile) = read_profile_file().await {
        if let Some(cred) = options.or_profile(profile).build() {
            return Ok(cred);
        }
    }

    Err(Error::CredentialsNotFound(
        "A credential is required. Provide it via:\n\
         1. --access-token or --tenant-id/--client-id/--client-secret\n\
         2. DATAVERSE_ACCESS_TOKEN, or AZURE_TENANT_ID + AZURE_CLIENT_ID + AZURE_CLIENT_SECRET\n\
         3. ~/.dataverse/credentials.json"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_static_token_from_options() {
        let cred = resolve_credential(CredentialOptions {
            access_token: Some("abc".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

        let token = cred.get_token("https://org.crm.dynamics.com/.default").await.unwrap();
        assert_eq!(token.token, "abc");
        assert!(!token.expires_soon());
    }

    #[test]
    fn test_static_token_wins_over_client_secret() {
        let options = CredentialOptions {
            access_token: Some("abc".to_string()),
            tenant_id: Some("t".to_string()),
            client_id: Some("c".to_string()),
            client_secret: Some("s".to_string()),
            authority_host: None,
        };
        let cred = options.build().unwrap();
        assert!(format!("{:?}", cred).contains("StaticTokenCredential"));
    }

    #[test]
    fn test_partial_client_secret_is_insufficient() {
        let options = CredentialOptions {
            tenant_id: Some("t".to_string()),
            client_id: Some("c".to_string()),
            ..Default::default()
        };
        assert!(options.build().is_none());
    }

    #[test]
    fn test_profile_fills_missing_fields() {
        let options = CredentialOptions {
            tenant_id: Some("from-flag".to_string()),
            ..Default::default()
        };
        let profile: ProfileFile = serde_json::from_str(
            r#"{"tenantId": "from-file", "clientId": "c", "clientSecret": "s"}"#,
        )
        .unwrap();

        let merged = options.or_profile(profile);
        assert_eq!(merged.tenant_id.as_deref(), Some("from-flag"));
        assert_eq!(merged.client_id.as_deref(), Some("c"));
        assert!(merged.build().is_some());
    }

    #[test]
    fn test_token_url() {
        let cred = ClientSecretCredential::new("tenant", "client", "secret")
            .with_authority_host("https://login.example.com/");
        assert_eq!(
            cred.token_url(),
            "https://login.example.com/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_expires_soon() {
        let fresh = AccessToken::new("t", Utc::now() + Duration::hours(1));
        let stale = AccessToken::new("t", Utc::now() + Duration::seconds(30));
        assert!(!fresh.expires_soon());
        assert!(stale.expires_soon());
    }
}
