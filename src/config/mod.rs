//! Configuration management for the Dataverse client and CLI.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sdk::credentials::CredentialOptions;
use crate::sdk::upload::UploadMode;

/// Command-line arguments for the `dataverse` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "dataverse")]
#[command(author = "Dataverse Client Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Command-line client for the Microsoft Dataverse Web API")]
pub struct Args {
    /// Organisation URL, e.g. https://yourorg.crm.dynamics.com
    #[arg(short, long, env = "DATAVERSE_URL", global = true)]
    pub org_url: Option<String>,

    /// Entra ID tenant for client secret authentication
    #[arg(long, env = "AZURE_TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, env = "AZURE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Client secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-acquired bearer token (skips the token endpoint)
    #[arg(long, env = "DATAVERSE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "DATAVERSE_DEBUG", global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, default_value = "text", env = "DATAVERSE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Number of retries for transient HTTP failures
    #[arg(long, env = "DATAVERSE_HTTP_RETRIES", global = true)]
    pub retries: Option<u32>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "DATAVERSE_HTTP_TIMEOUT_SECS", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands exposed by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the end-to-end quickstart against a live organisation
    Quickstart,
    /// List non-private tables
    Tables,
    /// Show metadata for a table by schema name
    TableInfo { name: String },
    /// Create a custom table; columns are given as name:type
    CreateTable {
        name: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Delete a custom table
    DeleteTable { name: String },
    /// Retrieve a record
    Get {
        entity_set: String,
        id: String,
        /// Comma separated column list
        #[arg(long)]
        select: Option<String>,
    },
    /// Create a record (JSON object) or records (JSON array)
    Create { entity_set: String, json: String },
    /// Update a record with a JSON object
    Update {
        entity_set: String,
        id: String,
        json: String,
    },
    /// Delete a record
    Delete { entity_set: String, id: String },
    /// Run a SQL query through the Custom API
    Sql {
        query: String,
        /// Print rows as CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
    /// Bulk-create records from a CSV file
    Import { entity_set: String, file: PathBuf },
    /// Upload a file into a file column
    Upload {
        entity_set: String,
        id: String,
        column: String,
        file: PathBuf,
        #[arg(long, default_value = "auto")]
        mode: UploadMode,
    },
    /// Download the contents of a file column
    Download {
        entity_set: String,
        id: String,
        column: String,
        output: PathBuf,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Default SQL Custom API name.
pub const DEFAULT_SQL_API_NAME: &str = "McpExecuteSqlQuery";

/// Requests above this size use chunked upload in `UploadMode::Auto`.
pub const DEFAULT_CHUNKED_UPLOAD_THRESHOLD: u64 = 128 * 1024 * 1024;

/// Wait schedule while a new table is provisioned.
pub const DEFAULT_ENTITY_READY_DELAYS_SECS: [u64; 6] = [0, 2, 5, 10, 20, 30];

/// Tuning for the Web API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataverseConfig {
    /// LCID used for metadata labels
    pub language_code: u32,
    /// Custom API that executes SQL
    pub sql_api_name: String,
    /// Retries for transient HTTP failures
    pub http_retries: u32,
    /// Initial backoff between retries
    pub http_backoff_ms: u64,
    /// Request timeout
    pub http_timeout_secs: u64,
    /// Records per `$batch` request
    pub batch_size: usize,
    /// Wait schedule while a new table is provisioned; empty means the default
    pub entity_ready_delays_secs: Vec<u64>,
    /// Size above which uploads are chunked
    pub chunked_upload_threshold: u64,
}

impl Default for DataverseConfig {
    fn default() -> Self {
        Self {
            language_code: 1033,
            sql_api_name: DEFAULT_SQL_API_NAME.to_string(),
            http_retries: 3,
            http_backoff_ms: 500,
            http_timeout_secs: 120,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            entity_ready_delays_secs: DEFAULT_ENTITY_READY_DELAYS_SECS.to_vec(),
            chunked_upload_threshold: DEFAULT_CHUNKED_UPLOAD_THRESHOLD,
        }
    }
}

impl DataverseConfig {
    /// Build a configuration from `DATAVERSE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            language_code: parsed(lookup("DATAVERSE_LANGUAGE_CODE"))
                .unwrap_or(defaults.language_code),
            sql_api_name: lookup("DATAVERSE_SQL_API_NAME")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.sql_api_name),
            http_retries: parsed(lookup("DATAVERSE_HTTP_RETRIES")).unwrap_or(defaults.http_retries),
            http_backoff_ms: parsed(lookup("DATAVERSE_HTTP_BACKOFF_MS"))
                .unwrap_or(defaults.http_backoff_ms),
            http_timeout_secs: parsed(lookup("DATAVERSE_HTTP_TIMEOUT_SECS"))
                .unwrap_or(defaults.http_timeout_secs),
            batch_size: parsed(lookup("DATAVERSE_BATCH_SIZE"))
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            ..defaults
        }
    }
}

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Organisation URL
    pub org_url: Option<String>,
    /// Credential overrides
    pub credentials: CredentialOptions,
    /// Client tuning
    pub client: DataverseConfig,
    /// Debug mode
    pub debug: bool,
    /// Log output format
    pub log_format: LogFormat,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut client = DataverseConfig::from_env();
        if let Some(retries) = args.retries {
            client.http_retries = retries;
        }
        if let Some(timeout) = args.timeout {
            client.http_timeout_secs = timeout;
        }

        Self {
            org_url: args.org_url,
            credentials: CredentialOptions {
                access_token: args.access_token,
                tenant_id: args.tenant_id,
                client_id: args.client_id,
                client_secret: args.client_secret,
                authority_host: None,
            },
            client,
            debug: args.debug,
            log_format: args.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_config_default_values() {
        let config = DataverseConfig::default();

        assert_eq!(config.language_code, 1033);
        assert_eq!(config.sql_api_name, "McpExecuteSqlQuery");
        assert_eq!(config.http_retries, 3);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.entity_ready_delays_secs, vec![0, 2, 5, 10, 20, 30]);
        assert_eq!(config.chunked_upload_threshold, 128 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATAVERSE_LANGUAGE_CODE", "1031"),
            ("DATAVERSE_SQL_API_NAME", " custom_ExecuteSql "),
            ("DATAVERSE_HTTP_RETRIES", "7"),
            ("DATAVERSE_BATCH_SIZE", "0"),
            ("DATAVERSE_HTTP_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = DataverseConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.language_code, 1031);
        assert_eq!(config.sql_api_name, "custom_ExecuteSql");
        assert_eq!(config.http_retries, 7);
        // zero batch size is rejected
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.http_timeout_secs, 120);
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let config: DataverseConfig =
            serde_json::from_str(r#"{"language_code": 1036, "batch_size": 10}"#).unwrap();

        assert_eq!(config.language_code, 1036);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.sql_api_name, DEFAULT_SQL_API_NAME);
    }

    #[test]
    fn test_args_parse_subcommand() {
        let args = Args::try_parse_from([
            "dataverse",
            "--org-url",
            "https://org.crm.dynamics.com",
            "get",
            "accounts",
            "00000000-0000-0000-0000-000000000001",
            "--select",
            "name",
        ])
        .unwrap();

        assert_eq!(args.org_url.as_deref(), Some("https://org.crm.dynamics.com"));
        match args.command {
            Command::Get {
                entity_set, select, ..
            } => {
                assert_eq!(entity_set, "accounts");
                assert_eq!(select.as_deref(), Some("name"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::try_parse_from([
            "dataverse",
            "--access-token",
            "tok",
            "--retries",
            "9",
            "--log-format",
            "json",
            "tables",
        ])
        .unwrap();

        let config: Config = args.into();

        assert_eq!(config.credentials.access_token.as_deref(), Some("tok"));
        assert_eq!(config.client.http_retries, 9);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
