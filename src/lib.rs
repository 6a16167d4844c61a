//! Dataverse Web API client
//!
//! An async client for the Microsoft Dataverse (Power Platform) Web API,
//! with a command-line front end covering the usual example programs.
//!
//! # Architecture
//!
//! 1. **SDK Layer** (`sdk`) - credentials, token cache, transport, and the
//!    `DataverseClient` operations (records, `$batch`, SQL, metadata, files,
//!    CSV frames)
//! 2. **Configuration** (`config`) - CLI arguments and client tuning
//! 3. **Programs** (`quickstart`, `commands`) - the walkthrough and CLI
//!    subcommands built on the SDK
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dataverse_client::config::DataverseConfig;
//! use dataverse_client::sdk::{ClientSecretCredential, DataverseClient};
//!
//! # async fn example() -> dataverse_client::Result<()> {
//! let credential = Arc::new(ClientSecretCredential::new("tenant", "client-id", "secret"));
//! let client = DataverseClient::new(
//!     "https://yourorg.crm.dynamics.com",
//!     credential,
//!     DataverseConfig::from_env(),
//! )?;
//! let account = client.get("accounts", "00000000-0000-0000-0000-000000000001", Some("name")).await?;
//! println!("{}", account["name"]);
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod quickstart;
pub mod sdk;

pub use error::{Error, Result};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Web API path below the organisation URL
pub const API_PATH: &str = "api/data/v9.2";

/// Records per `$batch` request
pub const DEFAULT_BATCH_SIZE: usize = 25;
