//! Dataverse Web API client.
//!
//! # Architecture
//!
//! - `credentials` - Token sources and credential resolution
//! - `auth` - Per-scope token cache
//! - `retry` - Retry logic with exponential backoff
//! - `http` - Transport with timeout and retry
//! - `client` - `DataverseClient`, headers and request plumbing
//! - `records` - Record CRUD and batched creation
//! - `batch` - `$batch` multipart encoding
//! - `sql` - SQL through the Custom API
//! - `metadata` - Table metadata
//! - `upload` - File column transfer
//! - `frame` - CSV/tabular adapter
//! - `types` - SDK-specific types

pub mod auth;
pub mod batch;
pub mod client;
pub mod credentials;
pub mod frame;
pub mod http;
pub mod metadata;
pub mod records;
pub mod retry;
pub mod sql;
pub mod types;
pub mod upload;

pub use auth::AuthManager;
pub use client::DataverseClient;
pub use credentials::{
    resolve_credential, AccessToken, ClientSecretCredential, CredentialOptions,
    StaticTokenCredential, TokenCredential,
};
pub use frame::RecordFrame;
pub use metadata::ColumnType;
pub use types::*;
pub use upload::{UploadMode, UploadReport};
