//! File column upload and download.
//!
//! Small files go up in a single `PATCH`. Larger files use the chunked
//! protocol: an initial `PATCH` with `x-ms-transfer-mode: chunked` opens an
//! upload session whose URL comes back in `Location`, then each block is
//! sent to that URL with a `Content-Range` header.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sdk::client::{DataverseClient, Payload};
use crate::sdk::records::format_key;

/// Block size used when the service does not announce one.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// How a file is transferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Single request up to the configured threshold, chunked above it
    #[default]
    Auto,
    /// Single request
    Small,
    /// Chunked upload session
    Chunked,
}

/// Outcome of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub file_name: String,
    pub size: u64,
    pub mode: UploadMode,
    /// Number of requests carrying file content
    pub chunks: usize,
}

/// `Content-Range` value for a block starting at `start`.
pub fn content_range(start: usize, len: usize, total: usize) -> String {
    format!("bytes {}-{}/{}", start, start + len - 1, total)
}

impl DataverseClient {
    fn file_column_url(&self, entity_set: &str, key: &str, column: &str) -> String {
        self.url(&format!("{}{}/{}", entity_set, format_key(key), column))
    }

    /// Upload `data` into a file column of a record.
    pub async fn upload_file(
        &self,
        entity_set: &str,
        key: &str,
        column: &str,
        file_name: &str,
        data: &[u8],
        mode: UploadMode,
    ) -> Result<UploadReport> {
        if data.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "file '{}' is empty",
                file_name
            )));
        }

        let mode = match mode {
            UploadMode::Auto if data.len() as u64 > self.config().chunked_upload_threshold => {
                UploadMode::Chunked
            }
            UploadMode::Auto => UploadMode::Small,
            explicit => explicit,
        };

        let url = self.file_column_url(entity_set, key, column);
        let chunks = match mode {
            UploadMode::Chunked => self.upload_chunked(&url, file_name, data).await?,
            _ => {
                self.execute(
                    Method::PATCH,
                    &url,
                    &[
                        ("Content-Type", "application/octet-stream".to_string()),
                        ("x-ms-file-name", file_name.to_string()),
                    ],
                    &[],
                    Payload::Bytes(data.to_vec()),
                )
                .await?;
                1
            }
        };

        info!(
            "Uploaded {} ({} bytes) to {}/{} in {} request(s)",
            file_name,
            data.len(),
            entity_set,
            column,
            chunks
        );

        Ok(UploadReport {
            file_name: file_name.to_string(),
            size: data.len() as u64,
            mode,
            chunks,
        })
    }

    async fn upload_chunked(&self, url: &str, file_name: &str, data: &[u8]) -> Result<usize> {
        let response = self
            .execute(
                Method::PATCH,
                url,
                &[
                    ("x-ms-transfer-mode", "chunked".to_string()),
                    ("x-ms-file-name", file_name.to_string()),
                ],
                &[],
                Payload::Empty,
            )
            .await?;

        let headers = response.headers();
        let location = headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                Error::UnexpectedResponse(
                    "chunked upload response missing Location header".to_string(),
                )
            })?;
        let chunk_size = headers
            .get("x-ms-chunk-size")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        debug!("Upload session opened, chunk size {}", chunk_size);

        let total = data.len();
        let mut sent = 0usize;
        for (n, block) in data.chunks(chunk_size).enumerate() {
            let start = n * chunk_size;
            self.execute(
                Method::PATCH,
                &location,
                &[
                    ("Content-Type", "application/octet-stream".to_string()),
                    ("Content-Range", content_range(start, block.len(), total)),
                    ("x-ms-file-name", file_name.to_string()),
                ],
                &[],
                Payload::Bytes(block.to_vec()),
            )
            .await?;
            sent += 1;
        }

        Ok(sent)
    }

    /// Upload a file from disk, using its file name.
    pub async fn upload_path(
        &self,
        entity_set: &str,
        key: &str,
        column: &str,
        path: &Path,
        mode: UploadMode,
    ) -> Result<UploadReport> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        let data = fs::read(path).await?;
        self.upload_file(entity_set, key, column, &file_name, &data, mode)
            .await
    }

    /// Download the contents of a file column.
    pub async fn download_file(
        &self,
        entity_set: &str,
        key: &str,
        column: &str,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/$value", self.file_column_url(entity_set, key, column));
        let response = self
            .execute(
                Method::GET,
                &url,
                &[("Accept", "*/*".to_string())],
                &[],
                Payload::Empty,
            )
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}
