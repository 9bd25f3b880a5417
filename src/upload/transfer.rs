//! Storage transfer
//!
//! Step two of the two-phase upload: PUT the raw file bytes to the
//! presigned URL returned by the grant endpoint. The URL already carries
//! its authorization, so the only header sent is `Content-Type`.
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::upload::transfer::{PresignedPutTransfer, StorageTransfer};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transfer = PresignedPutTransfer::new(Duration::from_secs(300))?;
//! let body = Bytes::from_static(b"\x89PNG\r\n\x1a\n");
//! let result = transfer
//!     .put("https://bucket.s3.amazonaws.com/images/k?X-Amz-Signature=...", body, "image/png")
//!     .await?;
//! println!("stored {} bytes", result.bytes_written);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Hint attached to network-level transfer failures
pub const NETWORK_HINT: &str = "check that the storage endpoint is reachable and that its CORS \
     policy allows PUT requests with this Content-Type from this origin";

/// Transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to upload file: {status_text}")]
    Status { status: u16, status_text: String },

    #[error("Failed to upload file: {}{}", .message, format_hint(.hint))]
    Network {
        message: String,
        hint: Option<String>,
    },
}

impl TransferError {
    /// Build a network error, attaching [`NETWORK_HINT`] when the failure
    /// looks like a reachability or cross-origin problem.
    pub fn network(message: impl Into<String>, looks_like_network: bool) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let suggests_network = looks_like_network
            || ["cors", "cross-origin", "network", "failed to fetch", "connection"]
                .iter()
                .any(|needle| lower.contains(needle));

        Self::Network {
            hint: suggests_network.then(|| NETWORK_HINT.to_string()),
            message,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Network { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

fn format_hint(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default()
}

/// Result of a completed PUT
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub etag: Option<String>,
    pub bytes_written: u64,
}

/// Uploads a body to a granted URL
#[async_trait]
pub trait StorageTransfer: Send + Sync {
    async fn put(
        &self,
        upload_url: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<TransferResult, TransferError>;
}

/// PUT over HTTP with `reqwest`
pub struct PresignedPutTransfer {
    http_client: reqwest::Client,
}

impl PresignedPutTransfer {
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::ConfigError(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl StorageTransfer for PresignedPutTransfer {
    #[tracing::instrument(
        name = "storage.put",
        skip(self, upload_url, body),
        fields(
            http.method = "PUT",
            http.content_type = %content_type,
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        upload_url: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<TransferResult, TransferError> {
        let bytes_written = body.len() as u64;
        let start_time = Instant::now();

        let response = self
            .http_client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let looks_like_network = e.is_connect() || e.is_request() || e.is_timeout();
                TransferError::network(e.to_string(), looks_like_network)
            })?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "storage PUT failed"
            );
            return Err(TransferError::Status {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.as_str().to_string()),
            });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::info!(
            etag = ?etag,
            bytes_written = bytes_written,
            duration_ms = start_time.elapsed().as_millis(),
            "storage PUT completed"
        );

        Ok(TransferResult {
            etag,
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_hint_from_message() {
        let err = TransferError::network("TypeError: Failed to fetch (CORS)", false);
        assert_eq!(err.hint(), Some(NETWORK_HINT));
        assert!(err.to_string().contains("CORS policy"));
    }

    #[test]
    fn test_no_hint_for_other_failures() {
        let err = TransferError::network("body stream ended early", false);
        assert!(err.hint().is_none());
        assert_eq!(err.to_string(), "Failed to upload file: body stream ended early");
    }

    #[test]
    fn test_status_error_message() {
        let err = TransferError::Status {
            status: 403,
            status_text: "Forbidden".into(),
        };
        assert_eq!(err.to_string(), "Failed to upload file: Forbidden");
        assert!(err.hint().is_none());
    }
}
