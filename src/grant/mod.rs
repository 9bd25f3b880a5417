//! Upload grant client
//!
//! Step one of the two-phase upload: ask the API for a presigned PUT URL.
//!
//! # Wire format
//!
//! ```text
//! POST {base_url}/upload-url
//! Content-Type: application/json
//!
//! {"fileName": "images/1700000000000-<uuid>-a.png", "fileType": "image/png"}
//!
//! 200 OK
//! {"upload_url": "https://bucket.s3...", "s3_key": "images/...", "message": "..."}
//! ```
//!
//! Any non-2xx response is an error carrying the status text.
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::grant::{GrantClient, HttpGrantClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpGrantClient::new("https://api.example.com/upload-url", Duration::from_secs(30))?;
//! let grant = client.request_upload_url("images/1-abc-a.png", "image/png").await?;
//! println!("PUT to {}", grant.upload_url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Grant request errors
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to get upload URL: {0}")]
    RequestError(String),

    #[error("Failed to get upload URL: {status_text}")]
    Status { status: u16, status_text: String },

    #[error("Invalid grant response: {0}")]
    ResponseError(String),
}

/// Body of the grant request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_name: String,
    pub file_type: String,
}

/// A short-lived, single-use write URL and the key it authorizes.
///
/// Expiry and single use are enforced by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUrlGrant {
    pub upload_url: String,
    #[serde(default)]
    pub s3_key: String,
    #[serde(default)]
    pub message: String,
}

/// Source of upload grants
#[async_trait]
pub trait GrantClient: Send + Sync {
    /// Request a presigned URL for `file_name` with the declared `file_type`.
    ///
    /// By default the orchestrator passes the full generated storage key
    /// (`images/{millis}-{uuid}-{name}`) as `file_name`, so an endpoint that
    /// prefixes keys itself should be paired with
    /// [`GrantFileName::OriginalName`](crate::config::GrantFileName::OriginalName).
    /// A non-empty `s3_key` in the grant is taken as the stored key.
    async fn request_upload_url(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<UploadUrlGrant, GrantError>;
}

/// HTTP implementation of [`GrantClient`]
pub struct HttpGrantClient {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpGrantClient {
    /// Create a client posting to `endpoint` (the full URL, path included)
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GrantError> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(GrantError::ConfigError(format!(
                "grant endpoint '{}' must start with http:// or https://",
                endpoint
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GrantError::ConfigError(e.to_string()))?;

        Ok(Self {
            endpoint,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GrantClient for HttpGrantClient {
    #[tracing::instrument(
        name = "grant.request_upload_url",
        skip(self),
        fields(
            http.method = "POST",
            http.url = %self.endpoint,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn request_upload_url(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<UploadUrlGrant, GrantError> {
        let body = UploadUrlRequest {
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GrantError::RequestError(e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "grant endpoint returned an error"
            );
            return Err(GrantError::Status {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.as_str().to_string()),
            });
        }

        let grant: UploadUrlGrant = response
            .json()
            .await
            .map_err(|e| GrantError::ResponseError(e.to_string()))?;

        if grant.upload_url.is_empty() {
            return Err(GrantError::ResponseError("upload_url is empty".into()));
        }

        tracing::debug!(s3_key = %grant.s3_key, "upload URL received");
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_camel_case() {
        let body = UploadUrlRequest {
            file_name: "a.png".into(),
            file_type: "image/png".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["fileName"], "a.png");
        assert_eq!(json["fileType"], "image/png");
    }

    #[test]
    fn test_grant_tolerates_missing_message() {
        let grant: UploadUrlGrant =
            serde_json::from_str(r#"{"upload_url":"http://s/put","s3_key":"images/k"}"#).unwrap();
        assert_eq!(grant.s3_key, "images/k");
        assert!(grant.message.is_empty());
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let result = HttpGrantClient::new("localhost:3000/upload-url", Duration::from_secs(1));
        assert!(matches!(result, Err(GrantError::ConfigError(_))));
    }
}
