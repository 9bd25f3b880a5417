//! Shared test helpers

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use presign_uploadr::grant::{GrantClient, GrantError, UploadUrlGrant};
use presign_uploadr::upload::UploadFile;

pub const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// `len` bytes starting with the PNG signature
pub fn png_bytes(len: usize) -> Bytes {
    let mut data = PNG_MAGIC.to_vec();
    data.resize(len.max(PNG_MAGIC.len()), 0xAB);
    Bytes::from(data)
}

pub fn png_file(name: &str, len: usize) -> UploadFile {
    UploadFile::from_bytes(name, "image/png", png_bytes(len))
}

/// Grant client that authorizes whatever key it is asked for
pub struct EchoGrantClient {
    base_url: String,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl EchoGrantClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GrantClient for EchoGrantClient {
    async fn request_upload_url(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<UploadUrlGrant, GrantError> {
        self.requests
            .lock()
            .push((file_name.to_string(), file_type.to_string()));
        Ok(UploadUrlGrant {
            upload_url: format!("{}/{}", self.base_url, file_name),
            s3_key: file_name.to_string(),
            message: "Upload URL generated".to_string(),
        })
    }
}

/// `true` when `key` looks like `images/<millis>-<uuid>-<name>`
pub fn is_generated_key(key: &str, name: &str) -> bool {
    let Some(rest) = key.strip_prefix("images/") else {
        return false;
    };
    let Some((millis, rest)) = rest.split_once('-') else {
        return false;
    };
    if millis.is_empty() || !millis.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // A hyphenated UUID is 36 characters.
    rest.len() > 37
        && uuid::Uuid::parse_str(&rest[..36]).is_ok()
        && &rest[36..37] == "-"
        && &rest[37..] == name
}
