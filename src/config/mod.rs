//! Configuration module for Presign Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation of the security, rate-limit
//! and endpoint settings used by the upload pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// One mebibyte in bytes
pub const MIB: u64 = 1024 * 1024;

/// MIME type of DOCX documents
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}") else {
        return s.to_string();
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Custom deserializer for strings with environment variable expansion.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grant: GrantConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.grant.base_url.is_empty() && !is_valid_http_url(&self.grant.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid grant base_url '{}': must start with http:// or https://",
                self.grant.base_url
            )));
        }

        if !self.grant.path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid grant path '{}': must start with '/'",
                self.grant.path
            )));
        }

        self.security.validate()?;

        if self.rate_limit.max_uploads == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_uploads must be greater than 0".into(),
            ));
        }

        if self.rate_limit.try_window().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid rate_limit.window_minutes {}: must be a positive number of minutes \
                 representable as a non-zero duration",
                self.rate_limit.window_minutes
            )));
        }

        let prefix = &self.storage.key_prefix;
        if prefix.is_empty() || prefix.contains('/') || prefix.contains("..") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid storage.key_prefix '{}': must be a single non-empty path segment",
                prefix
            )));
        }

        Ok(())
    }
}

/// Presigned URL grant endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantConfig {
    /// Base URL of the API issuing presigned URLs. Supports ${VAR} expansion.
    /// Empty disables uploads (validation still works).
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub base_url: String,

    /// Path appended to `base_url`. Default: "/upload-url"
    #[serde(default = "default_grant_path")]
    pub path: String,

    /// Request timeout in seconds. Default: 30
    #[serde(default = "default_grant_timeout")]
    pub timeout_seconds: u64,

    /// What is sent as `fileName` in the grant request. Default: generated_key
    #[serde(default)]
    pub file_name: GrantFileName,
}

/// Value sent as `fileName` to the grant endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantFileName {
    /// The full generated key (`{prefix}/{millis}-{uuid}-{name}`). For
    /// endpoints that sign whatever key they are given.
    #[default]
    GeneratedKey,
    /// The file's own name. For endpoints that build the key themselves.
    OriginalName,
}

impl GrantConfig {
    /// Full URL of the grant endpoint
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path: default_grant_path(),
            timeout_seconds: default_grant_timeout(),
            file_name: GrantFileName::default(),
        }
    }
}

fn default_grant_path() -> String {
    "/upload-url".to_string()
}

fn default_grant_timeout() -> u64 {
    30
}

/// Storage PUT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Timeout for the whole PUT in seconds. Default: 300
    #[serde(default = "default_transfer_timeout")]
    pub timeout_seconds: u64,

    /// Content-Type sent when a file has no declared type
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl TransferConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_transfer_timeout(),
            default_content_type: default_content_type(),
        }
    }
}

fn default_transfer_timeout() -> u64 {
    300
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

// ============================================================================
// Security Configuration
// ============================================================================

/// Client-side file acceptance policy.
///
/// # Example
///
/// ```yaml
/// security:
///   max_file_size: 10485760
///   allowed_mime_types: ["image/png", "application/pdf"]
///   allowed_extensions: [".png", ".pdf"]
///   max_files_per_upload: 5
///   strict_signatures: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Maximum file size in bytes. Default: 10 MiB
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,

    /// Extensions including the leading dot, matched case-insensitively
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_max_files_per_upload")]
    pub max_files_per_upload: usize,

    /// Reserved; no scanner is wired in.
    #[serde(default)]
    pub scan_for_malware: bool,

    /// Require the magic bytes to match the declared MIME type instead of
    /// any known image signature.
    #[serde(default)]
    pub strict_signatures: bool,
}

impl SecurityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "security.max_file_size must be greater than 0".into(),
            ));
        }

        if self.allowed_mime_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "security.allowed_mime_types cannot be empty".into(),
            ));
        }

        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "security.allowed_extensions cannot be empty".into(),
            ));
        }

        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid extension '{}': must start with '.'",
                ext
            )));
        }

        if self.max_files_per_upload == 0 {
            return Err(ConfigError::ValidationError(
                "security.max_files_per_upload must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
            allowed_extensions: default_allowed_extensions(),
            max_files_per_upload: default_max_files_per_upload(),
            scan_for_malware: false,
            strict_signatures: false,
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * MIB
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/gif", "image/webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_allowed_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_files_per_upload() -> usize {
    5
}

/// Sliding-window upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default: 10
    #[serde(default = "default_max_uploads")]
    pub max_uploads: u32,

    /// Default: 1.0
    #[serde(default = "default_window_minutes")]
    pub window_minutes: f64,
}

impl RateLimitConfig {
    /// Window length, or `None` when `window_minutes` is not positive,
    /// overflows a `Duration` or rounds down to zero.
    pub fn try_window(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.window_minutes * 60.0)
            .ok()
            .filter(|window| !window.is_zero())
    }

    /// Window length. Falls back to the default window for values
    /// `Config::validate` rejects.
    pub fn window(&self) -> Duration {
        self.try_window()
            .unwrap_or_else(|| Duration::from_secs_f64(default_window_minutes() * 60.0))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_uploads: default_max_uploads(),
            window_minutes: default_window_minutes(),
        }
    }
}

fn default_max_uploads() -> u32 {
    10
}

fn default_window_minutes() -> f64 {
    1.0
}

/// Storage key layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// First path segment of every generated key. Default: "images"
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    "images".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.security.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.rate_limit.max_uploads, 10);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.storage.key_prefix, "images");
    }

    #[test]
    fn test_endpoint_joins_base_and_path() {
        let grant = GrantConfig {
            base_url: "https://api.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(grant.endpoint(), "https://api.example.com/upload-url");
    }

    #[test]
    fn test_grant_file_name_parses_snake_case() {
        let grant: GrantConfig = serde_yaml::from_str("file_name: original_name\n").unwrap();
        assert_eq!(grant.file_name, GrantFileName::OriginalName);
        assert_eq!(GrantConfig::default().file_name, GrantFileName::GeneratedKey);
    }

    #[test]
    fn test_validation_rejects_bad_base_url() {
        let mut config = Config::default();
        config.grant.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = Config::default();
        config.rate_limit.window_minutes = 0.0;
        assert!(config.validate().is_err());

        config.rate_limit.window_minutes = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_extension_without_dot() {
        let mut config = Config::default();
        config.security.allowed_extensions = vec!["png".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nested_key_prefix() {
        let mut config = Config::default();
        config.storage.key_prefix = "images/../secrets".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let expanded = expand_env_vars("${PRESIGN_SURELY_UNSET_VAR:-http://localhost:3000}");
        assert_eq!(expanded, "http://localhost:3000");

        let kept = expand_env_vars("${PRESIGN_SURELY_UNSET_VAR}");
        assert_eq!(kept, "${PRESIGN_SURELY_UNSET_VAR}");
    }
}
