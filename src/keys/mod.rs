//! Storage key generation
//!
//! Keys have the form `{prefix}/{unix_millis}-{uuid_v4}-{sanitized_name}`.
//! The timestamp orders keys by upload time, the UUID makes collisions
//! negligible, and the sanitized name keeps traversal sequences and
//! reserved characters out of the key.

use crate::config::StorageConfig;
use crate::validation::sanitize_file_name;
use chrono::Utc;
use uuid::Uuid;

/// Default first path segment of generated keys
pub const DEFAULT_KEY_PREFIX: &str = "images";

/// Builds storage keys under a fixed prefix
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.key_prefix.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a fresh key for `file_name`
    pub fn generate_key(&self, file_name: &str) -> String {
        self.generate_key_with(file_name, Utc::now().timestamp_millis(), Uuid::new_v4())
    }

    /// Deterministic variant of [`KeyGenerator::generate_key`]
    pub fn generate_key_with(&self, file_name: &str, timestamp_millis: i64, id: Uuid) -> String {
        format!(
            "{}/{}-{}-{}",
            self.prefix,
            timestamp_millis,
            id,
            sanitize_file_name(file_name)
        )
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// Generate a key under the default `images/` prefix
pub fn generate_secure_upload_path(file_name: &str) -> String {
    KeyGenerator::default().generate_key(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        let key = KeyGenerator::default().generate_key_with("my photo.png", 1700000000000, id);
        assert_eq!(
            key,
            "images/1700000000000-00000000-0000-0000-0000-000000000000-my_photo.png"
        );
    }

    #[test]
    fn test_keys_are_unique_and_prefixed() {
        let generator = KeyGenerator::default();
        let keys: HashSet<String> = (0..1000).map(|_| generator.generate_key("a.png")).collect();
        assert_eq!(keys.len(), 1000);
        assert!(keys.iter().all(|k| k.starts_with("images/") && k.ends_with("-a.png")));
    }

    #[test]
    fn test_traversal_never_reaches_key() {
        let key = generate_secure_upload_path("../../etc/passwd");
        assert!(key.starts_with("images/"));
        assert_eq!(key.matches('/').count(), 1);
        assert!(key.ends_with("-file_._.._etc_passwd"));
    }

    #[test]
    fn test_custom_prefix() {
        let generator = KeyGenerator::new("uploads");
        assert!(generator.generate_key("x.gif").starts_with("uploads/"));
    }
}
