//! File validation module
//!
//! Runs the client-side acceptance checks on a file before any network
//! transfer happens. Checks run cheapest first and stop at the first
//! failure:
//!
//! | Order | Check | Needs content |
//! |-------|-------|---------------|
//! | 1 | name | no |
//! | 2 | size | no |
//! | 3 | declared type + extension | no |
//! | 4 | magic bytes | first 32 bytes |
//!
//! This is a defense-in-depth layer. The storage backend remains the
//! authority on what it accepts.

use crate::config::{SecurityConfig, DOCX_MIME_TYPE, MIB};
use crate::upload::UploadFile;

pub mod name;
pub mod signature;

pub use name::{sanitize_file_name, validate_file_name};
pub use signature::{check_header, FileSignature, HEADER_LEN};

/// Outcome of a single check, or of the whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
    /// Which check produced a failure. Set by [`FileValidator`].
    pub check: Option<Check>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            reason: None,
            check: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
            check: None,
        }
    }

    fn tagged(mut self, check: Check) -> Self {
        if !self.is_valid {
            self.check = Some(check);
        }
        self
    }
}

/// The individual checks, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    Name,
    Size,
    Type,
    Signature,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Check::Name => "name",
            Check::Size => "size",
            Check::Type => "type",
            Check::Signature => "signature",
        }
    }
}

type SyncCheck = fn(&UploadFile, &SecurityConfig) -> ValidationResult;

const SYNC_CHECKS: [(Check, SyncCheck); 3] = [
    (Check::Name, check_name),
    (Check::Size, check_size),
    (Check::Type, check_type),
];

fn check_name(file: &UploadFile, _: &SecurityConfig) -> ValidationResult {
    validate_file_name(file.name())
}

fn check_size(file: &UploadFile, config: &SecurityConfig) -> ValidationResult {
    validate_file_size(file.size(), config.max_file_size)
}

fn check_type(file: &UploadFile, config: &SecurityConfig) -> ValidationResult {
    validate_file_type(file.name(), file.content_type(), config)
}

/// Runs the check chain for one file.
///
/// Holds no state; independent files can be validated concurrently.
pub struct FileValidator;

impl FileValidator {
    /// Validate a file against `config`, returning the first failure or a
    /// success result.
    #[tracing::instrument(
        name = "validation.file",
        skip(file, config),
        fields(file.name = %file.name(), file.size = file.size(), file.content_type = %file.content_type())
    )]
    pub async fn validate(file: &UploadFile, config: &SecurityConfig) -> ValidationResult {
        if let Some(failure) = SYNC_CHECKS
            .iter()
            .map(|(check, run)| run(file, config).tagged(*check))
            .find(|result| !result.is_valid)
        {
            tracing::debug!(check = ?failure.check, reason = ?failure.reason, "validation failed");
            return failure;
        }

        let result = validate_file_header(file, config.strict_signatures)
            .await
            .tagged(Check::Signature);
        if !result.is_valid {
            tracing::debug!(reason = ?result.reason, "signature check failed");
        }
        result
    }
}

/// Valid iff `0 < size <= max_size`
pub fn validate_file_size(size: u64, max_size: u64) -> ValidationResult {
    if size > max_size {
        return ValidationResult::fail(format!(
            "File size exceeds maximum limit of {}",
            format_size(max_size)
        ));
    }

    if size == 0 {
        return ValidationResult::fail("File is empty");
    }

    ValidationResult::ok()
}

/// Both the declared MIME type and the name's extension must be allowed.
pub fn validate_file_type(
    file_name: &str,
    content_type: &str,
    config: &SecurityConfig,
) -> ValidationResult {
    if !config
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    {
        let shown = if content_type.is_empty() {
            "(none)"
        } else {
            content_type
        };
        return ValidationResult::fail(format!(
            "File type {} is not allowed. Allowed types: {}",
            shown,
            config.allowed_mime_types.join(", ")
        ));
    }

    let lower = file_name.to_lowercase();
    if !config
        .allowed_extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_lowercase()))
    {
        return ValidationResult::fail(format!(
            "File extension is not allowed. Allowed extensions: {}",
            config.allowed_extensions.join(", ")
        ));
    }

    ValidationResult::ok()
}

/// Read the first [`HEADER_LEN`] bytes and check them against the
/// signature table.
pub async fn validate_file_header(file: &UploadFile, strict: bool) -> ValidationResult {
    match file.read_header(HEADER_LEN).await {
        Ok(header) => check_header(&header, file.content_type(), strict),
        Err(e) => {
            tracing::warn!(file = %file.name(), error = %e, "could not read file header");
            ValidationResult::fail("Could not read file for validation")
        }
    }
}

/// Human-readable byte count used in size rejections
pub fn format_size(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{}MB", (bytes as f64 / MIB as f64).round() as u64)
    } else if bytes >= 1024 {
        format!("{}KB", (bytes as f64 / 1024.0).round() as u64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Extensions accepted for a MIME type when only types are overridden
pub fn extensions_for_mime_type(mime_type: &str) -> Vec<String> {
    let mime_type = mime_type.to_ascii_lowercase();
    match mime_type.as_str() {
        "image/jpeg" => vec![".jpg".into(), ".jpeg".into()],
        DOCX_MIME_TYPE => vec![".docx".into()],
        other => other
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .filter(|subtype| !subtype.is_empty())
            .map(|subtype| vec![format!(".{}", subtype)])
            .unwrap_or_default(),
    }
}

/// Per-call adjustments applied on top of the configured [`SecurityConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityOverrides {
    pub max_file_size: Option<u64>,
    pub allowed_mime_types: Option<Vec<String>>,
    pub allowed_extensions: Option<Vec<String>>,
}

impl SecurityOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge onto `base`. Overridden types without overridden extensions
    /// derive their extensions from the types.
    pub fn apply(&self, base: &SecurityConfig) -> SecurityConfig {
        let mut config = base.clone();

        if let Some(max) = self.max_file_size {
            config.max_file_size = max;
        }

        if let Some(types) = &self.allowed_mime_types {
            config.allowed_mime_types = types.clone();
            if self.allowed_extensions.is_none() {
                let mut extensions: Vec<String> = Vec::new();
                for ext in types.iter().flat_map(|t| extensions_for_mime_type(t)) {
                    if !extensions.contains(&ext) {
                        extensions.push(ext);
                    }
                }
                config.allowed_extensions = extensions;
            }
        }

        if let Some(extensions) = &self.allowed_extensions {
            config.allowed_extensions = extensions.clone();
        }

        config
    }
}
