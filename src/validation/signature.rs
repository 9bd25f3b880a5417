//! Magic-byte signatures
//!
//! Only image formats have table entries. Declared types without an entry
//! (PDF, DOCX, ...) are exempt from the byte check.

use super::ValidationResult;

/// Number of leading bytes read for signature detection
pub const HEADER_LEN: usize = 32;

/// A known file signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub mime_type: &'static str,
    /// Bytes expected at offset 0
    pub magic: &'static [u8],
    /// Additional marker required in strict mode, as `(offset, bytes)`
    pub strict_marker: Option<(usize, &'static [u8])>,
}

impl FileSignature {
    /// Prefix match against the signature's magic bytes
    pub fn matches(&self, header: &[u8]) -> bool {
        header.starts_with(self.magic)
    }

    /// Prefix match plus the strict marker, if any
    pub fn matches_strict(&self, header: &[u8]) -> bool {
        self.matches(header)
            && self.strict_marker.map_or(true, |(offset, marker)| {
                header
                    .get(offset..offset + marker.len())
                    .is_some_and(|window| window == marker)
            })
    }
}

pub const SIGNATURES: &[FileSignature] = &[
    FileSignature {
        mime_type: "image/jpeg",
        magic: &[0xFF, 0xD8, 0xFF],
        strict_marker: None,
    },
    FileSignature {
        mime_type: "image/png",
        magic: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        strict_marker: None,
    },
    FileSignature {
        mime_type: "image/gif",
        magic: &[0x47, 0x49, 0x46, 0x38],
        strict_marker: None,
    },
    FileSignature {
        mime_type: "image/webp",
        magic: &[0x52, 0x49, 0x46, 0x46],
        strict_marker: Some((8, b"WEBP")),
    },
];

/// Signature table entry for a MIME type
pub fn signature_for(mime_type: &str) -> Option<&'static FileSignature> {
    SIGNATURES
        .iter()
        .find(|sig| sig.mime_type.eq_ignore_ascii_case(mime_type))
}

/// First signature whose magic bytes prefix `header`
pub fn detect(header: &[u8]) -> Option<&'static FileSignature> {
    SIGNATURES.iter().find(|sig| sig.matches(header))
}

/// Check a file header against the declared type.
///
/// Loose mode accepts any known signature; strict mode requires the
/// declared type's own signature.
pub fn check_header(header: &[u8], declared_type: &str, strict: bool) -> ValidationResult {
    let Some(expected) = signature_for(declared_type) else {
        return ValidationResult::ok();
    };

    if strict {
        if expected.matches_strict(header) {
            return ValidationResult::ok();
        }
        return ValidationResult::fail(format!(
            "File content does not match declared type {}",
            expected.mime_type
        ));
    }

    match detect(header) {
        Some(_) => ValidationResult::ok(),
        None => ValidationResult::fail("File does not appear to be a valid image"),
    }
}
