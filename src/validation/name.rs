//! File name checks and sanitization
//!
//! [`validate_file_name`] rejects names that could escape the key namespace
//! or collide with platform device names. [`sanitize_file_name`] is the
//! total counterpart used when building storage keys: it never fails and is
//! idempotent.

use super::ValidationResult;

/// Longest accepted file name, in characters
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Returned by [`sanitize_file_name`] when nothing usable is left
pub const UNNAMED_FILE: &str = "unnamed_file";

/// Windows device names, matched against the part before the first dot
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters never allowed in a file name: `< > : " | ? *` and ASCII
/// control characters.
#[inline]
pub fn is_forbidden_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || ('\u{0}'..='\u{1f}').contains(&c)
}

/// Characters replaced by [`sanitize_file_name`]: the forbidden set plus
/// path separators, so a sanitized name is always a single path segment.
#[inline]
fn is_unsafe_key_char(c: char) -> bool {
    is_forbidden_char(c) || c == '/' || c == '\\' || c.is_whitespace()
}

/// Check a file name for traversal sequences, null bytes, reserved device
/// names, forbidden characters, excessive length and the hidden-file
/// convention, in that order.
pub fn validate_file_name(name: &str) -> ValidationResult {
    if name.contains("../") || name.contains("..\\") {
        return ValidationResult::fail("File name contains path traversal characters");
    }

    if name.contains('\0') {
        return ValidationResult::fail("File name contains null bytes");
    }

    let stem = name.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return ValidationResult::fail("File name is a reserved system name");
    }

    if name.chars().any(is_forbidden_char) {
        return ValidationResult::fail("File name contains invalid characters");
    }

    if name.chars().count() > MAX_FILE_NAME_LEN {
        return ValidationResult::fail(format!(
            "File name is too long (max {} characters)",
            MAX_FILE_NAME_LEN
        ));
    }

    if name.starts_with('.') {
        return ValidationResult::fail("Hidden files are not allowed");
    }

    ValidationResult::ok()
}

/// Normalize a raw file name into a safe storage-key fragment.
///
/// Forbidden characters, path separators and whitespace runs become `_`, repeated `_`
/// collapse to one, and leading/trailing `_` are trimmed. A leading `.` is
/// replaced by `file_`. An empty result becomes [`UNNAMED_FILE`].
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if is_unsafe_key_char(c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut sanitized = collapse_underscores(&replaced)
        .trim_matches('_')
        .to_string();

    if let Some(rest) = sanitized.strip_prefix('.') {
        // Re-normalize so the output is a fixed point.
        sanitized = collapse_underscores(&format!("file_{}", rest))
            .trim_end_matches('_')
            .to_string();
    }

    if sanitized.is_empty() {
        return UNNAMED_FILE.to_string();
    }

    sanitized
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(name: &str) -> String {
        validate_file_name(name).reason.unwrap_or_default()
    }

    #[test]
    fn test_accepts_ordinary_names() {
        assert!(validate_file_name("photo.png").is_valid);
        assert!(validate_file_name("my holiday (2).jpeg").is_valid);
        assert!(validate_file_name("con-artist.png").is_valid);
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(reason("../../etc/passwd").contains("path traversal"));
        assert!(reason("..\\windows\\win.ini").contains("path traversal"));
    }

    #[test]
    fn test_rejects_null_byte() {
        assert!(reason("image\0.png").contains("null bytes"));
    }

    #[test]
    fn test_rejects_reserved_names_ignoring_case_and_extension() {
        for name in ["CON", "con.png", "Lpt9.jpeg", "nul.tar.gz", "COM1"] {
            assert!(reason(name).contains("reserved"), "{name} should be reserved");
        }
        assert!(validate_file_name("COM10.png").is_valid);
    }

    #[test]
    fn test_rejects_forbidden_characters() {
        for name in ["a<b.png", "a:b.png", "what?.png", "star*.png", "tab\there.png"] {
            assert!(reason(name).contains("invalid characters"), "{name}");
        }
    }

    #[test]
    fn test_rejects_long_names() {
        let name = format!("{}.png", "a".repeat(251));
        assert!(validate_file_name(&name).is_valid);

        let name = format!("{}.png", "a".repeat(252));
        assert!(reason(&name).contains("too long"));
    }

    #[test]
    fn test_rejects_hidden_files() {
        assert_eq!(reason(".env"), "Hidden files are not allowed");
    }

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize_file_name("my photo.png"), "my_photo.png");
        assert_eq!(sanitize_file_name("  a  b  "), "a_b");
        assert_eq!(sanitize_file_name("a<>b.png"), "a_b.png");
        assert_eq!(sanitize_file_name("__x__"), "x");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "file_._.._etc_passwd");
        assert_eq!(sanitize_file_name("dir\\sub/a.png"), "dir_sub_a.png");
        assert_eq!(sanitize_file_name(".bashrc"), "file_bashrc");
        assert_eq!(sanitize_file_name(""), UNNAMED_FILE);
        assert_eq!(sanitize_file_name("???"), UNNAMED_FILE);
    }

    #[test]
    fn test_sanitize_leading_dot_edge_cases() {
        assert_eq!(sanitize_file_name("._a"), "file_a");
        assert_eq!(sanitize_file_name("."), "file");
        assert_eq!(sanitize_file_name("._"), "file");
        assert_eq!(sanitize_file_name(".."), "file_.");
    }

    #[test]
    fn test_sanitize_is_idempotent_on_samples() {
        let samples = [
            "../../etc/passwd",
            " .hidden file ",
            "a\u{0}b",
            "__.__",
            "CON.png",
            "x\r\n\ty",
            "日本 語.png",
        ];
        for raw in samples {
            let once = sanitize_file_name(raw);
            assert_eq!(sanitize_file_name(&once), once, "input {raw:?}");
        }
    }
}
