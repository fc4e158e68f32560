//! Document type and file-name validation.
//!
//! Uploaded file names are untrusted input: they are normalized to NFC and
//! checked against a strict allowlist before any document row is created.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::{LexigenError, Result};

/// Maximum document content size (3 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 3 * 1024 * 1024;

/// Maximum bytes for a single path segment.
const MAX_SEGMENT_BYTES: usize = 255;

/// Maximum bytes for the whole relative path.
const MAX_PATH_BYTES: usize = 1024;

/// Characters invalid in Windows file names.
const WINDOWS_INVALID: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Unicode look-alikes for path separators and dots.
///
/// These survive NFC normalization and would otherwise let a crafted name
/// masquerade as a traversal once rendered or re-encoded downstream.
const LOOKALIKE_CHARS: &[char] = &[
    '\u{FF0F}', // fullwidth solidus
    '\u{2044}', // fraction slash
    '\u{2215}', // division slash
    '\u{29F8}', // big solidus
    '\u{FF3C}', // fullwidth reverse solidus
    '\u{FF0E}', // fullwidth full stop
    '\u{FE52}', // small full stop
    '\u{3002}', // ideographic full stop
];

/// Windows reserved device names (case-insensitive, matched on the stem).
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// A registered text document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    /// Validated relative path under the project's document root.
    pub file_name: String,
    pub content: String,
    /// SHA-256 of the content, hex encoded.
    pub content_hash: String,
}

impl Document {
    /// Computes the content hash used to detect unchanged documents.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Validates an uploaded file name and returns its NFC-normalized form.
///
/// Rules: relative path only, forward slashes, no traversal, no empty
/// segments, no Windows-invalid or look-alike characters, no trailing space
/// or dot per segment, segment <= 255 bytes, total <= 1024 bytes, and the
/// extension must be `.txt` or `.md`.
pub fn validate_file_name(raw: &str) -> Result<String> {
    let name: String = raw.nfc().collect();

    if name.is_empty() {
        return Err(LexigenError::validation("file name is empty"));
    }
    if name.len() > MAX_PATH_BYTES {
        return Err(LexigenError::validation(format!(
            "file name exceeds {} bytes: {}",
            MAX_PATH_BYTES,
            name.len()
        )));
    }
    if name.contains('\\') {
        return Err(LexigenError::validation(format!(
            "file name contains a backslash: {}",
            name
        )));
    }
    if name.starts_with('/') {
        return Err(LexigenError::validation(format!(
            "file name must be relative: {}",
            name
        )));
    }
    if let Some(c) = name.chars().find(|c| LOOKALIKE_CHARS.contains(c)) {
        return Err(LexigenError::validation(format!(
            "file name contains look-alike character U+{:04X}: {}",
            c as u32, name
        )));
    }

    for segment in name.split('/') {
        validate_segment(segment, &name)?;
    }

    let lower = name.to_lowercase();
    if !lower.ends_with(".txt") && !lower.ends_with(".md") {
        return Err(LexigenError::validation(format!(
            "unsupported file extension (expected .txt or .md): {}",
            name
        )));
    }

    Ok(name)
}

/// Validates a single path segment of an already-normalized name.
fn validate_segment(segment: &str, full: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(LexigenError::validation(format!(
            "file name contains an empty path segment: {}",
            full
        )));
    }
    if segment == "." || segment == ".." {
        return Err(LexigenError::validation(format!(
            "file name contains a traversal segment: {}",
            full
        )));
    }
    if segment.len() > MAX_SEGMENT_BYTES {
        return Err(LexigenError::validation(format!(
            "path segment exceeds {} bytes: {}",
            MAX_SEGMENT_BYTES, full
        )));
    }
    if segment.ends_with(' ') || segment.ends_with('.') {
        return Err(LexigenError::validation(format!(
            "path segment ends with a space or dot: {}",
            full
        )));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| WINDOWS_INVALID.contains(c) || c.is_control())
    {
        return Err(LexigenError::validation(format!(
            "path segment contains invalid character {:?}: {}",
            c, full
        )));
    }

    let stem = segment.split('.').next().unwrap_or(segment);
    if RESERVED_NAMES.contains(&stem.to_lowercase().as_str()) {
        return Err(LexigenError::validation(format!(
            "path segment uses a reserved device name: {}",
            full
        )));
    }

    Ok(())
}

/// Validates document content size and encoding constraints.
pub fn validate_content(content: &str) -> Result<()> {
    if content.len() > MAX_DOCUMENT_BYTES {
        return Err(LexigenError::validation(format!(
            "document content exceeds {} bytes: {}",
            MAX_DOCUMENT_BYTES,
            content.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_simple_names() {
        assert_eq!(validate_file_name("notes.txt").unwrap(), "notes.txt");
        assert_eq!(validate_file_name("a/b/c.md").unwrap(), "a/b/c.md");
        assert_eq!(validate_file_name("第一章.txt").unwrap(), "第一章.txt");
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("a/../b.txt").is_err());
        assert!(validate_file_name("./a.txt").is_err());
    }

    #[test]
    fn test_rejects_absolute_and_backslash() {
        assert!(validate_file_name("/etc/passwd.txt").is_err());
        assert!(validate_file_name("a\\b.txt").is_err());
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(validate_file_name("a//b.md").is_err());
        assert!(validate_file_name("a/b.md/").is_err());
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn test_rejects_windows_invalid_chars() {
        for name in ["a<b.txt", "a>b.txt", "a:b.txt", "a\"b.txt", "a|b.txt", "a?b.txt", "a*b.txt"] {
            assert!(validate_file_name(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_rejects_reserved_device_names() {
        assert!(validate_file_name("con.txt").is_err());
        assert!(validate_file_name("docs/NUL.md").is_err());
        assert!(validate_file_name("COM1.txt").is_err());
        // "console.txt" has stem "console", not a reserved name
        assert!(validate_file_name("console.txt").is_ok());
    }

    #[test]
    fn test_rejects_trailing_space_and_dot() {
        assert!(validate_file_name("a. /b.txt").is_err());
        assert!(validate_file_name("a./b.txt").is_err());
        assert!(validate_file_name("b .txt").is_ok()); // interior space is fine, trailing is not
        assert!(validate_file_name("b.txt ").is_err());
    }

    #[test]
    fn test_rejects_lookalike_separators() {
        assert!(validate_file_name("a\u{FF0F}b.txt").is_err());
        assert!(validate_file_name("a\u{3002}txt").is_err());
        assert!(validate_file_name("a\u{FF0E}txt").is_err());
    }

    #[test]
    fn test_rejects_bad_extension() {
        assert!(validate_file_name("x.exe").is_err());
        assert!(validate_file_name("x.markdown").is_err());
        assert!(validate_file_name("x").is_err());
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert!(validate_file_name("x.TXT").is_ok());
        assert!(validate_file_name("x.Md").is_ok());
    }

    #[test]
    fn test_rejects_oversized_segment_and_path() {
        let long_segment = format!("{}.txt", "a".repeat(300));
        assert!(validate_file_name(&long_segment).is_err());

        let long_path = format!("{}/leaf.txt", "ab/".repeat(400));
        assert!(validate_file_name(&long_path).is_err());
    }

    #[test]
    fn test_nfc_normalization_applied() {
        // "é" as 'e' + combining acute composes to a single code point
        let decomposed = "cafe\u{0301}.txt";
        let validated = validate_file_name(decomposed).unwrap();
        assert_eq!(validated, "café.txt");
    }

    #[test]
    fn test_content_size_limit() {
        assert!(validate_content("hello").is_ok());
        let big = "x".repeat(MAX_DOCUMENT_BYTES + 1);
        assert!(validate_content(&big).is_err());
    }

    #[test]
    fn test_hash_content_is_stable() {
        let a = Document::hash_content("hello");
        let b = Document::hash_content("hello");
        let c = Document::hash_content("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
