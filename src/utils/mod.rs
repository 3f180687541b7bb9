//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use anyhow::Result;
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

/// Decode file bytes as UTF-8, falling back to `fallback` on invalid input.
///
/// A leading UTF-8 byte order mark is stripped. Fails only if the fallback
/// decoder also reports malformed sequences.
pub fn decode_text(bytes: &[u8], fallback: &'static Encoding) -> Result<String> {
    let without_bom = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(without_bom) {
        return Ok(text.to_string());
    }

    if fallback == UTF_8 {
        anyhow::bail!("Content is not valid UTF-8");
    }

    let (cow, had_errors) = fallback.decode_without_bom_handling(without_bom);
    if had_errors {
        anyhow::bail!("Failed to decode content as UTF-8 or {}", fallback.name());
    }

    Ok(cow.into_owned())
}

/// Resolve an encoding label (`"latin1"`, `"windows-1252"`, ...)
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Prefix of `text` holding at most `max_chars` characters.
///
/// Always cut on a character boundary.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// SHA-256 hex digest of `text`
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate text for log output
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let prefix = char_prefix(text, max_chars);
    if prefix.len() == text.len() {
        text.to_string()
    } else {
        format!("{prefix}...")
    }
}
