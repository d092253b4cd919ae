//! Cache policy: is a local file already correctly represented remotely?
//!
//! A file is skipped when the remote object records the same content type
//! and the same MD5 digest as the local bytes.

use std::path::Path;

use md5::{Digest, Md5};

use crate::traits::ObjectMeta;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Whether the upload of `content` can be skipped
pub fn should_skip(remote: Option<&ObjectMeta>, content: &[u8], content_type: &str) -> bool {
    match remote {
        Some(meta) => {
            meta.content_type == content_type
                && meta.content_hash.eq_ignore_ascii_case(&content_md5(content))
        }
        None => false,
    }
}

/// Hex MD5 digest of `data`
pub fn content_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Content type of a local file
///
/// Uses the file extension when there is one, otherwise sniffs the leading
/// bytes. Textual types carry an explicit UTF-8 charset.
pub fn detect_content_type(path: &Path, data: &[u8]) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => match mime_guess::from_ext(ext).first_raw() {
            Some(mime) if mime.starts_with("text/") => format!("{mime}; charset=utf-8"),
            Some(mime) => mime.to_string(),
            None => OCTET_STREAM.to_string(),
        },
        _ => sniff_content_type(data).to_string(),
    }
}

/// Signature checks on at most the first 512 bytes
fn sniff_content_type(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(512)];

    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
        (b"wOF2", "font/woff2"),
        (b"wOFF", "font/woff"),
    ];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| head.starts_with(sig)) {
        return *mime;
    }

    let trimmed = head.trim_ascii_start();
    let lower = String::from_utf8_lossy(&trimmed[..trimmed.len().min(16)]).to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return TEXT_HTML;
    }

    if is_text(head) {
        TEXT_PLAIN
    } else {
        OCTET_STREAM
    }
}

/// Valid UTF-8 (allowing a code point cut at the sniff window) with no
/// binary control bytes
fn is_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };

    valid
        && !head
            .iter()
            .any(|&b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f))
}
