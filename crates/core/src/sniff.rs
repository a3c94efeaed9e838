//! Content-type detection from the leading bytes of a file.

/// Number of leading bytes inspected.
pub const SNIFF_WINDOW: usize = 512;

/// Type reported when nothing more specific is recognized.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Binary signatures, checked in order against the start of the data.
const MAGIC: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\r\n\x1A\n", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"PK\x03\x04", "application/zip"),
    (b"PK\x05\x06", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xFD7zXZ\x00", "application/x-xz"),
    (b"\x28\xB5\x2F\xFD", "application/zstd"),
    (b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (b"Rar!\x1A\x07", "application/x-rar-compressed"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"\x00asm", "application/wasm"),
    (b"\x7FELF", "application/x-executable"),
];

/// Guess the MIME type of a file from its first bytes.
///
/// Only the first [`SNIFF_WINDOW`] bytes are considered. Short inputs still
/// yield a best-effort guess; empty input yields [`DEFAULT_CONTENT_TYPE`].
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_WINDOW)];
    if data.is_empty() {
        return DEFAULT_CONTENT_TYPE;
    }

    if let Some(mime) = MAGIC
        .iter()
        .find(|(sig, _)| data.starts_with(sig))
        .map(|(_, mime)| *mime)
    {
        return mime;
    }

    // RIFF containers carry the real type at offset 8.
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        match &data[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            b"AVI " => return "video/avi",
            _ => {}
        }
    }

    // ISO base media: "ftyp" box at offset 4.
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return "video/mp4";
    }

    let text = trim_leading_whitespace(strip_bom(data));
    if let Some(mime) = sniff_markup(text) {
        return mime;
    }

    if looks_like_text(data) {
        return "text/plain; charset=utf-8";
    }

    DEFAULT_CONTENT_TYPE
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C'))
        .unwrap_or(data.len());
    &data[start..]
}

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    const HTML_TAGS: &[&[u8]] = &[
        b"<!doctype html",
        b"<html",
        b"<head",
        b"<body",
        b"<script",
        b"<iframe",
        b"<title",
        b"<table",
        b"<div",
        b"<p",
        b"<!--",
    ];

    if starts_with_ignore_case(data, b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    if starts_with_ignore_case(data, b"<svg") {
        return Some("image/svg+xml");
    }

    HTML_TAGS
        .iter()
        .find(|tag| {
            starts_with_ignore_case(data, tag)
                && data
                    .get(tag.len())
                    .is_some_and(|b| matches!(b, b' ' | b'>' | b'\n' | b'\t' | b'\r'))
        })
        .map(|_| "text/html; charset=utf-8")
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn looks_like_text(data: &[u8]) -> bool {
    // A multibyte sequence cut by the window end still counts as text.
    let valid = match std::str::from_utf8(data) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid
        && !data
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | b'\x0C' | b'\x1B'))
}
