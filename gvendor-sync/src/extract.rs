//! Byte/line-precise extraction and placement.
//!
//! Both sides are normalised (`\r\n` → `\n`) before any arithmetic; a lone
//! `\r` is left alone. Content is split on `\n`, so a trailing newline yields
//! a final empty line and an empty file is exactly one empty line.
//!
//! Placement output is always LF. A CRLF destination therefore has its line
//! endings converted once something is placed into it.

use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::position::{PositionError, PositionSpec};

/// How much of a file is scanned for NUL before a position operation.
pub const BINARY_SCAN_BYTES: usize = 8000;

/// Bytes selected by a position together with their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    /// `sha256:<hex>` of `text`.
    pub hash: String,
}

/// Replace every `\r\n` with `\n`.
pub fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

/// `sha256:<hex>` of the raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("sha256:{}", hex::encode(h.finalize()))
}

/// Line-ending-insensitive content hash used for lock and cache entries.
pub fn content_hash(bytes: &[u8]) -> String {
    sha256_hex(&normalize_line_endings(bytes))
}

/// NUL in the first [`BINARY_SCAN_BYTES`] bytes.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SCAN_BYTES)].contains(&0)
}

/// Extract the bytes `spec` selects from `content`.
pub fn extract(content: &[u8], spec: &PositionSpec) -> Result<Extracted, PositionError> {
    let text = prepare(content)?;
    let range = byte_range(&text, spec)?;
    let selected = text[range].to_string();
    let hash = sha256_hex(selected.as_bytes());
    Ok(Extracted {
        text: selected,
        hash,
    })
}

/// Splice `insert` into `dest` over the range `spec` selects, keeping every
/// byte outside that range.
pub fn place(dest: &[u8], insert: &str, spec: &PositionSpec) -> Result<String, PositionError> {
    let text = prepare(dest)?;
    let range = byte_range(&text, spec)?;
    let insert = insert.replace("\r\n", "\n");

    let mut out = String::with_capacity(text.len() - range.len() + insert.len());
    out.push_str(&text[..range.start]);
    out.push_str(&insert);
    out.push_str(&text[range.end..]);
    Ok(out)
}

/// Binary check, normalisation, UTF-8 validation.
fn prepare(content: &[u8]) -> Result<String, PositionError> {
    if is_binary(content) {
        return Err(PositionError::BinaryContent);
    }
    String::from_utf8(normalize_line_endings(content)).map_err(|_| PositionError::NotUtf8)
}

/// Resolve a spec to a byte range of normalised text.
///
/// An end column `n` is inclusive and 1-indexed, which is numerically the
/// exclusive upper bound of `[start_col - 1, n)`.
fn byte_range(text: &str, spec: &PositionSpec) -> Result<Range<usize>, PositionError> {
    spec.validate()?;

    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        lines.push((offset, line.len()));
        offset += line.len() + 1;
    }
    let total = lines.len();

    if spec.start_line > total {
        return Err(PositionError::LineOutOfRange {
            line: spec.start_line,
            total,
        });
    }
    let (first_start, first_len) = lines[spec.start_line - 1];
    let start = if spec.start_col == 0 {
        first_start
    } else {
        let col = spec.start_col - 1;
        if col > first_len {
            return Err(PositionError::ColumnOutOfRange {
                line: spec.start_line,
                col: spec.start_col,
                len: first_len,
            });
        }
        first_start + col
    };
    check_boundary(text, start, spec.start_line, spec.start_col)?;

    if spec.to_eof {
        return Ok(start..text.len());
    }

    let last = spec.last_line();
    if last > total {
        return Err(PositionError::LineOutOfRange { line: last, total });
    }
    let (last_start, last_len) = lines[last - 1];
    let end = if spec.end_col == 0 {
        last_start + last_len
    } else {
        if spec.end_col > last_len {
            return Err(PositionError::ColumnOutOfRange {
                line: last,
                col: spec.end_col,
                len: last_len,
            });
        }
        last_start + spec.end_col
    };
    check_boundary(text, end, last, spec.end_col)?;

    if end < start {
        return Err(PositionError::EndBeforeStart);
    }
    Ok(start..end)
}

fn check_boundary(text: &str, offset: usize, line: usize, col: usize) -> Result<(), PositionError> {
    if text.is_char_boundary(offset) {
        Ok(())
    } else {
        Err(PositionError::NotCharBoundary { line, col })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
