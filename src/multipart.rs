//! Lenient multipart/form-data body parser
//!
//! Splits a fully buffered request body into named text fields and binary file
//! payloads. The parser never fails: parts it cannot make sense of are left out
//! of the field map and recorded in [`MultipartForm::skipped`], so the caller
//! decides whether an incomplete form is acceptable.
//!
//! All delimiter and header searches run on raw bytes. Only the header block of
//! each part is decoded to text (Latin-1, one byte per character); file payloads
//! are copied out verbatim and never decoded.
//!
//! # Example
//! ```rust
//! use phonebook::multipart::{self, FieldValue};
//!
//! let body = b"--XYZ\r\n\
//!     Content-Disposition: form-data; name=\"user\"\r\n\
//!     \r\n\
//!     Alice\r\n\
//!     --XYZ--\r\n";
//!
//! let form = multipart::parse(body, "XYZ");
//! assert_eq!(form.get("user"), Some(&FieldValue::Text("Alice".to_string())));
//! assert!(form.is_complete());
//! ```

use log::{debug, trace};
use std::collections::HashMap;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";
const NAME_TOKEN: &[u8] = b"name=\"";
const FILENAME_TOKEN: &[u8] = b"filename=\"";

/// Value of one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain field, decoded byte-for-byte as Latin-1
    Text(String),
    /// File attachment, raw bytes exactly as sent
    File(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&[u8]> {
        match self {
            FieldValue::File(bytes) => Some(bytes),
            FieldValue::Text(_) => None,
        }
    }

    /// Text value reinterpreted as UTF-8.
    ///
    /// Text fields are decoded one byte per character, so every character is
    /// at most U+00FF and maps back to the exact byte that was on the wire.
    /// Browsers submit form text as UTF-8; this recovers it (lossily for
    /// invalid sequences).
    pub fn text_utf8(&self) -> Option<String> {
        let text = self.as_text()?;
        let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Why a part did not make it into the field map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No CR LF CR LF before the next delimiter
    MissingHeaderTerminator,
    /// Header block has no `name="..."` parameter
    MissingFieldName,
}

/// A part that was dropped during parsing. `index` counts parts from zero in
/// body order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedPart {
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of parsing a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    fields: HashMap<String, FieldValue>,
    skipped: Vec<SkippedPart>,
}

impl MultipartForm {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Latin-1 text of a plain field; `None` for missing or file fields.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    /// UTF-8 text of a plain field; `None` for missing or file fields.
    pub fn text_utf8(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(FieldValue::text_utf8)
    }

    /// Raw bytes of a file field; `None` for missing or plain fields.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).and_then(FieldValue::as_file)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedPart] {
        &self.skipped
    }

    /// True when every part between delimiters produced a field.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn into_fields(self) -> HashMap<String, FieldValue> {
        self.fields
    }
}

/// Parse `body` using `boundary` (without the leading dashes).
///
/// Fewer than two delimiter occurrences yield an empty form. Repeated field
/// names keep the last value.
pub fn parse(body: &[u8], boundary: &str) -> MultipartForm {
    let mut form = MultipartForm::default();

    let mut delimiter = Vec::with_capacity(boundary.len() + 2);
    delimiter.extend_from_slice(b"--");
    delimiter.extend_from_slice(boundary.as_bytes());

    let positions = find_all(body, &delimiter);
    trace!(
        "Found {} delimiter occurrences in {} byte body",
        positions.len(),
        body.len()
    );
    if positions.len() < 2 {
        return form;
    }

    // The last delimiter opens the closing `--boundary--` line, never a part.
    for (index, pair) in positions.windows(2).enumerate() {
        let end = pair[1];
        let mut start = pair[0] + delimiter.len();

        if body[start..end].starts_with(CRLF) {
            start += CRLF.len();
        }

        let segment = &body[start..end];
        let Some(headers_len) = find_bytes_pattern(segment, HEADER_TERMINATOR) else {
            debug!("Skipping part {index}: headers not terminated");
            form.skipped.push(SkippedPart {
                index,
                reason: SkipReason::MissingHeaderTerminator,
            });
            continue;
        };

        let headers = &segment[..headers_len];
        let Some(field_name) = extract_field_name(headers) else {
            debug!("Skipping part {index}: no field name in headers");
            form.skipped.push(SkippedPart {
                index,
                reason: SkipReason::MissingFieldName,
            });
            continue;
        };

        let mut content = &segment[headers_len + HEADER_TERMINATOR.len()..];
        if content.ends_with(CRLF) {
            content = &content[..content.len() - CRLF.len()];
        }

        let value = if has_filename(headers) {
            debug!(
                "Found file for field: {field_name}, size: {} bytes",
                content.len()
            );
            FieldValue::File(content.to_vec())
        } else {
            trace!("Found text field: {field_name} ({} bytes)", content.len());
            FieldValue::Text(latin1_decode(content))
        };

        form.fields.insert(field_name, value);
    }

    form
}

/// Extract the boundary parameter from a `multipart/form-data` Content-Type.
///
/// Returns `None` for other media types or when no non-empty boundary is
/// present. The boundary keeps its original case; surrounding quotes are
/// stripped.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    params
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|boundary| !boundary.is_empty())
}

/// Start offsets of every non-overlapping occurrence of `needle`.
fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut offset = 0;
    while let Some(pos) = find_bytes_pattern(&haystack[offset..], needle) {
        positions.push(offset + pos);
        offset += pos + needle.len();
    }
    positions
}

/// Binary pattern search - find needle in haystack
fn find_bytes_pattern(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Value of the first `name="..."` parameter that is not the tail of a longer
/// parameter name such as `filename`.
fn extract_field_name(headers: &[u8]) -> Option<String> {
    let mut offset = 0;
    while let Some(pos) = find_bytes_pattern(&headers[offset..], NAME_TOKEN) {
        let token_start = offset + pos;
        let value_start = token_start + NAME_TOKEN.len();
        let at_boundary = token_start == 0 || !is_token_byte(headers[token_start - 1]);

        if at_boundary {
            let value_len = headers[value_start..].iter().position(|&b| b == b'"')?;
            return Some(latin1_decode(&headers[value_start..value_start + value_len]));
        }
        offset = value_start;
    }
    None
}

/// A part is a file when it declares `filename="..."` with a non-empty value.
fn has_filename(headers: &[u8]) -> bool {
    find_bytes_pattern(headers, FILENAME_TOKEN)
        .map(|pos| headers.get(pos + FILENAME_TOKEN.len()))
        .is_some_and(|next| next.is_some_and(|&b| b != b'"'))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
