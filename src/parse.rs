//! Defensive parsing of loosely-typed table cells.
//!
//! Association tables and inventory rows arrive as strings that must be
//! parsed without ever failing the surrounding scan. Helpers here return a
//! tagged [`Parsed`] so tests can tell "legitimately zero" apart from
//! "failed to parse"; production callers read `.value` and move on.

use regex::Regex;
use std::sync::LazyLock;

/// Matches the identifier embedded in an association-table cell, e.g.
/// `\\HOST\root\cimv2:Win32_DiskDrive.DeviceID="\\\\.\\PHYSICALDRIVE0"`.
static DEVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\.DeviceID="(.*)"$"#).expect("valid regex"));

/// Matches a volume identifier (UUID) embedded in a resolver result such as
/// `\\?\Volume{12345678-9abc-def0-1234-56789abcdef0}\`.
static VOLUME_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});

/// A parse result carrying whether the default/fallback was applied.
///
/// Production behavior treats both cases identically; the flag exists so
/// tests can assert that a zero or empty value came from real input rather
/// than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    /// The parsed value, or the default/fallback when parsing failed.
    pub value: T,
    /// True when the value is a default or fallback, not parsed input.
    pub defaulted: bool,
}

impl<T> Parsed<T> {
    /// A successfully parsed value.
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    /// A default or fallback applied after a parse failure.
    pub fn fallback(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// Extract the identifier from an association-table cell.
///
/// Cells carry the form `<ClassPath>.DeviceID="<value>"`. The value is
/// returned with doubled path separators collapsed to single ones, since
/// the instrumentation service escapes backslashes in association cells.
/// Returns `None` when the cell does not match; callers skip such rows
/// without logging, association churn makes them transient and expected.
pub fn extract_device_id(cell: &str) -> Option<String> {
    let captures = DEVICE_ID.captures(cell)?;
    Some(captures[1].replace(r"\\", r"\"))
}

/// Parse an unsigned integer from a table cell, defaulting to zero.
pub fn parse_u64_or_default(input: &str) -> Parsed<u64> {
    match input.trim().parse::<u64>() {
        Ok(value) => Parsed::parsed(value),
        Err(_) => Parsed::fallback(0),
    }
}

/// Decode a hex-encoded string to its character form.
///
/// Most vendors store disk serial numbers as hex strings ("31323334" is
/// "1234"). Any malformation (odd length, non-hex digit, non-UTF-8 result)
/// falls back to the raw input string unchanged.
pub fn hex_string_to_string(input: &str) -> Parsed<String> {
    let trimmed = input.trim();
    if trimmed.len() % 2 != 0 {
        return Parsed::fallback(input.to_string());
    }

    let mut bytes = Vec::with_capacity(trimmed.len() / 2);
    for chunk in trimmed.as_bytes().chunks(2) {
        let Ok(pair) = std::str::from_utf8(chunk) else {
            return Parsed::fallback(input.to_string());
        };
        let Ok(byte) = u8::from_str_radix(pair, 16) else {
            return Parsed::fallback(input.to_string());
        };
        bytes.push(byte);
    }

    match String::from_utf8(bytes) {
        Ok(decoded) => Parsed::parsed(decoded),
        Err(_) => Parsed::fallback(input.to_string()),
    }
}

/// Extract a well-formed volume identifier from a resolver result.
///
/// Returns the first UUID-shaped substring, lowercased. Malformed or empty
/// input yields an empty identifier; an unmounted partition is valid and
/// expected.
pub fn extract_volume_id(input: &str) -> Parsed<String> {
    match VOLUME_ID.find(input) {
        Some(found) => Parsed::parsed(found.as_str().to_lowercase()),
        None => Parsed::fallback(String::new()),
    }
}
