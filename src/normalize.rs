//! Canonical tokens for fingerprint input.
//!
//! Null-like values collapse aggressively to [`NULL_TOKEN`]; everything else is
//! only trimmed. Case and inner whitespace survive untouched. Both the dimension
//! and the fact pipelines hash these tokens, so changing anything here changes
//! every fingerprint ever derived.

use std::borrow::Cow;

/// Literal sentinel emitted for every semantically null value.
pub const NULL_TOKEN: &str = "NULL";

/// Markers treated as null after trimming. Matched case-sensitively.
pub const NULL_MARKERS: &[&str] = &["nan", "NaN", "NaT", "None"];

pub fn normalize(value: Option<&str>) -> Cow<'_, str> {
    match value {
        None => Cow::Borrowed(NULL_TOKEN),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
                Cow::Borrowed(NULL_TOKEN)
            } else {
                Cow::Borrowed(trimmed)
            }
        }
    }
}

pub fn is_null(value: Option<&str>) -> bool {
    normalize(value) == NULL_TOKEN
}

/// Canonical token mapped back to an optional owned value.
pub fn non_null(value: Option<&str>) -> Option<String> {
    match normalize(value) {
        Cow::Borrowed(NULL_TOKEN) => None,
        token => Some(token.into_owned()),
    }
}
