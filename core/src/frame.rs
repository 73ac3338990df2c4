//! Classification of incoming free-text frames.
//!
//! Everything here is pure: a frame either starts with a routing header
//! (`"XXYY "` — sender and target station IDs), ends with the `/AR`
//! broadcast terminator, or is plain continuation payload.

use crate::{END_OF_MESSAGE, HEADER_SIZE};

/// True iff `text` starts with a routing header: four ASCII digits followed
/// by a space.
pub fn is_header(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= HEADER_SIZE
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b' '
}

/// Sender ID (characters 0-1) of a header frame.
pub fn header_sender(text: &str) -> Option<&str> {
    is_header(text).then(|| &text[..2])
}

/// Target ID (characters 2-3) of a header frame.
pub fn header_target(text: &str) -> Option<&str> {
    is_header(text).then(|| &text[2..4])
}

/// Payload (everything after the header) of a header frame.
pub fn header_payload(text: &str) -> Option<&str> {
    is_header(text).then(|| &text[HEADER_SIZE..])
}

/// True iff the trimmed text ends with the `/AR` end-of-message sigil.
pub fn ends_with_ar(text: &str) -> bool {
    text.trim().ends_with(END_OF_MESSAGE)
}

/// Trim, drop a trailing `/AR`, trim again.
pub fn strip_ar(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.strip_suffix(END_OF_MESSAGE) {
        Some(rest) => rest.trim().to_string(),
        None => trimmed.to_string(),
    }
}
