//! FT8 alphabet filtering, message fragmentation and payload reassembly.

use crate::{END_OF_MESSAGE, FIRST_PAYLOAD, MAX_MESSAGE_LEN, SLOT_SIZE};

/// True for characters in the FT8 free-text alphabet:
/// `A-Z`, `0-9`, space, `+`, `-`, `.`, `/`, `?`.
pub fn is_valid_char(c: char) -> bool {
    c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || matches!(c, ' ' | '+' | '-' | '.' | '/' | '?')
}

/// Upper-case `text`, drop every character outside the FT8 alphabet and
/// truncate the result to `max_len` characters. Order-preserving and
/// idempotent on already-clean input.
pub fn filter_text(text: &str, max_len: usize) -> String {
    let mut result = String::new();
    for c in text.to_uppercase().chars() {
        if result.len() >= max_len {
            break;
        }
        if is_valid_char(c) {
            result.push(c);
        }
    }
    result
}

/// Normalize a station identifier to exactly two characters: truncate long
/// input, left-pad short input with `0`.
pub fn normalize_id(id: &str) -> String {
    let truncated: String = id.chars().take(2).collect();
    format!("{truncated:0>2}")
}

/// Slice a message into transmit slots. The first slot carries the routing
/// header `sender ++ target ++ " "` and up to 8 payload characters; every
/// following slot is up to 13 characters of raw payload. Returns an empty
/// list when nothing survives filtering.
pub fn fragment_message(sender: &str, target: &str, text: &str) -> Vec<String> {
    let clean = filter_text(text, MAX_MESSAGE_LEN);
    if clean.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut pos = 0;
    let mut first = true;
    while pos < clean.len() {
        let payload_size = if first { FIRST_PAYLOAD } else { SLOT_SIZE };
        let end = (pos + payload_size).min(clean.len());
        if first {
            result.push(format!("{sender}{target} {}", &clean[pos..end]));
            first = false;
        } else {
            result.push(clean[pos..end].to_string());
        }
        pos = end;
    }
    result
}

/// Like [`fragment_message`] but terminates the last slot with the `/AR`
/// end-of-message sigil. The sigil always sits at the very end of a full
/// 13-character slot so it survives FT8 trailing-space trimming: a short
/// final slot is space-padded to 10 characters before the sigil, a full one
/// gets a dedicated `"          /AR"` slot appended.
pub fn fragment_broadcast(sender: &str, target: &str, text: &str) -> Vec<String> {
    let mut result = fragment_message(sender, target, text);
    if let Some(last) = result.last_mut() {
        if last.len() + END_OF_MESSAGE.len() <= SLOT_SIZE {
            *last = format!(
                "{:<width$}{}",
                last,
                END_OF_MESSAGE,
                width = SLOT_SIZE - END_OF_MESSAGE.len()
            );
        } else {
            result.push(format!("{:>width$}", END_OF_MESSAGE, width = SLOT_SIZE));
        }
    }
    result
}

/// Reassemble received payloads into one message. FT8 trims trailing spaces
/// from each decode, so a single space is inserted between two adjacent
/// payloads when neither side already carries one.
pub fn join_payloads(payloads: &[String]) -> String {
    let mut full = String::new();
    for payload in payloads {
        if !full.is_empty() && !full.ends_with(' ') && !payload.starts_with(' ') {
            full.push(' ');
        }
        full.push_str(payload);
    }
    full.trim().to_string()
}
