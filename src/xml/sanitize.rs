//! Characters allowed in the XML document
//!
//! Rust strings cannot hold lone surrogates, so only control characters
//! and the U+FFFE / U+FFFF non-characters need filtering.

use std::borrow::Cow;

use tracing::warn;

/// Whether `c` may appear in an XML 1.0 document
pub fn is_valid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Raw byte that can never be part of valid document text
pub fn is_invalid_control_byte(b: u8) -> bool {
    b < 0x20 && !matches!(b, 0x09 | 0x0A | 0x0D)
}

/// Drop invalid characters, logging one warning per removed run
pub fn strip_invalid_xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_valid_xml_char) {
        return Cow::Borrowed(text);
    }

    let mut result = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if is_valid_xml_char(c) {
            result.push(c);
            in_run = false;
        } else {
            if !in_run {
                warn!("stripping invalid XML character U+{:04X}", c as u32);
            }
            in_run = true;
        }
    }
    Cow::Owned(result)
}
