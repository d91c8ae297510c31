//! ISO-8859-1 text handling for logs and tool output.
//!
//! Every byte maps to exactly one code point, so decoding never fails and
//! re-encoding text that was decoded here reproduces the original bytes.

#[must_use]
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Characters above U+00FF are written as `?`.
#[must_use]
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
        .collect()
}
