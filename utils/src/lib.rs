//! Leverage common functionality across parley crates.

use std::str::Utf8Error;

/// Converts bytes to a hexadecimal string.
pub fn hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes.iter() {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Converts a hexadecimal string to bytes.
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Decodes a buffer received from the wire as UTF-8 text.
///
/// Fixed-size read buffers may carry NUL padding, which is stripped before the
/// text is interpreted.
pub fn decode_text(bytes: &[u8]) -> Result<String, Utf8Error> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.replace('\0', ""))
}

/// Returns `true` if `text` contains nothing but whitespace or NUL padding.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '\0')
}
