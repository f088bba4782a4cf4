//! Additive stream cipher over Unicode scalar values.
//!
//! Every character is shifted by the sum of the key's characters. Shifting is
//! performed in the contiguous space of scalar values with the surrogate range
//! removed, so any `&str` encrypts to a valid `String` and decryption inverts it
//! exactly.
//!
//! # Warning
//!
//! The whole key collapses to a single shift, so this cipher is trivially
//! breakable. It exists to exercise the key exchange and framing layers.

use crate::Cipher;

/// First surrogate code point.
const SURROGATE_START: u32 = 0xD800;

/// Number of surrogate code points.
const SURROGATE_LEN: u32 = 0x800;

/// Number of Unicode scalar values.
const SPACE: u32 = 0x11_0000 - SURROGATE_LEN;

fn to_index(c: char) -> u32 {
    let c = c as u32;
    if c < SURROGATE_START {
        c
    } else {
        c - SURROGATE_LEN
    }
}

fn to_char(index: u32) -> char {
    let value = if index < SURROGATE_START {
        index
    } else {
        index + SURROGATE_LEN
    };
    char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Reduces `key` to the shift applied to every character.
fn shift(key: &str) -> u32 {
    let sum = key
        .chars()
        .fold(0u64, |sum, c| (sum + to_index(c) as u64) % SPACE as u64);
    sum as u32
}

/// See the [module](self) documentation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Additive;

impl Cipher for Additive {
    fn encrypt(&self, plaintext: &str, key: &str) -> String {
        let shift = shift(key);
        plaintext
            .chars()
            .map(|c| to_char((to_index(c) + shift) % SPACE))
            .collect()
    }

    fn decrypt(&self, ciphertext: &str, key: &str) -> String {
        let shift = shift(key);
        ciphertext
            .chars()
            .map(|c| to_char((to_index(c) + SPACE - shift) % SPACE))
            .collect()
    }
}
