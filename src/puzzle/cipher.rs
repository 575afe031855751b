// puzzle/cipher.rs - Encodings used by the puzzle artifacts
//
// Base64 flavours (standard for the user hash, url-safe for JWT segments),
// the letter-only Caesar shift and the repeating-key XOR used in step 5.

use base64::{engine::general_purpose, Engine as _};

/// Standard (padded) Base64, as produced by a browser's `btoa`
pub fn base64_standard(input: &str) -> String {
    general_purpose::STANDARD.encode(input.as_bytes())
}

/// Unpadded url-safe Base64, the JWT segment encoding
pub fn base64_url(input: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(input)
}

/// Decode a JWT segment. Padding and the standard alphabet are tolerated
/// because students often build tokens with `btoa`.
pub fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim().trim_end_matches('=');
    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    general_purpose::URL_SAFE_NO_PAD.decode(normalized.as_bytes()).ok()
}

/// Shift ASCII letters forward by `shift`, preserving case. Everything else
/// passes through.
pub fn caesar_encrypt(plaintext: &str, shift: u8) -> String {
    plaintext.chars().map(|c| shift_char(c, shift % 26)).collect()
}

pub fn caesar_decrypt(ciphertext: &str, shift: u8) -> String {
    caesar_encrypt(ciphertext, 26 - (shift % 26))
}

fn shift_char(c: char, shift: u8) -> char {
    let base = match c {
        'a'..='z' => b'a',
        'A'..='Z' => b'A',
        _ => return c,
    };
    (((c as u8 - base + shift) % 26) + base) as char
}

/// XOR with a repeating key; an empty key leaves the input unchanged
pub fn xor_bytes(input: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return input.to_vec();
    }
    input
        .iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

pub fn xor_encrypt_hex(plaintext: &str, key: &str) -> String {
    hex::encode(xor_bytes(plaintext.as_bytes(), key.as_bytes()))
}

/// Reverse of [`xor_encrypt_hex`]; `None` for bad hex or non-UTF-8 output
pub fn xor_decrypt_hex(ciphertext_hex: &str, key: &str) -> Option<String> {
    let bytes = hex::decode(ciphertext_hex.trim()).ok()?;
    String::from_utf8(xor_bytes(&bytes, key.as_bytes())).ok()
}
