//! Unguessable bearer tokens for sessions and email verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Raw entropy per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Encoded length of a token: 32 bytes in unpadded base64url.
const TOKEN_LEN: usize = 43;

/// Generate a URL-safe random token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns `true` if `raw` has the length and alphabet of an issued token.
#[must_use]
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == TOKEN_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
