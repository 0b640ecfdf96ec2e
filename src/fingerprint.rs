//! Canonical fingerprint text format.
//!
//! A fingerprint is the SHA-256 digest of a certificate's DER encoding,
//! displayed as lowercase hex byte pairs joined by colons. [`render`] and
//! [`to_digest`] are exact inverses for valid digests.

use crate::error::{KeyError, Result};

/// Digest length in bytes (SHA-256)
pub const DIGEST_LEN: usize = 32;

const GROUP_SEPARATOR: char = ':';

/// Render a raw digest in the canonical display form.
pub fn render(digest: &[u8]) -> Result<String> {
    if digest.len() != DIGEST_LEN {
        return Err(KeyError::InvalidEncoding(format!(
            "digest must be {DIGEST_LEN} bytes, got {}",
            digest.len()
        )));
    }
    let groups: Vec<String> = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(groups.join(&GROUP_SEPARATOR.to_string()))
}

/// Parse a bare hex-encoded digest into the canonical display form.
///
/// Accepts either case on input; the rendered form is always lowercase.
pub fn from_hex(hex_digest: &str) -> Result<String> {
    let bytes = hex::decode(hex_digest.trim())
        .map_err(|e| KeyError::InvalidEncoding(format!("not a hex digest: {e}")))?;
    render(&bytes)
}

/// Recover the raw digest from its canonical display form.
pub fn to_digest(display: &str) -> Result<Vec<u8>> {
    let mut digest = Vec::with_capacity(DIGEST_LEN);
    for group in display.split(GROUP_SEPARATOR) {
        if group.len() != 2 {
            return Err(KeyError::InvalidEncoding(format!(
                "malformed fingerprint group '{group}'"
            )));
        }
        let byte = hex::decode(group)
            .map_err(|e| KeyError::InvalidEncoding(format!("not a hex digest: {e}")))?;
        digest.extend_from_slice(&byte);
    }
    if digest.len() != DIGEST_LEN {
        return Err(KeyError::InvalidEncoding(format!(
            "digest must be {DIGEST_LEN} bytes, got {}",
            digest.len()
        )));
    }
    Ok(digest)
}
