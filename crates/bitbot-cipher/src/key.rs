//! Cipher key derivation.

use crate::CipherError;

/// Source string the asset key is derived from.
pub const DEFAULT_CIPHER_KEY: &str = "com.wtfapps.apollo16";

/// Substitution for `a..=z`, indexed by `letter - b'a'`.
const SUBSTITUTION: [u8; 26] = *b"zmylxkwjviuhtgsfreqdpcobna";

/// A derived XOR key. Always non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey(String);

impl CipherKey {
    /// Derive a key from its source string.
    pub fn derive(raw: &str) -> Result<Self, CipherError> {
        obfuscate_key(raw)
    }

    /// Key bytes used for the repeating XOR.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The derived key as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CipherKey").field(&"[REDACTED]").finish()
    }
}

/// Lowercase `raw` and substitute every a-z character.
///
/// Fails with [`CipherError::InvalidKey`] when the substitution would leave
/// the key unchanged, which happens exactly when it has no a-z characters.
pub fn obfuscate_key(raw: &str) -> Result<CipherKey, CipherError> {
    let lowered = raw.to_lowercase();
    let substituted: String = lowered.chars().map(substitute).collect();

    if substituted == lowered {
        return Err(CipherError::InvalidKey(raw.to_string()));
    }

    Ok(CipherKey(substituted))
}

fn substitute(c: char) -> char {
    if c.is_ascii_lowercase() {
        SUBSTITUTION[(c as u8 - b'a') as usize] as char
    } else {
        c
    }
}
