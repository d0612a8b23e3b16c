//! Codec for obfuscated feature-flag asset files.
//!
//! An asset file is a sequence of `encodedKey:encodedValue` lines. Both sides
//! are Base64 of the plaintext XOR'd against a repeating key derived from a
//! fixed source string. Boolean values are stored as serialized .NET boolean
//! blobs rather than as literal text.
//!
//! The crate is pure: it never touches the filesystem or the network.

mod codec;
mod error;
mod feature;
mod key;

pub use codec::{decrypt, decrypt_with_report, encrypt, DecryptReport};
pub use error::CipherError;
pub use feature::{unlock_features, FeatureMap, FeatureValue};
pub use key::{obfuscate_key, CipherKey, DEFAULT_CIPHER_KEY};

/// Base64 of the serialized .NET boolean `true`.
pub const BOOLEAN_TRUE_SENTINEL: &str =
    "AAEAAAD/////AQAAAAAAAAAEAQAAAA5TeXN0ZW0uQm9vbGVhbgEAAAAHbV92YWx1ZQABAQs=";

/// Alternate serialization of `true` seen in older asset files.
///
/// Accepted on decode, never produced on encode.
pub const BOOLEAN_TRUE_SENTINEL_ALT: &str =
    "AAEAAAD/////AQAAAAAAAAAEAQAAAA5TeXN0ZW0uQm9vbGVhbgEAAAAHbV92YWx1ZQABAAs=";

/// Base64 of the serialized .NET boolean `false`.
pub const BOOLEAN_FALSE_SENTINEL: &str =
    "AAEAAAD/////AQAAAAAAAAAEAQAAAA5TeXN0ZW0uQm9vbGVhbgEAAAAHbV92YWx1ZQABAAw=";

/// Decrypt, unlock and re-encrypt an asset blob in one step.
///
/// Returns the patched blob and the number of `false` flags that were flipped.
pub fn patch_blob(blob: &str, key: &CipherKey) -> Result<(String, usize), CipherError> {
    let report = decrypt_with_report(blob, key)?;
    let flipped = report.features.count_false();
    let unlocked = unlock_features(&report.features);
    let encoded = encrypt(&unlocked, key)?;
    Ok((encoded, flipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_patch_blob_flips_false_flags() {
        let key = obfuscate_key(DEFAULT_CIPHER_KEY).unwrap();
        let mut map = FeatureMap::new();
        map.insert("NoAds", FeatureValue::Bool(false));
        map.insert("GodMode", FeatureValue::Bool(false));
        map.insert("Coins", FeatureValue::Text("100".to_string()));
        let blob = encrypt(&map, &key).unwrap();

        let (patched, flipped) = patch_blob(&blob, &key).unwrap();
        assert_eq!(flipped, 2);

        let decoded = decrypt(&patched, &key).unwrap();
        assert_eq!(decoded.get("NoAds"), Some(&FeatureValue::Bool(true)));
        assert_eq!(decoded.get("GodMode"), Some(&FeatureValue::Bool(true)));
        assert_eq!(
            decoded.get("Coins"),
            Some(&FeatureValue::Text("100".to_string()))
        );
    }

    #[test]
    fn test_patch_blob_keeps_untouched_lines_byte_identical() {
        let key = obfuscate_key(DEFAULT_CIPHER_KEY).unwrap();
        let mut map = FeatureMap::new();
        map.insert("NoAds", FeatureValue::Bool(false));
        let flag_line = encrypt(&map, &key).unwrap();

        // A Latin-1 value line, written the way the game writes it.
        let mut bytes = vec![b'c', b'a', b'f', 0xE9];
        let key_bytes = key.as_bytes();
        for (i, b) in bytes.iter_mut().enumerate() {
            *b ^= key_bytes[i % key_bytes.len()];
        }
        let mut name = b"Greeting".to_vec();
        for (i, b) in name.iter_mut().enumerate() {
            *b ^= key_bytes[i % key_bytes.len()];
        }
        let engine = base64::engine::general_purpose::STANDARD;
        let text_line = format!("{}:{}", engine.encode(&name), engine.encode(&bytes));

        let blob = format!("{}\n{}", flag_line, text_line);
        let (patched, flipped) = patch_blob(&blob, &key).unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(patched.lines().nth(1), Some(text_line.as_str()));
    }

    #[test]
    fn test_patch_blob_rejects_garbage() {
        let key = obfuscate_key(DEFAULT_CIPHER_KEY).unwrap();
        let result = patch_blob("not an asset file", &key);
        assert!(matches!(result, Err(CipherError::DecryptionFailed { .. })));
    }
}
