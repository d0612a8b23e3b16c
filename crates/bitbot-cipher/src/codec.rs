//! Line codec: `base64(xor(key)):base64(xor(value))`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::feature::TextEncoding;
use crate::{
    CipherError, CipherKey, FeatureMap, FeatureValue, BOOLEAN_FALSE_SENTINEL,
    BOOLEAN_TRUE_SENTINEL, BOOLEAN_TRUE_SENTINEL_ALT,
};

/// Result of decoding an asset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptReport {
    pub features: FeatureMap,
    /// Non-blank lines that could not be decoded.
    pub skipped: usize,
}

/// Decode an asset blob, discarding the malformed-line count.
pub fn decrypt(blob: &str, key: &CipherKey) -> Result<FeatureMap, CipherError> {
    decrypt_with_report(blob, key).map(|r| r.features)
}

/// Decode an asset blob.
///
/// Blank lines are ignored. A line is malformed when it has no `:`, when
/// either side is empty after trimming, or when either side is not valid
/// Base64; malformed lines are skipped and counted. Fails only when no
/// line decodes.
pub fn decrypt_with_report(blob: &str, key: &CipherKey) -> Result<DecryptReport, CipherError> {
    let mut features = FeatureMap::new();
    let mut skipped = 0;

    for (index, line) in blob.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line, key) {
            Some(line) => features.insert_decoded(
                line.name,
                line.name_encoding,
                line.value,
                line.value_encoding,
            ),
            None => {
                debug!(line = index + 1, "skipping malformed asset line");
                skipped += 1;
            }
        }
    }

    if features.is_empty() {
        return Err(CipherError::DecryptionFailed { skipped });
    }

    Ok(DecryptReport { features, skipped })
}

/// Encode a feature map as an asset blob, one line per entry.
///
/// Empty maps, empty names and empty text values are rejected: each would
/// produce a line that [`decrypt`] reads as malformed.
pub fn encrypt(features: &FeatureMap, key: &CipherKey) -> Result<String, CipherError> {
    if features.is_empty() {
        return Err(CipherError::InvalidEncoding(
            "no features to encode".to_string(),
        ));
    }

    let mut lines = Vec::with_capacity(features.len());
    for entry in features.entries() {
        if entry.name.is_empty() {
            return Err(CipherError::InvalidEncoding(
                "feature name must not be empty".to_string(),
            ));
        }
        let plain = match &entry.value {
            FeatureValue::Bool(true) => BOOLEAN_TRUE_SENTINEL.as_bytes().to_vec(),
            FeatureValue::Bool(false) => BOOLEAN_FALSE_SENTINEL.as_bytes().to_vec(),
            FeatureValue::Text(text) if text.is_empty() => {
                return Err(CipherError::InvalidEncoding(format!(
                    "feature {:?} has an empty value",
                    entry.name
                )))
            }
            FeatureValue::Text(text) => entry.value_encoding.encode(text),
        };
        lines.push(format!(
            "{}:{}",
            xor_encode(&entry.name_encoding.encode(&entry.name), key),
            xor_encode(&plain, key)
        ));
    }
    Ok(lines.join("\n"))
}

struct DecodedLine {
    name: String,
    name_encoding: TextEncoding,
    value: FeatureValue,
    value_encoding: TextEncoding,
}

fn decode_line(line: &str, key: &CipherKey) -> Option<DecodedLine> {
    let (raw_name, raw_value) = line.split_once(':')?;
    let (raw_name, raw_value) = (raw_name.trim(), raw_value.trim());
    if raw_name.is_empty() || raw_value.is_empty() {
        return None;
    }

    let (name, name_encoding) = xor_decode(raw_name, key)?;
    let (text, value_encoding) = xor_decode(raw_value, key)?;
    let value = match text.as_str() {
        BOOLEAN_TRUE_SENTINEL | BOOLEAN_TRUE_SENTINEL_ALT => FeatureValue::Bool(true),
        BOOLEAN_FALSE_SENTINEL => FeatureValue::Bool(false),
        _ => FeatureValue::Text(text),
    };
    Some(DecodedLine {
        name,
        name_encoding,
        value,
        value_encoding,
    })
}

fn xor_in_place(bytes: &mut [u8], key: &CipherKey) {
    let key = key.as_bytes();
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= key[i % key.len()];
    }
}

fn xor_encode(plain: &[u8], key: &CipherKey) -> String {
    let mut bytes = plain.to_vec();
    xor_in_place(&mut bytes, key);
    STANDARD.encode(bytes)
}

fn xor_decode(encoded: &str, key: &CipherKey) -> Option<(String, TextEncoding)> {
    let mut bytes = STANDARD.decode(encoded).ok()?;
    xor_in_place(&mut bytes, key);
    Some(TextEncoding::decode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{obfuscate_key, DEFAULT_CIPHER_KEY};

    fn key() -> CipherKey {
        obfuscate_key(DEFAULT_CIPHER_KEY).unwrap()
    }

    fn sample() -> FeatureMap {
        [
            ("NoAds", FeatureValue::Bool(false)),
            ("Unlocked", FeatureValue::Bool(true)),
            ("Currency", FeatureValue::Text("1000".to_string())),
            ("Greeting", FeatureValue::Text("héllo wörld".to_string())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_round_trip() {
        let map = sample();
        let blob = encrypt(&map, &key()).unwrap();
        assert_eq!(decrypt(&blob, &key()).unwrap(), map);
    }

    #[test]
    fn test_encrypt_rejects_empty_text_value() {
        let map: FeatureMap = [("k", FeatureValue::Text(String::new()))]
            .into_iter()
            .collect();
        assert!(matches!(
            encrypt(&map, &key()),
            Err(CipherError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_encrypt_rejects_empty_map() {
        assert!(encrypt(&FeatureMap::new(), &key()).is_err());
    }

    #[test]
    fn test_booleans_are_stored_as_sentinels() {
        let map: FeatureMap = [("Flag", FeatureValue::Bool(true))].into_iter().collect();
        let blob = encrypt(&map, &key()).unwrap();
        let (_, value) = blob.split_once(':').unwrap();
        assert_eq!(xor_decode(value, &key()).unwrap().0, BOOLEAN_TRUE_SENTINEL);
    }

    #[test]
    fn test_alternate_true_sentinel_decodes_as_true() {
        let line = format!(
            "{}:{}",
            xor_encode(b"Flag", &key()),
            xor_encode(BOOLEAN_TRUE_SENTINEL_ALT.as_bytes(), &key())
        );
        let map = decrypt(&line, &key()).unwrap();
        assert_eq!(map.get("Flag"), Some(&FeatureValue::Bool(true)));
    }

    #[test]
    fn test_unknown_sentinel_passes_through_as_text() {
        let blob_value = "AAEAAAD/////AQAAAAAAAAAEAQAAAA5TeXN0ZW0uSW50MzI=";
        let line = format!(
            "{}:{}",
            xor_encode(b"Level", &key()),
            xor_encode(blob_value.as_bytes(), &key())
        );
        let map = decrypt(&line, &key()).unwrap();
        assert_eq!(
            map.get("Level"),
            Some(&FeatureValue::Text(blob_value.to_string()))
        );
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let valid: FeatureMap = [("NoAds", FeatureValue::Bool(false))].into_iter().collect();
        let blob = format!("{}\nthis line has no colon\n", encrypt(&valid, &key()).unwrap());

        let report = decrypt_with_report(&blob, &key()).unwrap();
        assert_eq!(report.features.len(), 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_invalid_base64_is_skipped() {
        let valid: FeatureMap = [("A", FeatureValue::Bool(true))].into_iter().collect();
        let blob = format!("{}\n!!!:???", encrypt(&valid, &key()).unwrap());

        let report = decrypt_with_report(&blob, &key()).unwrap();
        assert_eq!(report.features.len(), 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_all_malformed_fails() {
        let err = decrypt("no colon here\n:\nleft-only:", &key()).unwrap_err();
        assert_eq!(err, CipherError::DecryptionFailed { skipped: 3 });
    }

    #[test]
    fn test_empty_blob_fails() {
        let err = decrypt("\n\n   \n", &key()).unwrap_err();
        assert_eq!(err, CipherError::DecryptionFailed { skipped: 0 });
    }

    #[test]
    fn test_whitespace_around_parts_is_trimmed() {
        let map: FeatureMap = [("X", FeatureValue::Bool(false))].into_iter().collect();
        let blob = encrypt(&map, &key()).unwrap().replace(':', " : ");
        assert_eq!(decrypt(&blob, &key()).unwrap(), map);
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let first: FeatureMap = [("Dup", FeatureValue::Bool(false))].into_iter().collect();
        let second: FeatureMap = [("Dup", FeatureValue::Bool(true))].into_iter().collect();
        let blob = format!(
            "{}\n{}",
            encrypt(&first, &key()).unwrap(),
            encrypt(&second, &key()).unwrap()
        );
        let map = decrypt(&blob, &key()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Dup"), Some(&FeatureValue::Bool(true)));
    }

    #[test]
    fn test_non_utf8_value_survives_reencoding() {
        // 0xE9 alone is not valid UTF-8.
        let line = format!(
            "{}:{}",
            xor_encode(b"Greeting", &key()),
            xor_encode(&[b'c', b'a', b'f', 0xE9], &key())
        );
        let map = decrypt(&line, &key()).unwrap();
        assert_eq!(
            map.get("Greeting"),
            Some(&FeatureValue::Text("café".to_string()))
        );
        assert_eq!(encrypt(&map, &key()).unwrap(), line);
    }

    #[test]
    fn test_encrypt_rejects_empty_name() {
        let map: FeatureMap = [("", FeatureValue::Bool(true))].into_iter().collect();
        assert!(matches!(
            encrypt(&map, &key()),
            Err(CipherError::InvalidEncoding(_))
        ));
    }
}
