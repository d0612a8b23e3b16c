//! Decoded feature flags.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::CipherError;

/// A decoded feature value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Text(String),
}

impl FeatureValue {
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Bool(false))
    }
}

/// How a decoded string maps back to bytes.
///
/// Asset files are mostly UTF-8, but some carry bytes that are not; those
/// are read as Latin-1 and written back the same way so they survive a
/// decode and re-encode unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Decode bytes, preferring UTF-8.
    pub(crate) fn decode(bytes: Vec<u8>) -> (String, Self) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, Self::Utf8),
            Err(err) => (
                err.into_bytes().into_iter().map(char::from).collect(),
                Self::Latin1,
            ),
        }
    }

    /// Bytes for `text`. Latin-1 text only ever holds chars below U+0100.
    pub(crate) fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 => text.chars().map(|c| c as u32 as u8).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) name: String,
    pub(crate) value: FeatureValue,
    pub(crate) name_encoding: TextEncoding,
    pub(crate) value_encoding: TextEncoding,
}

/// Feature name to value, in file order.
///
/// Inserting an existing name replaces its value and keeps its position, so
/// a file with a repeated key decodes to the last value seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMap {
    entries: Vec<Entry>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.insert_decoded(name.into(), TextEncoding::Utf8, value, TextEncoding::Utf8);
    }

    /// Insert an entry read from an asset file, remembering how each side
    /// was decoded.
    pub(crate) fn insert_decoded(
        &mut self,
        name: String,
        name_encoding: TextEncoding,
        value: FeatureValue,
        value_encoding: TextEncoding,
    ) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.value_encoding = value_encoding;
            }
            None => self.entries.push(Entry {
                name,
                value,
                name_encoding,
                value_encoding,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries that are boolean `false`.
    pub fn count_false(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_false()).count()
    }

    /// Build a map from a JSON object of strings and booleans.
    ///
    /// Numbers, nulls, arrays and nested objects are rejected rather than
    /// coerced, since the asset format has no representation for them.
    pub fn from_json(value: &Value) -> Result<Self, CipherError> {
        let object = value.as_object().ok_or_else(|| {
            CipherError::InvalidEncoding(format!(
                "expected a JSON object, found {}",
                json_type_name(value)
            ))
        })?;

        let mut map = Self::new();
        for (name, v) in object {
            let feature = match v {
                Value::Bool(b) => FeatureValue::Bool(*b),
                Value::String(s) => FeatureValue::Text(s.clone()),
                other => {
                    return Err(CipherError::UnsupportedValueType {
                        feature: name.clone(),
                        found: json_type_name(other).to_string(),
                    })
                }
            };
            map.insert(name.clone(), feature);
        }
        Ok(map)
    }
}

impl Serialize for FeatureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.value)?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, FeatureValue)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (K, FeatureValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Return a copy of `features` with every `false` flag set to `true`.
///
/// Every other entry, including how its bytes were decoded, is copied
/// unchanged.
pub fn unlock_features(features: &FeatureMap) -> FeatureMap {
    let mut unlocked = features.clone();
    for entry in &mut unlocked.entries {
        if entry.value.is_false() {
            entry.value = FeatureValue::Bool(true);
            entry.value_encoding = TextEncoding::Utf8;
        }
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FeatureMap {
        [
            ("RemoveAds", FeatureValue::Bool(false)),
            ("Premium", FeatureValue::Bool(true)),
            ("Label", FeatureValue::Text("false".to_string())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_unlock_sets_false_to_true() {
        let unlocked = unlock_features(&sample());
        assert_eq!(unlocked.get("RemoveAds"), Some(&FeatureValue::Bool(true)));
        assert_eq!(unlocked.get("Premium"), Some(&FeatureValue::Bool(true)));
        // Text that happens to read "false" is not a flag.
        assert_eq!(
            unlocked.get("Label"),
            Some(&FeatureValue::Text("false".to_string()))
        );
    }

    #[test]
    fn test_unlock_does_not_mutate_input() {
        let original = sample();
        let _ = unlock_features(&original);
        assert_eq!(original.get("RemoveAds"), Some(&FeatureValue::Bool(false)));
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let once = unlock_features(&sample());
        let twice = unlock_features(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = sample();
        map.insert("RemoveAds", FeatureValue::Text("x".to_string()));
        assert_eq!(map.len(), 3);
        assert_eq!(map.iter().next().map(|(k, _)| k), Some("RemoveAds"));
    }

    #[test]
    fn test_latin1_text_encodes_back_to_original_bytes() {
        let raw = vec![b'c', b'a', b'f', 0xE9];
        let (text, encoding) = TextEncoding::decode(raw.clone());
        assert_eq!(text, "café");
        assert_eq!(encoding, TextEncoding::Latin1);
        assert_eq!(encoding.encode(&text), raw);

        let (text, encoding) = TextEncoding::decode("café".as_bytes().to_vec());
        assert_eq!(encoding, TextEncoding::Utf8);
        assert_eq!(encoding.encode(&text), "café".as_bytes());
    }

    #[test]
    fn test_from_json_accepts_strings_and_bools() {
        let map = FeatureMap::from_json(&json!({"a": true, "b": "text"})).unwrap();
        assert_eq!(map.get("a"), Some(&FeatureValue::Bool(true)));
        assert_eq!(map.get("b"), Some(&FeatureValue::Text("text".to_string())));
    }

    #[test]
    fn test_from_json_keeps_document_order() {
        let value: Value =
            serde_json::from_str(r#"{"Zebra": true, "Apple": "x", "Mango": false}"#).unwrap();
        let map = FeatureMap::from_json(&value).unwrap();
        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Zebra", "Apple", "Mango"]);
    }

    #[test]
    fn test_from_json_rejects_numbers() {
        let err = FeatureMap::from_json(&json!({"coins": 100})).unwrap_err();
        assert_eq!(
            err,
            CipherError::UnsupportedValueType {
                feature: "coins".to_string(),
                found: "number".to_string(),
            }
        );
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = FeatureMap::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, CipherError::InvalidEncoding(_)));
    }

    #[test]
    fn test_serializes_in_file_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"RemoveAds":false,"Premium":true,"Label":"false"}"#
        );
    }
}
