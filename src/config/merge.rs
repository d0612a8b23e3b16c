//! Layer merging
//!
//! Objects merge key by key, arrays and scalars are replaced by the later
//! layer. Replacing arrays keeps `apps` and keyword lists predictable: a
//! config file that lists apps lists all of them.

use serde_json::Value;

/// Merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Turn `a.b.c=value` into `{"a": {"b": {"c": value}}}`.
///
/// The value is parsed as JSON when possible (`3`, `true`, `["x"]`) and
/// taken as a plain string otherwise.
pub fn parse_override(assignment: &str) -> Option<Value> {
    let (path, raw) = assignment.split_once('=')?;
    let path = path.trim();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return None;
    }

    let leaf = serde_json::from_str(raw.trim())
        .unwrap_or_else(|_| Value::String(raw.trim().to_string()));

    Some(
        path.rsplit('.')
            .fold(leaf, |acc, key| {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), acc);
                Value::Object(map)
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge() {
        let base = json!({"reddit": {"subreddit": "a", "bot_name": "BitBot"}});
        let overlay = json!({"reddit": {"subreddit": "b"}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["reddit"]["subreddit"], "b");
        assert_eq!(result["reddit"]["bot_name"], "BitBot");
    }

    #[test]
    fn test_arrays_replace() {
        let base = json!({"apps": [{"id": "a"}, {"id": "b"}]});
        let overlay = json!({"apps": [{"id": "c"}]});
        let result = deep_merge(base, overlay);

        let apps = result["apps"].as_array().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0]["id"], "c");
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"retry": {"max_attempts": 3, "max_delay_ms": 10000}});
        let file = json!({"retry": {"max_attempts": 5}});
        let cli = json!({"retry": {"max_attempts": 1}});

        let result = merge_layers(vec![builtin, file, cli]);
        assert_eq!(result["retry"]["max_attempts"], 1);
        assert_eq!(result["retry"]["max_delay_ms"], 10000);
    }

    #[test]
    fn test_parse_override_typed_values() {
        assert_eq!(
            parse_override("retry.max_attempts=5"),
            Some(json!({"retry": {"max_attempts": 5}}))
        );
        assert_eq!(
            parse_override("reddit.post_mode=new_post"),
            Some(json!({"reddit": {"post_mode": "new_post"}}))
        );
    }

    #[test]
    fn test_parse_override_rejects_bad_paths() {
        assert!(parse_override("no_equals_sign").is_none());
        assert!(parse_override("=value").is_none());
        assert!(parse_override("a..b=1").is_none());
    }
}
