//! Response sanitization: strip internal keys, scrub embedded paths.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Key substrings (case-insensitive) that never leave the process.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "private_key",
    "privatekey",
    "api_key",
    "apikey",
    "credential",
    "db_path",
    "dbpath",
    "file_path",
    "filepath",
    "internal_id",
    "internalid",
];

const PATH_PLACEHOLDER: &str = "[redacted-path]";

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Two or more slash-separated segments, e.g. /home/user/data.db
        Regex::new(r"/(?:[\w.\-]+/)+[\w.\-]+").expect("static path regex")
    })
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lowered.contains(k))
}

/// Drop sensitive keys and scrub absolute-path-like substrings,
/// recursing through nested structures.
pub fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        if is_sensitive_key(key) {
            debug!(key, "stripped sensitive response key");
            continue;
        }
        out.insert(key.clone(), sanitize_value(value));
    }
    out
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::String(s) => {
            if path_pattern().is_match(s) {
                Value::String(path_pattern().replace_all(s, PATH_PLACEHOLDER).into_owned())
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    }
}
