//! Owner-PII shield.
//!
//! Recursively scans structured responses before they leave the process
//! and replaces anything that identifies the operator: configured terms
//! (name, email, phone, extras), generic email/phone patterns, and,
//! when enabled, entire conversation-shaped values. The input is never
//! mutated; the caller gets a redacted copy plus the list of redacted
//! paths for audit logging.

#![deny(unsafe_code)]

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Placeholder written over every redacted leaf.
pub const REDACTED: &str = "[REDACTED]";

/// Key substrings whose entire value is blanked when conversation
/// blocking is enabled, regardless of content.
const CONVERSATION_KEYS: &[&str] = &[
    "conversation",
    "message_history",
    "chat_log",
    "session_history",
    "chat_history",
];

/// Operator-identifying data to protect.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShieldProfile {
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    /// Additional literal terms to redact.
    #[serde(default)]
    pub extra_terms: Vec<String>,
    /// Blank whole conversation-shaped values, not just matching strings.
    #[serde(default)]
    pub block_conversations: bool,
}

/// Recursive redactor built from a [`ShieldProfile`].
pub struct OwnerShield {
    terms: Vec<String>,
    email_pattern: Regex,
    phone_pattern: Regex,
    block_conversations: bool,
}

impl OwnerShield {
    pub fn new(profile: &ShieldProfile) -> Self {
        let terms = [
            profile.owner_name.as_deref(),
            profile.owner_email.as_deref(),
            profile.owner_phone.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .chain(profile.extra_terms.iter().cloned())
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

        // Fixed patterns; compilation cannot fail.
        let email_pattern = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("static email regex");
        let phone_pattern =
            Regex::new(r"\b\d{2,4}[-.\s]?\d{3,4}[-.\s]?\d{4}\b").expect("static phone regex");

        Self {
            terms,
            email_pattern,
            phone_pattern,
            block_conversations: profile.block_conversations,
        }
    }

    /// Walk a structure and redact offending leaves.
    ///
    /// Returns the redacted copy and the dotted/indexed paths that were
    /// redacted, in encounter order.
    pub fn scan_and_redact(&self, value: &Value) -> (Value, Vec<String>) {
        let mut paths = Vec::new();
        let redacted = self.walk(value, "", &mut paths);
        if !paths.is_empty() {
            debug!(count = paths.len(), "owner shield redacted fields");
        }
        (redacted, paths)
    }

    fn walk(&self, value: &Value, path: &str, paths: &mut Vec<String>) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_path = join_key(path, key);
                    if self.block_conversations && is_conversation_key(key) {
                        paths.push(child_path);
                        out.insert(key.clone(), Value::String(REDACTED.to_string()));
                        continue;
                    }
                    out.insert(key.clone(), self.walk(child, &child_path, paths));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, child)| self.walk(child, &format!("{path}[{i}]"), paths))
                    .collect(),
            ),
            Value::String(s) => {
                if self.matches(s) {
                    paths.push(path.to_string());
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                }
            }
            _ => value.clone(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term))
            || self.email_pattern.is_match(text)
            || self.phone_pattern.is_match(text)
    }
}

fn is_conversation_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    CONVERSATION_KEYS.iter().any(|k| lowered.contains(k))
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shield() -> OwnerShield {
        OwnerShield::new(&ShieldProfile {
            owner_name: Some("Alice Kim".to_string()),
            owner_email: None,
            owner_phone: None,
            extra_terms: vec![],
            block_conversations: false,
        })
    }

    #[test]
    fn redacts_nested_and_indexed_paths() {
        let input = json!({
            "outer": {"inner": "Alice Kim is the owner", "safe": "x"},
            "list": ["Alice Kim", "clean", {"deep": "Alice Kim"}]
        });
        let (redacted, paths) = shield().scan_and_redact(&input);

        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["list[0]", "list[2].deep", "outer.inner"]);
        assert_eq!(redacted["outer"]["inner"], REDACTED);
        assert_eq!(redacted["outer"]["safe"], "x");
        assert_eq!(redacted["list"][0], REDACTED);
        assert_eq!(redacted["list"][1], "clean");
        assert_eq!(redacted["list"][2]["deep"], REDACTED);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = json!({"note": "call Alice Kim"});
        let (redacted, _) = shield().scan_and_redact(&input);
        assert_eq!(input["note"], "call Alice Kim");
        assert_eq!(redacted["note"], REDACTED);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let input = json!({"note": "ALICE KIM was here"});
        let (redacted, paths) = shield().scan_and_redact(&input);
        assert_eq!(redacted["note"], REDACTED);
        assert_eq!(paths, vec!["note"]);
    }

    #[test]
    fn generic_email_and_phone_patterns() {
        let input = json!({
            "contact": "reach me at someone@example.com",
            "cell": "call 555-123-4567",
            "fine": "no pii here"
        });
        let (redacted, paths) = shield().scan_and_redact(&input);
        assert_eq!(redacted["contact"], REDACTED);
        assert_eq!(redacted["cell"], REDACTED);
        assert_eq!(redacted["fine"], "no pii here");
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn conversation_blocking_replaces_whole_value() {
        let shield = OwnerShield::new(&ShieldProfile {
            owner_name: Some("Alice Kim".to_string()),
            block_conversations: true,
            ..Default::default()
        });
        let input = json!({
            "chat_history": [{"role": "user", "text": "totally clean"}],
            "data": "also clean"
        });
        let (redacted, paths) = shield.scan_and_redact(&input);
        assert_eq!(redacted["chat_history"], REDACTED);
        assert_eq!(redacted["data"], "also clean");
        assert_eq!(paths, vec!["chat_history"]);
    }

    #[test]
    fn conversation_keys_untouched_when_blocking_disabled() {
        let input = json!({"chat_history": ["clean"]});
        let (redacted, paths) = shield().scan_and_redact(&input);
        assert_eq!(redacted["chat_history"][0], "clean");
        assert!(paths.is_empty());
    }

    #[test]
    fn extra_terms_are_matched() {
        let shield = OwnerShield::new(&ShieldProfile {
            extra_terms: vec!["Project Nightfall".to_string()],
            ..Default::default()
        });
        let input = json!({"memo": "project nightfall launches monday"});
        let (redacted, _) = shield.scan_and_redact(&input);
        assert_eq!(redacted["memo"], REDACTED);
    }

    #[test]
    fn non_string_leaves_pass_through() {
        let input = json!({"count": 3, "flag": true, "nothing": null});
        let (redacted, paths) = shield().scan_and_redact(&input);
        assert_eq!(redacted, input);
        assert!(paths.is_empty());
    }
}
