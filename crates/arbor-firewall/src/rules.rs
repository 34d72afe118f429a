//! ACL rule model and validation.

use serde::{Deserialize, Serialize};

use crate::FirewallError;

/// Whether a matching rule permits or blocks the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    Allow,
    Deny,
}

/// One access-control rule.
///
/// `peer_did` is an exact DID or `"*"`. Tool patterns are `"*"`, an exact
/// name, or a prefix ending in `"*"`; an empty list matches every tool.
/// `rate_limit` is requests per minute, `0` meaning unlimited.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AclRule {
    #[serde(rename = "peerDID")]
    pub peer_did: String,
    pub action: AclAction,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(rename = "rateLimit", default)]
    pub rate_limit: u32,
}

impl AclRule {
    pub fn matches_peer(&self, peer_did: &str) -> bool {
        self.peer_did == "*" || self.peer_did == peer_did
    }

    pub fn matches_tool(&self, tool: &str) -> bool {
        if self.tools.is_empty() {
            return true;
        }
        self.tools.iter().any(|pattern| {
            if pattern == "*" {
                true
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                tool.starts_with(prefix)
            } else {
                pattern == tool
            }
        })
    }

    pub fn matches(&self, peer_did: &str, tool: &str) -> bool {
        self.matches_peer(peer_did) && self.matches_tool(tool)
    }

    fn is_globally_permissive(&self) -> bool {
        self.action == AclAction::Allow
            && self.peer_did == "*"
            && (self.tools.is_empty() || self.tools.iter().any(|t| t == "*"))
    }
}

/// Reject rules that would override the deny-all posture.
pub fn validate_rule(rule: &AclRule) -> Result<(), FirewallError> {
    if rule.is_globally_permissive() {
        return Err(FirewallError::WildcardAllowRule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(peer: &str, action: AclAction, tools: &[&str]) -> AclRule {
        AclRule {
            peer_did: peer.to_string(),
            action,
            tools: tools.iter().map(|t| t.to_string()).collect(),
            rate_limit: 0,
        }
    }

    #[test]
    fn peer_matching() {
        let r = rule("did:arbor:a", AclAction::Allow, &["echo"]);
        assert!(r.matches_peer("did:arbor:a"));
        assert!(!r.matches_peer("did:arbor:b"));
        assert!(rule("*", AclAction::Deny, &[]).matches_peer("did:arbor:b"));
    }

    #[test]
    fn tool_patterns() {
        let r = rule("did:arbor:a", AclAction::Allow, &["echo", "search.*"]);
        assert!(r.matches_tool("echo"));
        assert!(r.matches_tool("search.web"));
        assert!(r.matches_tool("search."));
        assert!(!r.matches_tool("echo2"));
        assert!(!r.matches_tool("searchx"));

        assert!(rule("p", AclAction::Allow, &[]).matches_tool("anything"));
        assert!(rule("p", AclAction::Allow, &["*"]).matches_tool("anything"));
    }

    #[test]
    fn wildcard_allow_rejected() {
        assert!(validate_rule(&rule("*", AclAction::Allow, &[])).is_err());
        assert!(validate_rule(&rule("*", AclAction::Allow, &["*"])).is_err());
        assert!(validate_rule(&rule("*", AclAction::Allow, &["echo", "*"])).is_err());
    }

    #[test]
    fn scoped_and_deny_rules_accepted() {
        assert!(validate_rule(&rule("*", AclAction::Deny, &[])).is_ok());
        assert!(validate_rule(&rule("*", AclAction::Allow, &["echo"])).is_ok());
        assert!(validate_rule(&rule("did:arbor:a", AclAction::Allow, &[])).is_ok());
    }

    #[test]
    fn serde_wire_names() {
        let r: AclRule = serde_json::from_str(
            r#"{"peerDID": "*", "action": "deny", "tools": ["admin.*"], "rateLimit": 60}"#,
        )
        .unwrap();
        assert_eq!(r.action, AclAction::Deny);
        assert_eq!(r.rate_limit, 60);
    }
}
