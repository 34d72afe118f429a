//! The firewall gate: rate limits, reputation, ACL evaluation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use arbor_shield::OwnerShield;
use arbor_types::{AttestationData, PeerDid};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::ratelimit::TokenBucket;
use crate::rules::{validate_rule, AclAction, AclRule};
use crate::sanitize::sanitize_map;
use crate::FirewallError;

/// Reputation source for remote peers.
#[async_trait]
pub trait ReputationChecker: Send + Sync {
    async fn score(&self, peer_did: &PeerDid) -> anyhow::Result<f64>;
}

/// Produces a ZK attestation over response and identity digests.
#[async_trait]
pub trait Attestor: Send + Sync {
    async fn attest(
        &self,
        result_digest: [u8; 32],
        did_digest: [u8; 32],
    ) -> anyhow::Result<AttestationData>;
}

/// Why a call was blocked.
#[derive(Clone, Debug, PartialEq)]
pub enum DenyReason {
    RateLimited,
    GlobalRateLimited,
    LowReputation { score: f64, floor: f64 },
    ExplicitDeny,
    NoAllowRule,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::RateLimited => f.write_str("rate limit exceeded"),
            DenyReason::GlobalRateLimited => f.write_str("global rate limit exceeded"),
            DenyReason::LowReputation { score, floor } => {
                write!(f, "reputation {score:.2} below floor {floor:.2}")
            }
            DenyReason::ExplicitDeny => f.write_str("denied by ACL rule"),
            DenyReason::NoAllowRule => f.write_str("no ACL rule allows this call"),
        }
    }
}

/// Outcome of `filter_query`.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterVerdict {
    Allow,
    Deny(DenyReason),
}

impl FilterVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterVerdict::Allow)
    }
}

/// Policy knobs. The reputation posture is deliberately explicit: the
/// gate fails open on checker errors, and a score of exactly zero means
/// "never measured", not "measured and bad".
#[derive(Clone, Debug)]
pub struct FirewallConfig {
    /// Minimum reputation required once a peer has been measured.
    pub min_reputation: f64,
    /// Proceed when the reputation checker itself errors.
    pub reputation_fail_open: bool,
    /// Treat a score of exactly 0.0 as a new, unmeasured peer.
    pub treat_zero_score_as_new_peer: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            min_reputation: 0.3,
            reputation_fail_open: true,
            treat_zero_score_as_new_peer: true,
        }
    }
}

/// Deny-by-default capability firewall.
pub struct Firewall {
    rules: Mutex<Vec<AclRule>>,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    config: FirewallConfig,
    reputation: Option<Arc<dyn ReputationChecker>>,
    shield: Option<Arc<OwnerShield>>,
    attestor: Option<Arc<dyn Attestor>>,
}

impl Firewall {
    /// Build a firewall from startup rules. Rules that fail validation
    /// are kept for backward compatibility but logged loudly; `add_rule`
    /// is the strict path.
    pub fn new(rules: Vec<AclRule>, config: FirewallConfig) -> Self {
        for rule in &rules {
            if validate_rule(rule).is_err() {
                warn!(peer = %rule.peer_did, "startup ACL rule is globally permissive");
            }
        }
        Self {
            rules: Mutex::new(rules),
            buckets: Mutex::new(HashMap::new()),
            config,
            reputation: None,
            shield: None,
            attestor: None,
        }
    }

    pub fn with_reputation_checker(mut self, checker: Arc<dyn ReputationChecker>) -> Self {
        self.reputation = Some(checker);
        self
    }

    pub fn with_shield(mut self, shield: Arc<OwnerShield>) -> Self {
        self.shield = Some(shield);
        self
    }

    pub fn with_attestor(mut self, attestor: Arc<dyn Attestor>) -> Self {
        self.attestor = Some(attestor);
        self
    }

    /// Add a rule at runtime. Globally permissive allow rules are a hard
    /// error here and the rule set is left untouched.
    pub fn add_rule(&self, rule: AclRule) -> Result<(), FirewallError> {
        validate_rule(&rule)?;
        let mut rules = self.rules.lock().map_err(|_| FirewallError::LockError)?;
        rules.push(rule);
        Ok(())
    }

    /// Snapshot of the current rule set.
    pub fn rules(&self) -> Result<Vec<AclRule>, FirewallError> {
        let rules = self.rules.lock().map_err(|_| FirewallError::LockError)?;
        Ok(rules.clone())
    }

    /// Decide whether `peer_did` may invoke `tool`.
    ///
    /// Order: per-peer rate limit, global rate limit, reputation, ACL. A
    /// matching deny rule short-circuits; an allow rule only latches, so
    /// a later deny still wins. No matching allow means denial.
    pub async fn filter_query(
        &self,
        peer_did: &PeerDid,
        tool: &str,
    ) -> Result<FilterVerdict, FirewallError> {
        let rules = self.rules()?;

        let peer_limit = rules
            .iter()
            .find(|r| r.peer_did == peer_did.as_str() && r.rate_limit > 0)
            .map(|r| r.rate_limit);
        if let Some(limit) = peer_limit {
            if !self.take_token(peer_did.as_str(), limit)? {
                info!(peer = %peer_did, tool, "per-peer rate limit exceeded");
                return Ok(FilterVerdict::Deny(DenyReason::RateLimited));
            }
        }

        let global_limit = rules
            .iter()
            .find(|r| r.peer_did == "*" && r.rate_limit > 0)
            .map(|r| r.rate_limit);
        if let Some(limit) = global_limit {
            if !self.take_token("*", limit)? {
                info!(peer = %peer_did, tool, "global rate limit exceeded");
                return Ok(FilterVerdict::Deny(DenyReason::GlobalRateLimited));
            }
        }

        if let Some(verdict) = self.check_reputation(peer_did).await {
            return Ok(verdict);
        }

        let mut allowed = false;
        for rule in &rules {
            if !rule.matches(peer_did.as_str(), tool) {
                continue;
            }
            match rule.action {
                AclAction::Deny => {
                    info!(peer = %peer_did, tool, "blocked by deny rule");
                    return Ok(FilterVerdict::Deny(DenyReason::ExplicitDeny));
                }
                AclAction::Allow => allowed = true,
            }
        }

        if allowed {
            debug!(peer = %peer_did, tool, "allowed by ACL");
            Ok(FilterVerdict::Allow)
        } else {
            info!(peer = %peer_did, tool, "no matching allow rule");
            Ok(FilterVerdict::Deny(DenyReason::NoAllowRule))
        }
    }

    // None means "no objection from the reputation gate".
    async fn check_reputation(&self, peer_did: &PeerDid) -> Option<FilterVerdict> {
        let checker = self.reputation.as_ref()?;
        match checker.score(peer_did).await {
            Ok(score) => {
                if score == 0.0 && self.config.treat_zero_score_as_new_peer {
                    debug!(peer = %peer_did, "unmeasured peer, reputation gate skipped");
                    return None;
                }
                if score < self.config.min_reputation {
                    info!(peer = %peer_did, score, "reputation below floor");
                    return Some(FilterVerdict::Deny(DenyReason::LowReputation {
                        score,
                        floor: self.config.min_reputation,
                    }));
                }
                None
            }
            Err(e) => {
                warn!(peer = %peer_did, error = %e, "reputation check failed");
                if self.config.reputation_fail_open {
                    None
                } else {
                    Some(FilterVerdict::Deny(DenyReason::LowReputation {
                        score: f64::NAN,
                        floor: self.config.min_reputation,
                    }))
                }
            }
        }
    }

    fn take_token(&self, key: &str, limit: u32) -> Result<bool, FirewallError> {
        let bucket = {
            let mut buckets = self.buckets.lock().map_err(|_| FirewallError::LockError)?;
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokenBucket::per_minute(limit)))
                .clone()
        };
        Ok(bucket.allow())
    }

    /// Sanitize an outgoing response: strip sensitive keys and embedded
    /// paths, then run the owner shield as a second pass when configured.
    pub fn sanitize_response(&self, result: &Map<String, Value>) -> Map<String, Value> {
        let sanitized = sanitize_map(result);
        match &self.shield {
            Some(shield) => {
                let (shielded, _paths) = shield.scan_and_redact(&Value::Object(sanitized));
                match shielded {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
            None => sanitized,
        }
    }

    /// Attach a ZK attestation over `(sha256(result_json), sha256(did))`
    /// when an attestor is configured. Attestation failure degrades to an
    /// unattested response.
    pub async fn attest_response(
        &self,
        result: &Map<String, Value>,
        local_did: &str,
    ) -> Option<AttestationData> {
        let attestor = self.attestor.as_ref()?;
        let result_json = match serde_json::to_vec(&Value::Object(result.clone())) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "could not serialize result for attestation");
                return None;
            }
        };
        let result_digest = arbor_crypto::sha256(&result_json);
        let did_digest = arbor_crypto::sha256(local_did.as_bytes());
        match attestor.attest(result_digest, did_digest).await {
            Ok(attestation) => Some(attestation),
            Err(e) => {
                warn!(error = %e, "attestation failed, responding unattested");
                None
            }
        }
    }
}
