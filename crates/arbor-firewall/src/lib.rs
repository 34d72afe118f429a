//! Capability firewall for remote tool invocation.
//!
//! Deny-by-default: a request passes only if it survives the per-peer and
//! global rate limits, the reputation gate, and an explicit ACL allow
//! with no overriding deny. The firewall also sanitizes outgoing
//! responses and can attach a ZK attestation.

#![deny(unsafe_code)]

use thiserror::Error;

pub mod firewall;
pub mod ratelimit;
pub mod rules;
pub mod sanitize;

pub use firewall::{
    Attestor, DenyReason, Firewall, FirewallConfig, FilterVerdict, ReputationChecker,
};
pub use ratelimit::TokenBucket;
pub use rules::{validate_rule, AclAction, AclRule};

/// Firewall configuration and policy errors.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// An allow rule with a wildcard peer and a wildcard (or empty) tool
    /// list would override the deny-all posture; never accepted.
    #[error("globally permissive allow rule rejected: wildcard peer with wildcard tools")]
    WildcardAllowRule,

    #[error("lock poisoned")]
    LockError,

    #[error("attestation failed: {0}")]
    Attestation(String),
}
