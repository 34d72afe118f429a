//! Security-event policy: when tool outcomes revoke trust.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arbor_types::{InvalidationReason, PeerDid};
use tracing::{debug, warn};

use crate::{SessionError, SessionStore};

/// Sink for tool-execution outcomes, consumed by the request dispatcher.
pub trait SecurityEventSink: Send + Sync {
    fn record_tool_success(&self, peer_did: &PeerDid);
    fn record_tool_failure(&self, peer_did: &PeerDid);
}

/// Thresholds for automatic invalidation.
#[derive(Clone, Debug)]
pub struct SecurityEventConfig {
    /// Consecutive tool failures before the session is revoked.
    pub max_failures: u32,
    /// Reputation floor; a score strictly below this revokes the session.
    /// A score exactly at the threshold is tolerated.
    pub min_trust_score: f64,
}

impl Default for SecurityEventConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            min_trust_score: 0.3,
        }
    }
}

/// Turns tool outcomes and reputation signals into session invalidation.
pub struct SecurityEventHandler {
    store: Arc<SessionStore>,
    config: SecurityEventConfig,
    failures: Mutex<HashMap<PeerDid, u32>>,
}

impl SecurityEventHandler {
    pub fn new(store: Arc<SessionStore>, config: SecurityEventConfig) -> Self {
        Self {
            store,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// A successful tool call resets the peer's failure streak.
    pub fn on_tool_success(&self, peer_did: &PeerDid) -> Result<(), SessionError> {
        let mut failures = self.failures.lock().map_err(|_| SessionError::LockError)?;
        failures.remove(peer_did);
        Ok(())
    }

    /// A failed tool call extends the streak; at the threshold the session
    /// is invalidated and the counter cleared.
    pub fn on_tool_failure(&self, peer_did: &PeerDid) -> Result<(), SessionError> {
        let streak = {
            let mut failures = self.failures.lock().map_err(|_| SessionError::LockError)?;
            let streak = failures.entry(peer_did.clone()).or_insert(0);
            *streak += 1;
            let current = *streak;
            if current >= self.config.max_failures {
                failures.remove(peer_did);
            }
            current
        };

        if streak >= self.config.max_failures {
            warn!(peer = %peer_did, streak, "failure threshold reached, revoking session");
            self.store
                .invalidate(peer_did, InvalidationReason::RepeatedFailures)?;
        } else {
            debug!(peer = %peer_did, streak, "tool failure recorded");
        }
        Ok(())
    }

    /// React to a reputation change. Strict inequality: a score exactly at
    /// the floor is tolerated.
    pub fn on_reputation_change(&self, peer_did: &PeerDid, score: f64) -> Result<(), SessionError> {
        if score < self.config.min_trust_score {
            warn!(peer = %peer_did, score, floor = self.config.min_trust_score,
                "reputation collapsed, revoking session");
            self.store
                .invalidate(peer_did, InvalidationReason::ReputationDrop)?;
        }
        Ok(())
    }

    /// Current failure streak for a peer.
    pub fn failure_count(&self, peer_did: &PeerDid) -> u32 {
        self.failures
            .lock()
            .ok()
            .and_then(|f| f.get(peer_did).copied())
            .unwrap_or(0)
    }
}

impl SecurityEventSink for SecurityEventHandler {
    fn record_tool_success(&self, peer_did: &PeerDid) {
        if self.on_tool_success(peer_did).is_err() {
            warn!(peer = %peer_did, "failure counter lock poisoned");
        }
    }

    fn record_tool_failure(&self, peer_did: &PeerDid) {
        if self.on_tool_failure(peer_did).is_err() {
            warn!(peer = %peer_did, "failure counter lock poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionConfig;

    fn setup(max_failures: u32) -> (Arc<SessionStore>, SecurityEventHandler, PeerDid) {
        let store = Arc::new(SessionStore::new(SessionConfig::default()));
        let handler = SecurityEventHandler::new(
            store.clone(),
            SecurityEventConfig {
                max_failures,
                min_trust_score: 0.3,
            },
        );
        let peer = PeerDid::new("did:arbor:peer");
        store.create(&peer, false).unwrap();
        (store, handler, peer)
    }

    #[test]
    fn failures_below_threshold_keep_session() {
        let (store, handler, peer) = setup(3);
        handler.on_tool_failure(&peer).unwrap();
        handler.on_tool_failure(&peer).unwrap();
        assert!(store.get(&peer).unwrap().is_some());
        assert_eq!(handler.failure_count(&peer), 2);
    }

    #[test]
    fn third_failure_invalidates_with_reason() {
        let (store, handler, peer) = setup(3);
        for _ in 0..3 {
            handler.on_tool_failure(&peer).unwrap();
        }
        assert!(store.get(&peer).unwrap().is_none());
        assert_eq!(handler.failure_count(&peer), 0);

        let history = store.invalidation_history(1).unwrap();
        assert_eq!(history[0].reason, InvalidationReason::RepeatedFailures);
    }

    #[test]
    fn success_resets_streak() {
        let (store, handler, peer) = setup(3);
        handler.on_tool_failure(&peer).unwrap();
        handler.on_tool_failure(&peer).unwrap();
        handler.on_tool_success(&peer).unwrap();
        assert_eq!(handler.failure_count(&peer), 0);

        handler.on_tool_failure(&peer).unwrap();
        handler.on_tool_failure(&peer).unwrap();
        assert!(store.get(&peer).unwrap().is_some());
    }

    #[test]
    fn reputation_drop_invalidates_immediately() {
        let (store, handler, peer) = setup(5);
        handler.on_reputation_change(&peer, 0.2).unwrap();
        assert!(store.get(&peer).unwrap().is_none());

        let history = store.invalidation_history(1).unwrap();
        assert_eq!(history[0].reason, InvalidationReason::ReputationDrop);
    }

    #[test]
    fn score_at_floor_is_tolerated() {
        let (store, handler, peer) = setup(5);
        handler.on_reputation_change(&peer, 0.3).unwrap();
        assert!(store.get(&peer).unwrap().is_some());
    }
}
