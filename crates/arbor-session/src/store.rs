//! Registry of authenticated peer sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbor_crypto::{constant_time_eq, SessionTokenMinter};
use arbor_types::{InvalidationReason, PeerDid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::SessionError;

/// An authenticated session with one peer.
///
/// One active session per peer DID; creating a new one replaces the old.
/// Once invalidated a session never validates again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub peer_did: PeerDid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether the peer authenticated with a ZK proof rather than a signature.
    pub zk_verified: bool,
    pub invalidated: bool,
    pub invalidated_reason: Option<InvalidationReason>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Append-only audit entry, one per invalidation event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub peer_did: PeerDid,
    pub reason: InvalidationReason,
    pub invalidated_at: DateTime<Utc>,
}

/// Session registry configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Session lifetime from creation.
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Callback fired once per invalidated peer, after the store lock is released.
pub type InvalidationCallback = Arc<dyn Fn(&PeerDid, InvalidationReason) + Send + Sync>;

struct StoreInner {
    sessions: HashMap<PeerDid, Session>,
    history: Vec<InvalidationRecord>,
}

/// Registry of authenticated peer sessions.
///
/// Invalidation is linearizable with respect to `validate`/`get`: the map
/// mutation happens under the lock, and the callback fires only after the
/// lock is released, so a callback that touches the store cannot deadlock.
pub struct SessionStore {
    inner: Mutex<StoreInner>,
    minter: SessionTokenMinter,
    config: SessionConfig,
    on_invalidate: Mutex<Option<InvalidationCallback>>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                sessions: HashMap::new(),
                history: Vec::new(),
            }),
            minter: SessionTokenMinter::new(),
            config,
            on_invalidate: Mutex::new(None),
        }
    }

    /// Register a callback fired for each invalidated peer.
    pub fn set_invalidation_callback(&self, callback: InvalidationCallback) {
        if let Ok(mut slot) = self.on_invalidate.lock() {
            *slot = Some(callback);
        }
    }

    /// Mint a token and store a session, replacing any prior session for
    /// this peer.
    pub fn create(&self, peer_did: &PeerDid, zk_verified: bool) -> Result<Session, SessionError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let session = Session {
            peer_did: peer_did.clone(),
            token: self.minter.mint(peer_did.as_str()),
            created_at: now,
            expires_at: now + ttl,
            zk_verified,
            invalidated: false,
            invalidated_reason: None,
        };

        let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        inner.sessions.insert(peer_did.clone(), session.clone());
        debug!(peer = %peer_did, zk_verified, "session created");
        Ok(session)
    }

    /// Store a session minted by the remote initiator (the responder side
    /// of a handshake adopts the token from the session ack).
    pub fn adopt(
        &self,
        peer_did: &PeerDid,
        token: &str,
        expires_at: DateTime<Utc>,
        zk_verified: bool,
    ) -> Result<Session, SessionError> {
        let session = Session {
            peer_did: peer_did.clone(),
            token: token.to_string(),
            created_at: Utc::now(),
            expires_at,
            zk_verified,
            invalidated: false,
            invalidated_reason: None,
        };
        let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        inner.sessions.insert(peer_did.clone(), session.clone());
        debug!(peer = %peer_did, "remote-minted session adopted");
        Ok(session)
    }

    /// True only if a session exists, is unexpired, is not invalidated,
    /// and its token matches. Expired or invalidated entries found here
    /// are purged (lazy eviction). A token mismatch does NOT purge: the
    /// entry is still live, and evicting it would let anyone holding the
    /// peer's DID knock out the real session with a garbage token.
    pub fn validate(&self, peer_did: &PeerDid, token: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        let Some(session) = inner.sessions.get(peer_did) else {
            return Ok(false);
        };
        if session.invalidated || session.is_expired() {
            inner.sessions.remove(peer_did);
            return Ok(false);
        }
        Ok(constant_time_eq(
            session.token.as_bytes(),
            token.as_bytes(),
        ))
    }

    /// The live session for a peer, if any. Stale entries are purged.
    pub fn get(&self, peer_did: &PeerDid) -> Result<Option<Session>, SessionError> {
        let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        let Some(session) = inner.sessions.get(peer_did) else {
            return Ok(None);
        };
        if session.invalidated || session.is_expired() {
            inner.sessions.remove(peer_did);
            return Ok(None);
        }
        Ok(Some(session.clone()))
    }

    /// Resolve a session token back to its peer, scanning live sessions.
    pub fn find_by_token(&self, token: &str) -> Result<Option<PeerDid>, SessionError> {
        let inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        for session in inner.sessions.values() {
            if session.invalidated || session.is_expired() {
                continue;
            }
            if constant_time_eq(session.token.as_bytes(), token.as_bytes()) {
                return Ok(Some(session.peer_did.clone()));
            }
        }
        Ok(None)
    }

    /// Invalidate one peer's session. A record is appended even when the
    /// peer has no active session, so attempted revocations stay auditable.
    /// Returns whether an active session was removed.
    pub fn invalidate(
        &self,
        peer_did: &PeerDid,
        reason: InvalidationReason,
    ) -> Result<bool, SessionError> {
        let existed = {
            let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
            let existed = match inner.sessions.remove(peer_did) {
                Some(mut session) => {
                    session.invalidated = true;
                    session.invalidated_reason = Some(reason);
                    true
                }
                None => false,
            };
            inner.history.push(InvalidationRecord {
                peer_did: peer_did.clone(),
                reason,
                invalidated_at: Utc::now(),
            });
            existed
        };
        info!(peer = %peer_did, %reason, existed, "session invalidated");
        self.fire_callback(&[peer_did.clone()], reason);
        Ok(existed)
    }

    /// Invalidate every active session. Returns the number invalidated.
    pub fn invalidate_all(&self, reason: InvalidationReason) -> Result<usize, SessionError> {
        self.invalidate_where(|_| true, reason)
    }

    /// Invalidate sessions matching a predicate. Returns the number invalidated.
    pub fn invalidate_where<F>(
        &self,
        predicate: F,
        reason: InvalidationReason,
    ) -> Result<usize, SessionError>
    where
        F: Fn(&Session) -> bool,
    {
        let affected: Vec<PeerDid> = {
            let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
            let affected: Vec<PeerDid> = inner
                .sessions
                .values()
                .filter(|s| predicate(s))
                .map(|s| s.peer_did.clone())
                .collect();
            let now = Utc::now();
            for peer in &affected {
                inner.sessions.remove(peer);
                inner.history.push(InvalidationRecord {
                    peer_did: peer.clone(),
                    reason,
                    invalidated_at: now,
                });
            }
            affected
        };
        if !affected.is_empty() {
            info!(count = affected.len(), %reason, "sessions invalidated");
        }
        self.fire_callback(&affected, reason);
        Ok(affected.len())
    }

    /// Sweep expired and invalidated entries. Returns the removed count.
    pub fn cleanup(&self) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, s| !s.invalidated && !s.is_expired());
        Ok(before - inner.sessions.len())
    }

    /// Snapshot of live sessions.
    pub fn active_sessions(&self) -> Result<Vec<Session>, SessionError> {
        let inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        Ok(inner
            .sessions
            .values()
            .filter(|s| !s.invalidated && !s.is_expired())
            .cloned()
            .collect())
    }

    /// Most recent invalidation records, newest first.
    pub fn invalidation_history(&self, limit: usize) -> Result<Vec<InvalidationRecord>, SessionError> {
        let inner = self.inner.lock().map_err(|_| SessionError::LockError)?;
        Ok(inner.history.iter().rev().take(limit).cloned().collect())
    }

    // Callbacks run outside the store lock.
    fn fire_callback(&self, peers: &[PeerDid], reason: InvalidationReason) {
        let callback = match self.on_invalidate.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(callback) = callback {
            for peer in peers {
                callback(peer, reason);
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer(name: &str) -> PeerDid {
        PeerDid::new(format!("did:arbor:{name}"))
    }

    #[test]
    fn create_then_validate() {
        let store = SessionStore::default();
        let session = store.create(&peer("a"), false).unwrap();
        assert!(store.validate(&peer("a"), &session.token).unwrap());
        assert!(!store.validate(&peer("a"), "wrong-token").unwrap());
        assert!(!store.validate(&peer("b"), &session.token).unwrap());
    }

    #[test]
    fn token_mismatch_does_not_evict_live_session() {
        let store = SessionStore::default();
        let session = store.create(&peer("a"), false).unwrap();
        assert!(!store.validate(&peer("a"), "garbage-token").unwrap());
        // The live session survives the failed attempt.
        assert!(store.validate(&peer("a"), &session.token).unwrap());
        assert_eq!(store.active_sessions().unwrap().len(), 1);
    }

    #[test]
    fn invalidate_removes_and_records() {
        let store = SessionStore::default();
        let session = store.create(&peer("a"), false).unwrap();
        assert!(store
            .invalidate(&peer("a"), InvalidationReason::ManualRevoke)
            .unwrap());
        assert!(!store.validate(&peer("a"), &session.token).unwrap());
        assert!(store.get(&peer("a")).unwrap().is_none());

        let history = store.invalidation_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, InvalidationReason::ManualRevoke);
    }

    #[test]
    fn invalidate_unknown_peer_still_recorded() {
        let store = SessionStore::default();
        assert!(!store
            .invalidate(&peer("ghost"), InvalidationReason::SecurityEvent)
            .unwrap());
        assert_eq!(store.invalidation_history(10).unwrap().len(), 1);
    }

    #[test]
    fn creating_replaces_prior_session() {
        let store = SessionStore::default();
        let first = store.create(&peer("a"), false).unwrap();
        let second = store.create(&peer("a"), true).unwrap();
        assert!(!store.validate(&peer("a"), &first.token).unwrap());
        assert!(store.validate(&peer("a"), &second.token).unwrap());
        assert_eq!(store.active_sessions().unwrap().len(), 1);
    }

    #[test]
    fn invalidate_where_filters_by_predicate() {
        let store = SessionStore::default();
        let zk = store.create(&peer("zk"), true).unwrap();
        store.create(&peer("plain"), false).unwrap();

        let count = store
            .invalidate_where(|s| !s.zk_verified, InvalidationReason::SecurityEvent)
            .unwrap();
        assert_eq!(count, 1);

        let active = store.active_sessions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].peer_did, peer("zk"));
        assert!(store.validate(&peer("zk"), &zk.token).unwrap());
    }

    #[test]
    fn expired_sessions_lazily_evicted() {
        let store = SessionStore::new(SessionConfig {
            ttl: Duration::from_secs(0),
        });
        let session = store.create(&peer("a"), false).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!store.validate(&peer("a"), &session.token).unwrap());
        // Entry was purged by the failed validate.
        assert_eq!(store.cleanup().unwrap(), 0);
    }

    #[test]
    fn cleanup_counts_removed() {
        let store = SessionStore::new(SessionConfig {
            ttl: Duration::from_secs(0),
        });
        store.create(&peer("a"), false).unwrap();
        store.create(&peer("b"), false).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.cleanup().unwrap(), 2);
    }

    #[test]
    fn find_by_token_resolves_peer() {
        let store = SessionStore::default();
        let session = store.create(&peer("a"), false).unwrap();
        assert_eq!(
            store.find_by_token(&session.token).unwrap(),
            Some(peer("a"))
        );
        assert_eq!(store.find_by_token("nope").unwrap(), None);
    }

    #[test]
    fn callback_fires_after_lock_release() {
        let store = Arc::new(SessionStore::default());
        store.create(&peer("a"), false).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let store_clone = store.clone();
        // Re-entrant callback: touches the store again. Deadlocks if the
        // callback ran under the store lock.
        store.set_invalidation_callback(Arc::new(move |peer, _reason| {
            let _ = store_clone.get(peer);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        store
            .invalidate(&peer("a"), InvalidationReason::Logout)
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_all_clears_store() {
        let store = SessionStore::default();
        store.create(&peer("a"), false).unwrap();
        store.create(&peer("b"), true).unwrap();
        let count = store.invalidate_all(InvalidationReason::Logout).unwrap();
        assert_eq!(count, 2);
        assert!(store.active_sessions().unwrap().is_empty());
    }
}
