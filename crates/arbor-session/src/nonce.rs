//! Replay-protection cache for handshake nonces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use arbor_crypto::NONCE_LENGTH;

/// TTL-evicted set of seen handshake nonces.
///
/// This is the replay defense: without it, a captured challenge/response
/// pair could be resubmitted indefinitely within the timestamp window.
pub struct NonceCache {
    seen: Mutex<HashMap<[u8; NONCE_LENGTH], Instant>>,
    ttl: Duration,
}

impl NonceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Atomically check and record a nonce. Returns true only on first
    /// sight of a well-formed nonce; malformed input is rejected without
    /// being recorded.
    pub fn check_and_record(&self, nonce: &[u8]) -> bool {
        let nonce: [u8; NONCE_LENGTH] = match nonce.try_into() {
            Ok(n) => n,
            Err(_) => {
                warn!(len = nonce.len(), "rejected nonce with invalid length");
                return false;
            }
        };

        let Ok(mut seen) = self.seen.lock() else {
            // Poisoned lock: fail closed, treat every nonce as replayed.
            return false;
        };
        let now = Instant::now();
        match seen.get(&nonce) {
            Some(recorded) if now.duration_since(*recorded) < self.ttl => false,
            _ => {
                seen.insert(nonce, now);
                true
            }
        }
    }

    /// Drop entries older than the TTL. Returns the removed count.
    pub fn cleanup(&self) -> usize {
        let Ok(mut seen) = self.seen.lock() else {
            return 0;
        };
        let now = Instant::now();
        let before = seen.len();
        seen.retain(|_, recorded| now.duration_since(*recorded) < self.ttl);
        before - seen.len()
    }

    /// Start a background sweeper calling `cleanup` every TTL/2.
    pub fn spawn_sweeper(self: &Arc<Self>) -> NonceSweeper {
        let cache = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let period = self.ttl / 2;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
            ticker.tick().await; // first tick is immediate
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let removed = cache.cleanup();
                        if removed > 0 {
                            debug!(removed, "nonce cache swept");
                        }
                    }
                }
            }
        });
        NonceSweeper {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

/// Handle for the background nonce sweeper.
pub struct NonceSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl NonceSweeper {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for NonceSweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_accepted_replay_rejected() {
        let cache = NonceCache::new(Duration::from_secs(60));
        let nonce = [7u8; 32];
        assert!(cache.check_and_record(&nonce));
        assert!(!cache.check_and_record(&nonce));
        assert!(!cache.check_and_record(&nonce));
    }

    #[test]
    fn malformed_nonces_rejected_and_not_recorded() {
        let cache = NonceCache::new(Duration::from_secs(60));
        assert!(!cache.check_and_record(&[]));
        assert!(!cache.check_and_record(&[1u8; 16]));
        assert!(!cache.check_and_record(&[1u8; 64]));
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn nonce_reusable_after_ttl_and_cleanup() {
        let cache = NonceCache::new(Duration::from_millis(10));
        let nonce = [9u8; 32];
        assert!(cache.check_and_record(&nonce));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.cleanup(), 1);
        assert!(cache.check_and_record(&nonce));
    }

    #[test]
    fn expired_entry_accepted_even_before_cleanup() {
        let cache = NonceCache::new(Duration::from_millis(10));
        let nonce = [3u8; 32];
        assert!(cache.check_and_record(&nonce));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.check_and_record(&nonce));
    }

    #[tokio::test]
    async fn sweeper_runs_and_shuts_down() {
        let cache = Arc::new(NonceCache::new(Duration::from_millis(20)));
        assert!(cache.check_and_record(&[5u8; 32]));

        let sweeper = cache.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.shutdown().await;

        // Swept in the background; the nonce is fresh again.
        assert!(cache.check_and_record(&[5u8; 32]));
    }
}
