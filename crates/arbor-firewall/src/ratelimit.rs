//! Non-blocking token-bucket rate limiting.

use std::sync::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket sized in requests per minute.
///
/// Refills continuously; `allow` never blocks, it either takes a token or
/// reports exhaustion.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            // Poisoned lock: fail closed.
            return false;
        };
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
