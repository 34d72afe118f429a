//! Session bookkeeping for authenticated peers.
//!
//! Three pieces: the session registry itself, the nonce replay cache the
//! handshake consults, and the security-event policy that turns tool
//! failures and reputation collapse into session invalidation. Each piece
//! guards its own state; no component takes another's lock.

#![deny(unsafe_code)]

use thiserror::Error;

pub mod events;
pub mod nonce;
pub mod store;

pub use events::{SecurityEventConfig, SecurityEventHandler, SecurityEventSink};
pub use nonce::{NonceCache, NonceSweeper};
pub use store::{InvalidationRecord, Session, SessionConfig, SessionStore};

/// Errors from session bookkeeping.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("lock poisoned")]
    LockError,
}
