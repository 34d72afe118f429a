//! The two-party handshake state machine.

use std::sync::Arc;
use std::time::Duration;

use arbor_crypto::{
    challenge_digest, constant_time_eq, generate_nonce, nonce_digest, verify_recoverable, Wallet,
    ZkProver, ZkVerifier,
};
use arbor_session::{NonceCache, Session, SessionStore};
use arbor_types::{Challenge, ChallengeResponse, PeerDid, SessionAck};
use chrono::{TimeZone, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::codec::{read_document, write_document};
use crate::{ApprovalHandler, HandshakeError};

/// Oldest acceptable challenge timestamp, seconds before local time.
pub const MAX_CHALLENGE_AGE_SECS: i64 = 5 * 60;
/// Tolerated forward clock skew, seconds after local time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Handshake behavior knobs.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Deadline for the whole exchange; exceeding it at any await point
    /// fails the handshake and releases the stream.
    pub timeout: Duration,
    /// Refuse unsigned (v1.0) challenges.
    pub require_signed_challenge: bool,
    /// Skip the approval gate for peers that already hold a session.
    pub auto_approve_known_peers: bool,
    /// Prefer a ZK proof over a signature when responding.
    pub zk_enabled: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            require_signed_challenge: false,
            auto_approve_known_peers: true,
            zk_enabled: false,
        }
    }
}

/// Runs the handshake protocol and mints sessions on success.
pub struct Handshaker {
    local_did: PeerDid,
    store: Arc<SessionStore>,
    nonces: Arc<NonceCache>,
    config: HandshakeConfig,
    wallet: Option<Arc<dyn Wallet>>,
    zk_prover: Option<Arc<dyn ZkProver>>,
    zk_verifier: Option<Arc<dyn ZkVerifier>>,
    approver: Option<Arc<dyn ApprovalHandler>>,
}

impl Handshaker {
    pub fn new(
        local_did: PeerDid,
        store: Arc<SessionStore>,
        nonces: Arc<NonceCache>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            local_did,
            store,
            nonces,
            config,
            wallet: None,
            zk_prover: None,
            zk_verifier: None,
            approver: None,
        }
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_zk(
        mut self,
        prover: Arc<dyn ZkProver>,
        verifier: Arc<dyn ZkVerifier>,
    ) -> Self {
        self.zk_prover = Some(prover);
        self.zk_verifier = Some(verifier);
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ApprovalHandler>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Open a handshake toward a remote peer: send a challenge, verify
    /// the response, mint a session, send the ack.
    pub async fn initiate<S>(&self, stream: &mut S) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        tokio::time::timeout(self.config.timeout, self.initiate_inner(stream))
            .await
            .map_err(|_| HandshakeError::Timeout)?
    }

    async fn initiate_inner<S>(&self, stream: &mut S) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let nonce = generate_nonce();
        let timestamp = Utc::now().timestamp();

        // v1.1 signs the challenge; without a wallet we degrade to v1.0.
        let (public_key, signature) = match &self.wallet {
            Some(wallet) => {
                let digest = challenge_digest(&nonce, timestamp, self.local_did.as_str());
                (Some(wallet.public_key()), Some(wallet.sign(&digest)?))
            }
            None => {
                debug!("no wallet configured, sending unsigned v1.0 challenge");
                (None, None)
            }
        };

        let challenge = Challenge {
            nonce: nonce.to_vec(),
            timestamp,
            sender_did: self.local_did.0.clone(),
            public_key,
            signature,
        };
        debug!(protocol = challenge.protocol_id(), "sending challenge");
        write_document(stream, &challenge).await?;

        let response: ChallengeResponse = read_document(stream).await?;
        self.verify_response(&nonce, &response)?;

        let peer_did = PeerDid::new(response.did.clone());
        let session = self.store.create(&peer_did, response.has_zk_proof())?;
        write_document(
            stream,
            &SessionAck {
                token: session.token.clone(),
                expires_at: session.expires_at.timestamp(),
            },
        )
        .await?;

        info!(peer = %peer_did, zk = session.zk_verified, "handshake completed (initiator)");
        Ok(session)
    }

    /// Answer an incoming handshake: validate the challenge, prove our
    /// identity, adopt the session from the initiator's ack.
    pub async fn handle_incoming<S>(
        &self,
        stream: &mut S,
        remote_addr: &str,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        tokio::time::timeout(
            self.config.timeout,
            self.handle_incoming_inner(stream, remote_addr),
        )
        .await
        .map_err(|_| HandshakeError::Timeout)?
    }

    async fn handle_incoming_inner<S>(
        &self,
        stream: &mut S,
        remote_addr: &str,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let challenge: Challenge = read_document(stream).await?;
        let peer_did = PeerDid::new(challenge.sender_did.clone());
        debug!(peer = %peer_did, protocol = challenge.protocol_id(), "challenge received");

        // Stale or future-dated challenges bound replay-via-delay.
        let age = Utc::now().timestamp() - challenge.timestamp;
        if age > MAX_CHALLENGE_AGE_SECS {
            warn!(peer = %peer_did, age, "stale challenge refused");
            return Err(HandshakeError::StaleChallenge { age_secs: age });
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            warn!(peer = %peer_did, skew = -age, "future-dated challenge refused");
            return Err(HandshakeError::FutureChallenge { skew_secs: -age });
        }

        if !self.nonces.check_and_record(&challenge.nonce) {
            warn!(peer = %peer_did, "challenge nonce rejected");
            return Err(HandshakeError::NonceRejected);
        }

        match (&challenge.signature, &challenge.public_key) {
            (Some(signature), Some(public_key)) => {
                let digest = challenge_digest(
                    &challenge.nonce,
                    challenge.timestamp,
                    &challenge.sender_did,
                );
                verify_recoverable(&digest, signature, public_key)?;
                debug!(peer = %peer_did, "challenge signature verified (v1.1)");
            }
            (Some(_), None) => return Err(HandshakeError::MissingPublicKey),
            (None, _) if self.config.require_signed_challenge => {
                warn!(peer = %peer_did, "unsigned challenge refused by policy");
                return Err(HandshakeError::UnsignedChallenge);
            }
            (None, _) => debug!(peer = %peer_did, "unsigned v1.0 challenge accepted"),
        }

        let known_peer = self.store.get(&peer_did)?.is_some();
        if known_peer && self.config.auto_approve_known_peers {
            debug!(peer = %peer_did, "known peer, approval skipped");
        } else if let Some(approver) = &self.approver {
            if !approver.approve(&peer_did, remote_addr, None, None).await {
                info!(peer = %peer_did, remote_addr, "owner denied incoming handshake");
                return Err(HandshakeError::ApprovalDenied);
            }
        }

        let response = self.build_response(&challenge.nonce)?;
        let zk_verified = response.has_zk_proof();
        write_document(stream, &response).await?;

        let ack: SessionAck = read_document(stream).await?;
        let expires_at = Utc
            .timestamp_opt(ack.expires_at, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let session = self
            .store
            .adopt(&peer_did, &ack.token, expires_at, zk_verified)?;

        info!(peer = %peer_did, zk = zk_verified, "handshake completed (responder)");
        Ok(session)
    }

    // ZK proof when enabled and available, else a signature over the
    // nonce digest. Proof-generation failure falls back to the signature.
    fn build_response(&self, nonce: &[u8]) -> Result<ChallengeResponse, HandshakeError> {
        let wallet = self.wallet.as_ref().ok_or(HandshakeError::NoWallet)?;

        let zk_proof = if self.config.zk_enabled {
            match self.zk_prover.as_ref().map(|p| p.prove(nonce)) {
                Some(Ok(proof)) => Some(proof),
                Some(Err(e)) => {
                    warn!(error = %e, "proof generation failed, falling back to signature");
                    None
                }
                None => None,
            }
        } else {
            None
        };

        let signature = if zk_proof.is_none() {
            Some(wallet.sign(&nonce_digest(nonce))?)
        } else {
            None
        };

        Ok(ChallengeResponse {
            nonce: nonce.to_vec(),
            signature,
            zk_proof,
            did: self.local_did.0.clone(),
            public_key: wallet.public_key(),
        })
    }

    /// Check a challenge response against the nonce we issued.
    fn verify_response(
        &self,
        expected_nonce: &[u8],
        response: &ChallengeResponse,
    ) -> Result<(), HandshakeError> {
        if !constant_time_eq(expected_nonce, &response.nonce) {
            return Err(HandshakeError::NonceMismatch);
        }

        if let Some(proof) = &response.zk_proof {
            let verifier = self.zk_verifier.as_ref().ok_or(HandshakeError::NoVerifier)?;
            let valid = verifier.verify(proof, expected_nonce, &response.public_key)?;
            if !valid {
                return Err(HandshakeError::ProofRejected);
            }
            return Ok(());
        }

        if let Some(signature) = &response.signature {
            let digest = nonce_digest(expected_nonce);
            verify_recoverable(&digest, signature, &response.public_key)?;
            return Ok(());
        }

        Err(HandshakeError::NoProof)
    }
}
