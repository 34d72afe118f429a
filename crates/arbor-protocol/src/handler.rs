//! The per-request dispatch state machine.

use std::sync::Arc;

use arbor_firewall::{Firewall, FilterVerdict};
use arbor_handshake::{read_document, write_document, ApprovalHandler};
use arbor_session::{SecurityEventSink, SessionStore};
use arbor_types::{A2aRequest, A2aResponse, PaymentStatus, PeerDid, RequestType, PROTOCOL_A2A};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::{CardProvider, PaymentGate, ProtocolError, ToolExecutor};

const NO_APPROVER: &str = "no approval handler configured for remote tool invocation";

/// Dispatches authenticated A2A requests.
///
/// Construction wires in the collaborators; everything except the session
/// store and the firewall is optional, and each absence has a defined
/// meaning (no approver means deny, no payment gate means free, no card
/// provider means an error response on discovery).
pub struct ProtocolHandler {
    local_did: PeerDid,
    store: Arc<SessionStore>,
    firewall: Arc<Firewall>,
    executor: Option<Arc<dyn ToolExecutor>>,
    sandboxed_executor: Option<Arc<dyn ToolExecutor>>,
    cards: Option<Arc<dyn CardProvider>>,
    approver: Option<Arc<dyn ApprovalHandler>>,
    payments: Option<Arc<dyn PaymentGate>>,
    events: Option<Arc<dyn SecurityEventSink>>,
}

impl ProtocolHandler {
    pub fn new(local_did: PeerDid, store: Arc<SessionStore>, firewall: Arc<Firewall>) -> Self {
        Self {
            local_did,
            store,
            firewall,
            executor: None,
            sandboxed_executor: None,
            cards: None,
            approver: None,
            payments: None,
            events: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sandboxed executor, preferred over the default for every
    /// remote-originated invocation.
    pub fn with_sandboxed_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.sandboxed_executor = Some(executor);
        self
    }

    pub fn with_card_provider(mut self, cards: Arc<dyn CardProvider>) -> Self {
        self.cards = Some(cards);
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ApprovalHandler>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_payment_gate(mut self, payments: Arc<dyn PaymentGate>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn SecurityEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Serve one unary exchange: read a request document, dispatch it,
    /// write the response document.
    pub async fn serve_stream<S>(
        &self,
        stream: &mut S,
        remote_addr: &str,
    ) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        debug!(protocol = PROTOCOL_A2A, remote_addr, "serving request stream");
        let request: A2aRequest = read_document(stream).await?;
        let response = self.handle_request(&request, remote_addr).await;
        write_document(stream, &response).await?;
        Ok(())
    }

    /// Dispatch one request. Infallible by design: every internal problem
    /// becomes a `denied` or `error` response.
    pub async fn handle_request(&self, request: &A2aRequest, remote_addr: &str) -> A2aResponse {
        let peer_did = match self.store.find_by_token(&request.session_token) {
            Ok(Some(peer)) => peer,
            Ok(None) => {
                info!(request_id = %request.request_id, "request with invalid session token");
                return A2aResponse::denied(&request.request_id, "invalid or expired session token");
            }
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                return A2aResponse::error(&request.request_id, "session store unavailable");
            }
        };

        debug!(peer = %peer_did, request_type = ?request.request_type,
            request_id = %request.request_id, "dispatching request");

        match request.request_type {
            RequestType::AgentCard | RequestType::CapabilityQuery => self.answer_card(request),
            RequestType::ToolInvoke => self.invoke_tool(request, &peer_did, remote_addr).await,
            RequestType::PriceQuery => self.quote_price(request, &peer_did).await,
            RequestType::ToolInvokePaid => {
                self.invoke_tool_paid(request, &peer_did, remote_addr).await
            }
        }
    }

    // Discovery carries no execution risk; no firewall or approval gate.
    fn answer_card(&self, request: &A2aRequest) -> A2aResponse {
        match &self.cards {
            Some(cards) => A2aResponse::ok(&request.request_id, cards.card()),
            None => A2aResponse::error(&request.request_id, "no agent card provider configured"),
        }
    }

    async fn invoke_tool(
        &self,
        request: &A2aRequest,
        peer_did: &PeerDid,
        remote_addr: &str,
    ) -> A2aResponse {
        let Some(tool_name) = request.tool_name() else {
            return A2aResponse::error(&request.request_id, "payload missing toolName");
        };

        if let Some(response) = self.gate(request, peer_did, tool_name).await {
            return response;
        }
        if let Some(response) = self.approve(request, peer_did, remote_addr, tool_name).await {
            return response;
        }
        self.run_tool(request, peer_did, tool_name).await
    }

    async fn invoke_tool_paid(
        &self,
        request: &A2aRequest,
        peer_did: &PeerDid,
        remote_addr: &str,
    ) -> A2aResponse {
        let Some(tool_name) = request.tool_name() else {
            return A2aResponse::error(&request.request_id, "payload missing toolName");
        };

        if let Some(response) = self.gate(request, peer_did, tool_name).await {
            return response;
        }

        if let Some(payments) = &self.payments {
            let decision = match payments.check(peer_did, tool_name, Some(&request.payload)).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(peer = %peer_did, tool_name, error = %e, "payment gate failed");
                    return A2aResponse::error(&request.request_id, "payment gate unavailable");
                }
            };
            match decision.status {
                PaymentStatus::Free | PaymentStatus::Verified => {}
                PaymentStatus::PaymentRequired => {
                    info!(peer = %peer_did, tool_name, "payment required before invocation");
                    return A2aResponse::payment_required(
                        &request.request_id,
                        quote_map(tool_name, &decision),
                    );
                }
                PaymentStatus::Invalid => {
                    info!(peer = %peer_did, tool_name, "invalid payment authorization");
                    return A2aResponse::error(
                        &request.request_id,
                        "payment authorization invalid",
                    );
                }
            }
        }

        if let Some(response) = self.approve(request, peer_did, remote_addr, tool_name).await {
            return response;
        }
        self.run_tool(request, peer_did, tool_name).await
    }

    async fn quote_price(&self, request: &A2aRequest, peer_did: &PeerDid) -> A2aResponse {
        let Some(tool_name) = request.tool_name() else {
            return A2aResponse::error(&request.request_id, "payload missing toolName");
        };

        let Some(payments) = &self.payments else {
            return A2aResponse::ok(&request.request_id, free_map(tool_name));
        };
        match payments.check(peer_did, tool_name, Some(&request.payload)).await {
            Ok(decision) => match decision.status {
                PaymentStatus::Free | PaymentStatus::Verified => {
                    A2aResponse::ok(&request.request_id, free_map(tool_name))
                }
                PaymentStatus::PaymentRequired => {
                    A2aResponse::ok(&request.request_id, quote_map(tool_name, &decision))
                }
                PaymentStatus::Invalid => {
                    A2aResponse::error(&request.request_id, "payment authorization invalid")
                }
            },
            Err(e) => {
                warn!(peer = %peer_did, tool_name, error = %e, "payment gate failed");
                A2aResponse::error(&request.request_id, "payment gate unavailable")
            }
        }
    }

    // Some(response) short-circuits the invocation; None means proceed.
    async fn gate(
        &self,
        request: &A2aRequest,
        peer_did: &PeerDid,
        tool_name: &str,
    ) -> Option<A2aResponse> {
        match self.firewall.filter_query(peer_did, tool_name).await {
            Ok(FilterVerdict::Allow) => None,
            Ok(FilterVerdict::Deny(reason)) => {
                info!(peer = %peer_did, tool_name, %reason, "invocation blocked");
                Some(A2aResponse::denied(&request.request_id, reason.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "firewall unavailable");
                Some(A2aResponse::error(&request.request_id, "firewall unavailable"))
            }
        }
    }

    // Absent approval handler is itself a denial, never a pass-through.
    async fn approve(
        &self,
        request: &A2aRequest,
        peer_did: &PeerDid,
        remote_addr: &str,
        tool_name: &str,
    ) -> Option<A2aResponse> {
        let Some(approver) = &self.approver else {
            info!(peer = %peer_did, tool_name, "denied: {NO_APPROVER}");
            return Some(A2aResponse::denied(&request.request_id, NO_APPROVER));
        };
        let params = request.params();
        if approver
            .approve(peer_did, remote_addr, Some(tool_name), Some(&params))
            .await
        {
            None
        } else {
            info!(peer = %peer_did, tool_name, "owner denied the invocation");
            Some(A2aResponse::denied(&request.request_id, "owner denied the invocation"))
        }
    }

    async fn run_tool(
        &self,
        request: &A2aRequest,
        peer_did: &PeerDid,
        tool_name: &str,
    ) -> A2aResponse {
        let executor = match self.sandboxed_executor.as_ref().or(self.executor.as_ref()) {
            Some(executor) => Arc::clone(executor),
            None => return A2aResponse::error(&request.request_id, "no tool executor configured"),
        };

        // Run on a separate task so a panicking executor surfaces as a
        // join error instead of tearing down the stream handler.
        let name = tool_name.to_string();
        let params = request.params();
        let outcome =
            tokio::spawn(async move { executor.execute(&name, params).await }).await;

        match outcome {
            Ok(Ok(result)) => {
                if let Some(events) = &self.events {
                    events.record_tool_success(peer_did);
                }
                let sanitized = self.firewall.sanitize_response(&result);
                let attestation = self
                    .firewall
                    .attest_response(&sanitized, self.local_did.as_str())
                    .await;
                let mut response = A2aResponse::ok(&request.request_id, sanitized);
                response.attestation = attestation;
                response
            }
            Ok(Err(e)) => {
                info!(peer = %peer_did, tool_name, error = %e, "tool execution failed");
                if let Some(events) = &self.events {
                    events.record_tool_failure(peer_did);
                }
                A2aResponse::error(&request.request_id, format!("tool execution failed: {e}"))
            }
            Err(join_error) => {
                warn!(peer = %peer_did, tool_name, %join_error, "tool execution panicked");
                if let Some(events) = &self.events {
                    events.record_tool_failure(peer_did);
                }
                A2aResponse::error(&request.request_id, "tool execution panicked")
            }
        }
    }
}

fn free_map(tool_name: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("toolName".to_string(), Value::from(tool_name));
    map.insert("free".to_string(), Value::from(true));
    map
}

fn quote_map(tool_name: &str, decision: &arbor_types::PaymentDecision) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("toolName".to_string(), Value::from(tool_name));
    map.insert("free".to_string(), Value::from(false));
    if let Some(quote) = &decision.price_quote {
        if let Ok(Value::Object(quote)) = serde_json::to_value(quote) {
            map.insert("priceQuote".to_string(), Value::Object(quote));
        }
    }
    map
}
