//! A2A request/response envelopes and payment types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of A2A request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    ToolInvoke,
    CapabilityQuery,
    AgentCard,
    PriceQuery,
    ToolInvokePaid,
}

impl RequestType {
    /// Discovery requests skip the firewall and approval gates; they carry
    /// no execution risk.
    pub fn is_informational(&self) -> bool {
        matches!(self, RequestType::AgentCard | RequestType::CapabilityQuery)
    }
}

/// Outcome class of an A2A response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
    Denied,
    PaymentRequired,
}

/// Request envelope, one JSON document per stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct A2aRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    /// Token minted during the handshake; required for every request type.
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    /// Client-generated ID, echoed back verbatim.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Request-type-specific fields. Tool invocation carries `toolName`
    /// and `params`; paid invocation additionally carries `paymentAuth`.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl A2aRequest {
    /// The `toolName` payload field, when present.
    pub fn tool_name(&self) -> Option<&str> {
        self.payload.get("toolName").and_then(Value::as_str)
    }

    /// The `params` payload field, defaulting to an empty object.
    pub fn params(&self) -> Map<String, Value> {
        match self.payload.get("params") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct A2aResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationData>,
    /// Unix seconds when the response was produced.
    pub timestamp: i64,
}

impl A2aResponse {
    fn base(request_id: &str, status: ResponseStatus) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            result: None,
            error: None,
            attestation: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn ok(request_id: &str, result: Map<String, Value>) -> Self {
        Self {
            result: Some(result),
            ..Self::base(request_id, ResponseStatus::Ok)
        }
    }

    pub fn error(request_id: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::base(request_id, ResponseStatus::Error)
        }
    }

    pub fn denied(request_id: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::base(request_id, ResponseStatus::Denied)
        }
    }

    pub fn payment_required(request_id: &str, quote: Map<String, Value>) -> Self {
        Self {
            result: Some(quote),
            ..Self::base(request_id, ResponseStatus::PaymentRequired)
        }
    }
}

/// Zero-knowledge attestation attached to a response.
///
/// Opaque to the dispatcher; produced and consumed only through the
/// pluggable attestor and verifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationData {
    pub proof: Value,
    #[serde(rename = "publicInputs")]
    pub public_inputs: Value,
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    pub scheme: String,
}

/// Payment gate verdict for a tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Tool is free; proceed.
    Free,
    /// Payment authorization checked out; proceed.
    Verified,
    /// Caller must pay first; respond with the price quote.
    PaymentRequired,
    /// Authorization present but bad; hard error.
    Invalid,
}

/// Price quote for a paid tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub amount: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Full payment gate decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentDecision {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(rename = "priceQuote", default, skip_serializing_if = "Option::is_none")]
    pub price_quote: Option<PriceQuote>,
}

impl PaymentDecision {
    pub fn free() -> Self {
        Self {
            status: PaymentStatus::Free,
            auth: None,
            price_quote: None,
        }
    }
}
