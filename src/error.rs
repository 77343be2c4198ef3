//! Error taxonomy shared across the hub's core components.
//!
//! Every fallible operation in `core::` returns [`HubError`] so callers can
//! propagate with `?` regardless of which component raised it. HTTP-facing
//! code (the admin router, the gateway) is the only place these get mapped
//! to status codes or JSON-RPC error objects.

use serde_json::Value;

/// Errors raised by the registry, session store, downstream client, tool
/// catalog, and gateway.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A server with this name is already registered.
    #[error("server name already registered: {0}")]
    NameConflict(String),

    /// A create request omitted a required, non-empty field.
    #[error("invalid server registration: {0}")]
    InvalidInput(String),

    /// No record exists for the given server id.
    #[error("server not found: {0}")]
    NotFound(String),

    /// No tool exists for the given public name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The downstream HTTP request failed at the transport level (network,
    /// timeout, or a non-2xx status that isn't a session-expiry 404).
    #[error("downstream transport error: {0}")]
    TransportError(String),

    /// The downstream responded but violated the MCP JSON-RPC envelope.
    #[error("downstream protocol error: {0}")]
    ProtocolError(String),

    /// The downstream reported (via HTTP 404 on a session-bearing request)
    /// that the session id the hub was using has expired.
    #[error("downstream session expired")]
    SessionExpired,

    /// A generic protocol-level error to surface to the upstream client as
    /// a JSON-RPC error object, carrying the code that should be used.
    #[error("{message}")]
    Protocol { code: i32, message: String, data: Option<Value> },
}

impl HubError {
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        HubError::Protocol { code, message: message.into(), data: None }
    }

    /// Maps this error onto the JSON-RPC error code the gateway should
    /// return to the upstream client.
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            HubError::NameConflict(_) => -32602,
            HubError::InvalidInput(_) => -32602,
            HubError::NotFound(_) => -32004,
            HubError::ToolNotFound(_) => -32601,
            HubError::TransportError(_) => -32050,
            HubError::ProtocolError(_) => -32050,
            HubError::SessionExpired => -32050,
            HubError::Protocol { code, .. } => *code,
        }
    }

    pub fn jsonrpc_data(&self) -> Option<Value> {
        match self {
            HubError::Protocol { data, .. } => data.clone(),
            _ => None,
        }
    }
}
