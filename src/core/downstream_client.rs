//! JSON-RPC client for the MCP streamable-HTTP transport, used to talk to a
//! single downstream server per call. One [`DownstreamClient`] is shared
//! across all registered servers; each method takes the target
//! [`ServerRecord`] and, where relevant, the session id to use.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::models::ServerRecord;
use crate::error::HubError;

pub const MCP_SESSION_HEADER: &str = "mcp-session-id";
const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Serialize, Debug)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: i64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct RpcResponse {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorBody {
    #[allow(dead_code)]
    code: i32,
    message: String,
}

/// Outcome of a single downstream round trip, before the caller decides
/// what to do with a `SessionExpired`.
pub struct DownstreamClient {
    http: reqwest::Client,
}

impl DownstreamClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self { http }
    }

    /// Sends `initialize` to the server and returns the session id carried
    /// on the `mcp-session-id` response header.
    pub async fn initialize(&self, server: &ServerRecord) -> Result<String, HubError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-hub",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });

        let (response, headers) = self.send(server, None, "initialize", Some(params)).await?;

        if let Some(error) = response.error {
            return Err(HubError::ProtocolError(error.message));
        }

        headers
            .get(MCP_SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| HubError::ProtocolError("initialize response missing mcp-session-id header".into()))
    }

    /// Calls `tools/list` and returns the raw result value (`{"tools": [...]}`).
    pub async fn list_tools(&self, server: &ServerRecord, session_id: &str) -> Result<Value, HubError> {
        let (response, _) = self.send(server, Some(session_id), "tools/list", None).await?;
        if let Some(error) = response.error {
            return Err(HubError::ProtocolError(error.message));
        }
        Ok(response.result.unwrap_or_else(|| json!({})))
    }

    /// Calls `tools/call` with the given tool name and arguments and
    /// returns the `result` payload verbatim.
    pub async fn call_tool(
        &self,
        server: &ServerRecord,
        session_id: &str,
        name: &str,
        arguments: Value,
    ) -> Result<Value, HubError> {
        let params = json!({ "name": name, "arguments": arguments });
        let (response, _) = self.send(server, Some(session_id), "tools/call", Some(params)).await?;
        if let Some(error) = response.error {
            return Err(HubError::ProtocolError(error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn send(
        &self,
        server: &ServerRecord,
        session_id: Option<&str>,
        method: &str,
        params: Option<Value>,
    ) -> Result<(RpcResponse, HeaderMap), HubError> {
        static NEXT_ID: AtomicI64 = AtomicI64::new(1);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            params,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        for (k, v) in &server.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(v)) {
                headers.insert(name, value);
            }
        }
        if let Some(sid) = session_id {
            if let Ok(value) = HeaderValue::from_str(sid) {
                headers.insert(HeaderName::from_static(MCP_SESSION_HEADER), value);
            }
        }

        let url = server.endpoint_url();
        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HubError::TransportError(format!("timed out calling {url}"))
                } else {
                    HubError::TransportError(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 404 && session_id.is_some() {
            return Err(HubError::SessionExpired);
        }
        if status.as_u16() >= 400 {
            return Err(HubError::TransportError(format!("downstream returned HTTP {status}")));
        }

        let response_headers = resp.headers().clone();
        let content_type = response_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body_text = resp.text().await.map_err(|e| HubError::TransportError(e.to_string()))?;
        let parsed = parse_response_body(&content_type, &body_text)?;
        let rpc: RpcResponse = serde_json::from_value(parsed)
            .map_err(|e| HubError::ProtocolError(format!("malformed JSON-RPC response: {e}")))?;

        if rpc.jsonrpc.as_deref() != Some("2.0") {
            return Err(HubError::ProtocolError("response missing jsonrpc 2.0 envelope".into()));
        }

        Ok((rpc, response_headers))
    }
}

/// Parses a downstream response body according to its content type. SSE
/// bodies carry one JSON-RPC message spread across `data:` lines; anything
/// else is parsed as a single JSON document.
fn parse_response_body(content_type: &str, body: &str) -> Result<Value, HubError> {
    if content_type.starts_with("text/event-stream") {
        let data_lines: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|line| line.trim_start())
            .collect();
        if data_lines.is_empty() {
            return Err(HubError::ProtocolError("empty SSE response body".into()));
        }
        let joined = data_lines.join("\n");
        serde_json::from_str(&joined).map_err(|e| HubError::ProtocolError(format!("invalid SSE payload: {e}")))
    } else {
        serde_json::from_str(body).map_err(|e| HubError::ProtocolError(format!("invalid JSON body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let parsed = parse_response_body("application/json", body).unwrap();
        assert_eq!(parsed["result"]["tools"], json!([]));
    }

    #[test]
    fn parses_sse_framed_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\n\
data: \"result\":{\"ok\":true}}\n\n";
        let parsed = parse_response_body("text/event-stream; charset=utf-8", body).unwrap();
        assert_eq!(parsed["result"]["ok"], json!(true));
    }

    #[test]
    fn rejects_empty_sse_body() {
        let err = parse_response_body("text/event-stream", "\n\n").unwrap_err();
        assert!(matches!(err, HubError::ProtocolError(_)));
    }
}
