//! The Hub Gateway: resolves an incoming MCP request to a target downstream
//! server, builds a fresh [`SubHandler`] for it from the current catalog
//! snapshot, and dispatches `initialize`/`tools/list`/`tools/call` against
//! that snapshot — proxying `tools/call` through to the real downstream.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::downstream_client::DownstreamClient;
use crate::core::models::ServerRecord;
use crate::core::registry::Registry;
use crate::core::session_store::SessionStore;
use crate::core::tool_catalog::{ToolCatalogEntry, ToolCatalogStore};
use crate::error::HubError;

const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Serialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Serialize, Debug)]
pub struct JsonRpcErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn from_error(id: Option<Value>, err: &HubError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody { code: err.jsonrpc_code(), message: err.to_string(), data: err.jsonrpc_data() }),
        }
    }
}

/// A schema-driven description of one proxied tool's parameters, derived
/// from the downstream's `inputSchema` rather than generated code.
#[derive(Debug)]
struct ProxyToolSpec {
    entry: ToolCatalogEntry,
    required: Vec<String>,
}

impl ProxyToolSpec {
    fn from_entry(entry: ToolCatalogEntry) -> Self {
        let required = entry
            .input_schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Self { entry, required }
    }

    fn as_tool_json(&self) -> Value {
        serde_json::json!({
            "name": self.entry.public_name,
            "description": self.entry.description,
            "inputSchema": self.entry.input_schema,
        })
    }

    /// Names of declared-required parameters absent from `arguments`.
    fn missing_required(&self, arguments: &Value) -> Vec<&str> {
        let present = arguments.as_object();
        self.required
            .iter()
            .filter(|key| !present.is_some_and(|o| o.contains_key(key.as_str())))
            .map(String::as_str)
            .collect()
    }

    /// Filters bound arguments down to the declared schema surface: known
    /// properties pass through, absent ones are dropped before forwarding.
    fn filter_arguments(&self, arguments: &Value) -> Value {
        let properties = self.entry.input_schema.get("properties").and_then(|v| v.as_object());
        let Some(args) = arguments.as_object() else {
            return Value::Object(Default::default());
        };
        match properties {
            Some(props) => {
                let mut filtered = serde_json::Map::new();
                for (key, value) in args {
                    if props.contains_key(key) {
                        filtered.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(filtered)
            }
            None => Value::Object(args.clone()),
        }
    }
}

/// An immutable per-request snapshot exposing one server's tools as proxy
/// tools. Built fresh for every gateway request under the construction
/// lock; it owns no background task or lifespan of its own.
struct SubHandler {
    server: ServerRecord,
    tools: Vec<ProxyToolSpec>,
}

impl SubHandler {
    fn name(&self) -> String {
        format!("hub-{}", self.server.name)
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": self.name(), "version": env!("CARGO_PKG_VERSION") },
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(ProxyToolSpec::as_tool_json).collect();
        serde_json::json!({ "tools": tools })
    }

    fn find_tool(&self, public_name: &str) -> Option<&ProxyToolSpec> {
        self.tools.iter().find(|t| t.entry.public_name == public_name)
    }
}

pub struct HubGateway {
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    catalog: Arc<ToolCatalogStore>,
    downstream: Arc<DownstreamClient>,
    /// Serializes per-server catalog refresh + sub-handler construction so
    /// concurrent requests for the same server don't race each other.
    construction_lock: AsyncMutex<()>,
}

impl HubGateway {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<SessionStore>,
        catalog: Arc<ToolCatalogStore>,
        downstream: Arc<DownstreamClient>,
    ) -> Self {
        Self { registry, sessions, catalog, downstream, construction_lock: AsyncMutex::new(()) }
    }

    /// Handles one upstream MCP JSON-RPC request addressed at `server_id`.
    pub async fn handle(&self, server_id: &str, id: Option<Value>, method: &str, params: Option<Value>) -> JsonRpcResponse {
        let server = match self.registry.get(server_id) {
            Some(s) => s,
            None => return JsonRpcResponse::from_error(id, &HubError::NotFound(server_id.to_string())),
        };

        let sub_handler = {
            let _guard = self.construction_lock.lock().await;
            match self.build_sub_handler(&server).await {
                Ok(h) => h,
                Err(e) => {
                    return JsonRpcResponse::from_error(
                        id,
                        &HubError::protocol(-32050, format!("failed to prepare target server: {e}")),
                    )
                }
            }
        };

        match method {
            "initialize" => JsonRpcResponse::ok(id, sub_handler.handle_initialize()),
            "tools/list" => JsonRpcResponse::ok(id, sub_handler.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(&sub_handler, params).await {
                Ok(result) => JsonRpcResponse::ok(id, result),
                Err(e) => JsonRpcResponse::from_error(id, &e),
            },
            other => JsonRpcResponse::from_error(id, &HubError::protocol(-32601, format!("method not found: {other}"))),
        }
    }

    async fn build_sub_handler(&self, server: &ServerRecord) -> Result<SubHandler, HubError> {
        self.catalog.refresh_server(&server.id).await;
        let entries = self.catalog.list_by_server(&server.id);
        let tools = entries.into_iter().map(ProxyToolSpec::from_entry).collect();
        Ok(SubHandler { server: server.clone(), tools })
    }

    async fn handle_tools_call(&self, sub_handler: &SubHandler, params: Option<Value>) -> Result<Value, HubError> {
        let params = params.ok_or_else(|| HubError::protocol(-32602, "invalid params"))?;
        let public_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));

        let spec = sub_handler.find_tool(public_name).ok_or_else(|| HubError::ToolNotFound(public_name.to_string()))?;

        let missing = spec.missing_required(&arguments);
        if !missing.is_empty() {
            return Err(HubError::protocol(-32602, format!("missing required argument(s): {}", missing.join(", "))));
        }

        let filtered = spec.filter_arguments(&arguments);

        let record = self
            .registry
            .get(&spec.entry.source_server_id)
            .ok_or_else(|| HubError::NotFound(spec.entry.source_server_id.clone()))?;

        self.call_downstream_tool(&record, &spec.entry.source_tool_name, filtered).await
    }

    /// Calls a downstream tool, lazily creating a session and retrying
    /// exactly once if the downstream reports the session expired.
    async fn call_downstream_tool(&self, record: &ServerRecord, tool_name: &str, arguments: Value) -> Result<Value, HubError> {
        let session_id = match self.sessions.get(&record.id) {
            Some(sid) => sid,
            None => {
                let sid = self.downstream.initialize(record).await?;
                self.sessions.set(&record.id, sid.clone());
                sid
            }
        };

        match self.downstream.call_tool(record, &session_id, tool_name, arguments.clone()).await {
            Ok(result) => Ok(result),
            Err(HubError::SessionExpired) => {
                let fresh = self.downstream.initialize(record).await?;
                self.sessions.set(&record.id, fresh.clone());
                self.downstream.call_tool(record, &fresh, tool_name, arguments).await
            }
            Err(e) => Err(e),
        }
    }

    /// Cascading cleanup invoked by the admin boundary after a server is
    /// deleted: drops catalog entries and the cached session.
    pub fn forget_server(&self, server_id: &str) {
        self.catalog.delete_server(server_id);
        self.sessions.delete(server_id);
    }

    pub async fn refresh_server(&self, server_id: &str) {
        if self.registry.get(server_id).is_none() {
            self.forget_server(server_id);
            return;
        }
        self.catalog.refresh_server(server_id).await;
    }

    pub async fn refresh_all(&self) {
        self.catalog.refresh_all().await;
    }
}

/// Parses the `x-mcp-server-id` request header, per the gateway's header
/// contract: missing or empty is a JSON-RPC `-32602` error, not an HTTP one.
pub fn require_server_id(headers: &HashMap<String, String>) -> Result<String, HubError> {
    let value = headers.get("x-mcp-server-id").map(|s| s.trim()).unwrap_or("");
    if value.is_empty() {
        Err(HubError::protocol(-32602, "x-mcp-server-id required"))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(public_name: &str) -> ToolCatalogEntry {
        ToolCatalogEntry {
            public_name: public_name.to_string(),
            source_server_id: "s1".into(),
            source_server_name: "remote".into(),
            source_tool_name: "echo".into(),
            description: "echoes input".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        }
    }

    #[test]
    fn filters_unknown_arguments() {
        let spec = ProxyToolSpec::from_entry(entry("remote.echo"));
        let filtered = spec.filter_arguments(&json!({"text": "hi", "bogus": 1}));
        assert_eq!(filtered, json!({"text": "hi"}));
    }

    #[test]
    fn detects_missing_required_argument() {
        let spec = ProxyToolSpec::from_entry(entry("remote.echo"));
        assert_eq!(spec.missing_required(&json!({"bogus": 1})), vec!["text"]);
        assert!(spec.missing_required(&json!({"text": "hi"})).is_empty());
    }

    #[test]
    fn missing_header_is_rejected() {
        let headers = HashMap::new();
        let err = require_server_id(&headers).unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32602);
    }

    #[test]
    fn present_header_passes_through() {
        let mut headers = HashMap::new();
        headers.insert("x-mcp-server-id".to_string(), "abc".to_string());
        assert_eq!(require_server_id(&headers).unwrap(), "abc");
    }
}

/// End-to-end tests against a mock downstream (S1/S2/S4 from SPEC_FULL.md §8),
/// driving [`HubGateway::handle`] directly rather than going through actix.
#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use crate::core::tool_catalog::ToolCatalogStore;

    /// Mints a fresh `mcp-session-id` on every `initialize` call so session
    /// recovery after a 404 observably gets a new session, not a reused one.
    struct IncrementingSession {
        counter: AtomicU32,
    }

    impl Respond for IncrementingSession {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", format!("s{n}"))
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}}))
        }
    }

    /// Returns HTTP 404 on its first invocation, then a successful result —
    /// the downstream behavior S4 exercises.
    struct FlakyCallOnce {
        tripped: AtomicBool,
    }

    impl Respond for FlakyCallOnce {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                ResponseTemplate::new(404)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": { "content": [{ "type": "text", "text": "hello" }] }
                }))
            }
        }
    }

    async fn mount_initialize(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(IncrementingSession { counter: AtomicU32::new(0) })
            .mount(mock_server)
            .await;
    }

    async fn mount_list_tools(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "tools": [{
                        "name": "echo",
                        "description": "echoes input",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "text": { "type": "string" } },
                            "required": ["text"]
                        }
                    }]
                }
            })))
            .mount(mock_server)
            .await;
    }

    async fn build_gateway(mock_uri: &str) -> (HubGateway, String) {
        let registry = Arc::new(Registry::new());
        let sessions = Arc::new(SessionStore::new());
        let downstream = Arc::new(DownstreamClient::new(Duration::from_secs(5)));
        let catalog = Arc::new(ToolCatalogStore::new(registry.clone(), sessions.clone(), downstream.clone()));
        let gateway = HubGateway::new(registry.clone(), sessions.clone(), catalog, downstream);

        let record = registry
            .create("remote".into(), mock_uri.to_string(), "/mcp".into(), String::new(), vec![], HashMap::new())
            .unwrap();
        (gateway, record.id)
    }

    #[tokio::test]
    async fn s1_register_then_list_tools() {
        let mock_server = MockServer::start().await;
        mount_initialize(&mock_server).await;
        mount_list_tools(&mock_server).await;

        let (gateway, server_id) = build_gateway(&mock_server.uri()).await;

        let response = gateway.handle(&server_id, Some(json!(1)), "tools/list", None).await;
        let names: Vec<&str> = response.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["remote.echo"]);
    }

    #[tokio::test]
    async fn s2_proxy_call_returns_downstream_payload() {
        let mock_server = MockServer::start().await;
        mount_initialize(&mock_server).await;
        mount_list_tools(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "content": [{ "type": "text", "text": "hello" }] }
            })))
            .mount(&mock_server)
            .await;

        let (gateway, server_id) = build_gateway(&mock_server.uri()).await;

        let params = json!({ "name": "remote.echo", "arguments": { "text": "hello" } });
        let response = gateway.handle(&server_id, Some(json!(2)), "tools/call", Some(params)).await;
        assert_eq!(response.result.unwrap(), json!({ "content": [{ "type": "text", "text": "hello" }] }));
    }

    #[tokio::test]
    async fn s4_session_recovery_on_404() {
        let mock_server = MockServer::start().await;
        mount_initialize(&mock_server).await;
        mount_list_tools(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(FlakyCallOnce { tripped: AtomicBool::new(false) })
            .mount(&mock_server)
            .await;

        let (gateway, server_id) = build_gateway(&mock_server.uri()).await;

        let params = json!({ "name": "remote.echo", "arguments": { "text": "hello" } });
        let response = gateway.handle(&server_id, Some(json!(3)), "tools/call", Some(params)).await;
        assert_eq!(response.result.unwrap(), json!({ "content": [{ "type": "text", "text": "hello" }] }));
    }
}
