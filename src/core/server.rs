/// HTTP wiring for the hub: actix-web app state, route handlers for the
/// `/mcp/` gateway endpoint and the `/api/servers` admin boundary, and the
/// server bootstrap function.
use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpRequest, HttpResponse, HttpServer, Result,
};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::core::downstream_client::DownstreamClient;
use crate::core::gateway::{require_server_id, HubGateway};
use crate::core::models::{
    McpServerConfigItem, McpServersConfigResponse, ServerCreateRequest,
};
use crate::core::refresh::spawn_refresh_loop;
use crate::core::registry::Registry;
use crate::core::session_store::SessionStore;
use crate::core::tool_catalog::ToolCatalogStore;
use crate::error::HubError;

/// Shared application state, cloned into every actix worker thread.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub gateway: Arc<HubGateway>,
}

async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

#[derive(Deserialize, Debug)]
struct JsonRpcEnvelope {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// `POST /mcp/` — the hub's single upstream-facing MCP endpoint. Resolves
/// the target server from `x-mcp-server-id`, builds a fresh sub-handler
/// snapshot, and dispatches the request against it. Protocol-level errors
/// are always returned as JSON-RPC error objects at HTTP 200.
async fn mcp_gateway(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    body: web::Json<JsonRpcEnvelope>,
) -> Result<HttpResponse> {
    let headers: std::collections::HashMap<String, String> = http_req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
        .collect();

    let server_id = match require_server_id(&headers) {
        Ok(id) => id,
        Err(e) => return Ok(HttpResponse::Ok().json(crate::core::gateway::JsonRpcResponse::from_error(body.id.clone(), &e))),
    };

    let response = state.gateway.handle(&server_id, body.id.clone(), &body.method, body.params.clone()).await;
    Ok(HttpResponse::Ok().json(response))
}

/// `POST /api/servers` — register a new downstream server.
async fn create_server(state: web::Data<AppState>, body: web::Json<ServerCreateRequest>) -> Result<HttpResponse> {
    let req = body.into_inner();
    match state.registry.create(req.name, req.base_url, req.mcp_endpoint, req.description, req.tags, req.headers) {
        Ok(record) => {
            // Best-effort: a refresh failure must not roll back registration.
            state.gateway.refresh_server(&record.id).await;
            Ok(HttpResponse::Created().json(record))
        }
        Err(HubError::NameConflict(name)) => {
            Ok(HttpResponse::Conflict().json(serde_json::json!({ "error": format!("name already registered: {name}") })))
        }
        Err(e @ HubError::InvalidInput(_)) => {
            Ok(HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })))
        }
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() }))),
    }
}

/// `GET /api/servers` — list all registered servers.
async fn list_servers(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.registry.list()))
}

/// `GET /api/servers/{id}` — fetch one server record.
async fn get_server(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    match state.registry.get(&path) {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({ "error": "server not found" }))),
    }
}

/// `DELETE /api/servers/{id}` — deregister a server; cascades to the
/// catalog and session store.
async fn delete_server(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    if state.registry.get(&id).is_none() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({ "error": "server not found" })));
    }
    state.registry.delete(&id);
    state.gateway.forget_server(&id);
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
struct ClientConfigQuery {
    upstream_base_url: String,
}

/// `GET /api/servers/{id}/client-config` — builds the `mcpServers` blob an
/// MCP-aware client can drop straight into its own config to reach this
/// server through the hub.
async fn client_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ClientConfigQuery>,
) -> Result<HttpResponse> {
    let record = match state.registry.get(&path) {
        Some(r) => r,
        None => return Ok(HttpResponse::NotFound().json(serde_json::json!({ "error": "server not found" }))),
    };

    let mut headers = std::collections::HashMap::new();
    headers.insert("x-mcp-server-id".to_string(), record.id.clone());

    let mut mcp_servers = std::collections::HashMap::new();
    mcp_servers.insert(
        record.name.clone(),
        McpServerConfigItem { url: format!("{}/mcp/", query.upstream_base_url.trim_end_matches('/')), headers },
    );

    Ok(HttpResponse::Ok().json(McpServersConfigResponse { mcp_servers }))
}

/// Runs the hub's HTTP server until shutdown, wiring up the core
/// components and spawning the background refresh loop.
pub async fn run_server_http(config: Config) -> std::io::Result<()> {
    let bind_addr = format!("{}:{}", config.host, config.port);

    let registry = Arc::new(Registry::new());
    let sessions = Arc::new(SessionStore::new());
    let downstream = Arc::new(DownstreamClient::new(Duration::from_secs(config.downstream_timeout_secs)));
    let catalog = Arc::new(ToolCatalogStore::new(registry.clone(), sessions.clone(), downstream.clone()));
    let gateway = Arc::new(HubGateway::new(registry.clone(), sessions.clone(), catalog.clone(), downstream.clone()));

    let refresh_handle = spawn_refresh_loop(gateway.clone(), Duration::from_secs(config.refresh_interval_secs));

    let app_state = web::Data::new(AppState { registry, gateway });

    tracing::info!(
        bind = %bind_addr,
        workers = config.worker_threads,
        downstream_timeout_secs = config.downstream_timeout_secs,
        refresh_interval_secs = config.refresh_interval_secs,
        "mcp hub starting"
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .wrap(Logger::new("%r %s %Dms"))
            .route("/health", web::get().to(health))
            .route("/mcp/", web::post().to(mcp_gateway))
            .route("/api/servers", web::post().to(create_server))
            .route("/api/servers", web::get().to(list_servers))
            .route("/api/servers/{id}", web::get().to(get_server))
            .route("/api/servers/{id}", web::delete().to(delete_server))
            .route("/api/servers/{id}/client-config", web::get().to(client_config))
    })
    .workers(config.worker_threads)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run();

    // actix-web installs its own SIGINT/SIGTERM handlers and resolves this
    // future once graceful shutdown completes; the refresh loop is
    // cancelled immediately after, since it has no in-flight state worth
    // draining beyond a single downstream call already covered by its own
    // timeout.
    let result = server.await;
    refresh_handle.abort();
    result
}
