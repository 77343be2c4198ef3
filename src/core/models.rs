//! Data types shared across the registry, catalog, and admin boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A downstream MCP server registered with the hub.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub mcp_endpoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerRecord {
    /// Full MCP endpoint URL this record's client should talk to.
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url, self.mcp_endpoint)
    }
}

/// Admin request body to register a new downstream server.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerCreateRequest {
    pub name: String,
    pub base_url: String,
    pub mcp_endpoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One entry of the client-config blob a CRUD collaborator hands to an
/// MCP-aware client so it knows how to reach the hub for a given server.
#[derive(Clone, Debug, Serialize)]
pub struct McpServerConfigItem {
    pub url: String,
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct McpServersConfigResponse {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerConfigItem>,
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
