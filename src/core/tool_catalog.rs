//! Aggregated view of tools exposed by every registered downstream server,
//! name-spaced as `<server_name>.<tool_name>`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use crate::core::downstream_client::DownstreamClient;
use crate::core::models::ServerRecord;
use crate::core::registry::Registry;
use crate::core::session_store::SessionStore;
use crate::error::HubError;

/// A single tool exposed by a downstream server, as seen through the hub's
/// flat namespace.
#[derive(Clone, Debug)]
pub struct ToolCatalogEntry {
    pub public_name: String,
    pub source_server_id: String,
    pub source_server_name: String,
    pub source_tool_name: String,
    pub description: String,
    pub input_schema: Value,
}

struct CatalogState {
    by_public_name: HashMap<String, ToolCatalogEntry>,
    by_server: HashMap<String, HashSet<String>>,
}

impl CatalogState {
    fn new() -> Self {
        Self { by_public_name: HashMap::new(), by_server: HashMap::new() }
    }

    fn replace_server(&mut self, server_id: &str, entries: Vec<ToolCatalogEntry>) {
        if let Some(existing) = self.by_server.remove(server_id) {
            for name in existing {
                self.by_public_name.remove(&name);
            }
        }
        let mut names = HashSet::new();
        for entry in entries {
            names.insert(entry.public_name.clone());
            self.by_public_name.insert(entry.public_name.clone(), entry);
        }
        self.by_server.insert(server_id.to_string(), names);
    }

    fn drop_server(&mut self, server_id: &str) {
        if let Some(existing) = self.by_server.remove(server_id) {
            for name in existing {
                self.by_public_name.remove(&name);
            }
        }
    }
}

/// Holds the aggregated catalog and the collaborators needed to refresh it.
pub struct ToolCatalogStore {
    state: Mutex<CatalogState>,
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    downstream: Arc<DownstreamClient>,
}

impl ToolCatalogStore {
    pub fn new(registry: Arc<Registry>, sessions: Arc<SessionStore>, downstream: Arc<DownstreamClient>) -> Self {
        Self { state: Mutex::new(CatalogState::new()), registry, sessions, downstream }
    }

    pub fn get(&self, public_name: &str) -> Option<ToolCatalogEntry> {
        self.state.lock().unwrap().by_public_name.get(public_name).cloned()
    }

    pub fn list_all(&self) -> Vec<ToolCatalogEntry> {
        let guard = self.state.lock().unwrap();
        let mut entries: Vec<ToolCatalogEntry> = guard.by_public_name.values().cloned().collect();
        entries.sort_by(|a, b| a.public_name.cmp(&b.public_name));
        entries
    }

    pub fn list_by_server(&self, server_id: &str) -> Vec<ToolCatalogEntry> {
        let guard = self.state.lock().unwrap();
        let mut entries: Vec<ToolCatalogEntry> = guard
            .by_server
            .get(server_id)
            .map(|names| names.iter().filter_map(|n| guard.by_public_name.get(n).cloned()).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.public_name.cmp(&b.public_name));
        entries
    }

    pub fn delete_server(&self, server_id: &str) {
        self.state.lock().unwrap().drop_server(server_id);
    }

    /// Re-enumerates the tools exposed by one server and atomically
    /// replaces its slice of the catalog. Returns the number of tools now
    /// registered for that server.
    ///
    /// On a session-expiry, re-initializes once and retries `tools/list`.
    /// On any other failure, drops the server's existing entries (the
    /// server record itself stays registered) so a single bad downstream
    /// cannot poison the rest of the catalog.
    pub async fn refresh_server(&self, server_id: &str) -> usize {
        let record = match self.registry.get(server_id) {
            Some(r) => r,
            None => {
                self.delete_server(server_id);
                return 0;
            }
        };

        match self.list_tools_with_retry(&record).await {
            Ok(tools) => {
                let entries = project_entries(&record, tools);
                let count = entries.len();
                self.state.lock().unwrap().replace_server(server_id, entries);
                count
            }
            Err(e) => {
                warn!(server = %record.name, error = %e, "dropping catalog entries after refresh failure");
                self.delete_server(server_id);
                0
            }
        }
    }

    async fn list_tools_with_retry(&self, record: &ServerRecord) -> Result<Vec<Value>, HubError> {
        let session_id = self.get_or_init_session(record).await?;

        match self.downstream.list_tools(record, &session_id).await {
            Ok(result) => Ok(extract_tools(result)),
            Err(HubError::SessionExpired) => {
                let fresh = self.downstream.initialize(record).await?;
                self.sessions.set(&record.id, fresh.clone());
                let result = self.downstream.list_tools(record, &fresh).await?;
                Ok(extract_tools(result))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_or_init_session(&self, record: &ServerRecord) -> Result<String, HubError> {
        if let Some(sid) = self.sessions.get(&record.id) {
            return Ok(sid);
        }
        let sid = self.downstream.initialize(record).await?;
        self.sessions.set(&record.id, sid.clone());
        Ok(sid)
    }

    /// Refreshes every registered server, sequentially. A failure on one
    /// server must not prevent others from refreshing.
    pub async fn refresh_all(&self) {
        for record in self.registry.list() {
            let count = self.refresh_server(&record.id).await;
            info!(server = %record.name, tools = count, "refreshed catalog");
        }
    }
}

fn extract_tools(result: Value) -> Vec<Value> {
    result.get("tools").and_then(|t| t.as_array()).cloned().unwrap_or_default()
}

fn project_entries(record: &ServerRecord, tools: Vec<Value>) -> Vec<ToolCatalogEntry> {
    tools
        .into_iter()
        .filter_map(|tool| {
            let name = tool.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
            if name.is_empty() {
                return None;
            }
            let description = tool.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let input_schema = tool.get("inputSchema").cloned().unwrap_or_else(|| Value::Object(Default::default()));
            Some(ToolCatalogEntry {
                public_name: format!("{}.{}", record.name, name),
                source_server_id: record.id.clone(),
                source_server_name: record.name.clone(),
                source_tool_name: name,
                description,
                input_schema,
            })
        })
        .collect()
}
