//! In-memory store of registered downstream servers.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::core::models::{utc_now, ServerRecord};
use crate::error::HubError;

/// Thread-safe store of [`ServerRecord`]s, keyed by id with a secondary
/// uniqueness constraint on `name`. All mutations are serialized under a
/// single mutex; `list()` returns a snapshot that's safe to iterate without
/// holding the lock.
pub struct Registry {
    inner: Mutex<HashMap<String, ServerRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    /// Registers a new server. Fails with [`HubError::NameConflict`] if
    /// `name` is already taken. `base_url` is normalized by stripping one
    /// trailing slash.
    pub fn create(
        &self,
        name: String,
        base_url: String,
        mcp_endpoint: String,
        description: String,
        tags: Vec<String>,
        headers: HashMap<String, String>,
    ) -> Result<ServerRecord, HubError> {
        if name.trim().is_empty() {
            return Err(HubError::InvalidInput("name must not be empty".into()));
        }
        if base_url.trim().is_empty() {
            return Err(HubError::InvalidInput("base_url must not be empty".into()));
        }
        if mcp_endpoint.trim().is_empty() {
            return Err(HubError::InvalidInput("mcp_endpoint must not be empty".into()));
        }

        let mut guard = self.inner.lock().unwrap();
        if guard.values().any(|r| r.name == name) {
            return Err(HubError::NameConflict(name));
        }

        let now = utc_now();
        let record = ServerRecord {
            id: Uuid::new_v4().to_string(),
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            mcp_endpoint,
            description,
            tags,
            headers,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };

        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<ServerRecord> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn list(&self) -> Vec<ServerRecord> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// Removes the record if present. Idempotent: deleting an unknown id is
    /// not an error.
    pub fn delete(&self, id: &str) {
        self.inner.lock().unwrap().remove(id);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new()
    }

    #[test]
    fn create_then_get_roundtrips() {
        let reg = registry();
        let rec = reg
            .create(
                "remote".into(),
                "http://downstream".into(),
                "/mcp".into(),
                String::new(),
                vec![],
                HashMap::new(),
            )
            .unwrap();
        let fetched = reg.get(&rec.id).unwrap();
        assert_eq!(fetched.name, "remote");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let reg = registry();
        let rec = reg
            .create(
                "remote".into(),
                "http://downstream/".into(),
                "/mcp".into(),
                String::new(),
                vec![],
                HashMap::new(),
            )
            .unwrap();
        assert_eq!(rec.base_url, "http://downstream");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = registry();
        reg.create(
            "remote".into(),
            "http://a".into(),
            "/mcp".into(),
            String::new(),
            vec![],
            HashMap::new(),
        )
        .unwrap();

        let err = reg
            .create("remote".into(), "http://b".into(), "/mcp".into(), String::new(), vec![], HashMap::new())
            .unwrap_err();
        assert!(matches!(err, HubError::NameConflict(_)));
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let reg = registry();
        let err = reg
            .create(String::new(), "http://a".into(), "/mcp".into(), String::new(), vec![], HashMap::new())
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let reg = registry();
        let err = reg
            .create("remote".into(), String::new(), "/mcp".into(), String::new(), vec![], HashMap::new())
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
    }

    #[test]
    fn empty_mcp_endpoint_is_rejected() {
        let reg = registry();
        let err = reg
            .create("remote".into(), "http://a".into(), String::new(), String::new(), vec![], HashMap::new())
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
    }

    #[test]
    fn delete_is_idempotent() {
        let reg = registry();
        let rec = reg
            .create(
                "remote".into(),
                "http://a".into(),
                "/mcp".into(),
                String::new(),
                vec![],
                HashMap::new(),
            )
            .unwrap();
        reg.delete(&rec.id);
        reg.delete(&rec.id);
        assert!(reg.get(&rec.id).is_none());
        assert!(reg.list().is_empty());
    }
}
