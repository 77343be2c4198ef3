//! Thread-safe map of `server_id -> current downstream session id`.

use std::collections::HashMap;
use std::sync::Mutex;

pub struct SessionStore {
    inner: Mutex<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, server_id: &str) -> Option<String> {
        self.inner.lock().unwrap().get(server_id).cloned()
    }

    pub fn set(&self, server_id: &str, session_id: String) {
        self.inner.lock().unwrap().insert(server_id.to_string(), session_id);
    }

    pub fn delete(&self, server_id: &str) {
        self.inner.lock().unwrap().remove(server_id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
