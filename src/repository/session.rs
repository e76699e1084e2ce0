use std::collections::HashMap;
use std::sync::RwLock;

use crate::usecase::contracts::TokenProvider;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Key/value storage scoped to the current till session. Nothing is
/// persisted; a restart starts from an empty store.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = match self.entries.read() {
            Ok(e) => e,
            Err(p) => p.into_inner(),
        };
        entries.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(p) => p.into_inner(),
        };
        entries.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(p) => p.into_inner(),
        };
        entries.remove(key)
    }

    pub fn set_access_token(&self, token: &str) {
        self.set(ACCESS_TOKEN_KEY, token);
    }
}

impl TokenProvider for SessionStore {
    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }
}
