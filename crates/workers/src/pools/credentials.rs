use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Basic-auth material for query connectors, keyed by the connector's pool
/// key (cluster-scoped connectors use an empty namespace).
#[derive(Clone, Default)]
pub struct CredentialsPool {
    entries: Arc<DashMap<String, Credentials>>,
}

impl CredentialsPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Credentials> {
        self.entries.get(key).map(|c| c.clone())
    }

    pub fn set(&self, key: String, credentials: Credentials) {
        self.entries.insert(key, credentials);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
