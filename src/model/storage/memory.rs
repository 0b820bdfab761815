use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::CredentialStore;

/// An in-memory store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, String>>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does the store currently hold this key?
    pub fn contains(&self, key: &str) -> bool {
        self.0.read().map(|map| map.contains_key(key)).unwrap_or(false)
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.0.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.0.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.0.write().map_err(|_| poisoned())?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.0.write().map_err(|_| poisoned())?;
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.set("user_id", "1").await.unwrap();
        assert_eq!(other.get("user_id").await.unwrap().as_deref(), Some("1"));

        other.multi_remove(&["user_id", "missing"]).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get("user_id").await.unwrap(), None);
    }
}
