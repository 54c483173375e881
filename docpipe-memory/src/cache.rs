use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docpipe_core::cache::Cache;

/// A process-local [`Cache`] backed by a hash map.
///
/// Clones share the same entries.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Document>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Document> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, document: Document) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), document);
    }

    async fn del(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}
