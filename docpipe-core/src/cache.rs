//! Cache contract.
//!
//! Collections carry a cache handle for hooks and callers to use; the lifecycle pipeline itself
//! never reads from or writes to it.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::document::identity_key;

/// A key/value side channel for documents, keyed by [`cache_key`].
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Option<Document>;

    async fn set(&self, key: &str, document: Document);

    async fn del(&self, key: &str);
}

/// A cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get(&self, _key: &str) -> Option<Document> {
        None
    }

    async fn set(&self, _key: &str, _document: Document) {}

    async fn del(&self, _key: &str) {}
}

/// Builds the `<collection>.<identity>` cache key.
pub fn cache_key(collection: &str, id: &Bson) -> String {
    format!("{collection}.{}", identity_key(id))
}
