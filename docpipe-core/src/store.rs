//! Uniform document access over a persistence engine.
//!
//! [`DocumentStore`] binds a [`StoreBackend`] to one collection name and forwards every engine
//! primitive, wrapping each returned document with its `id` alias (see
//! [`with_id`](crate::document::with_id)). It is the only path through which collections touch
//! the engine.
//!
//! # Example
//!
//! ```ignore
//! use docpipe::store::DocumentStore;
//! use std::sync::Arc;
//!
//! let users = DocumentStore::new(Arc::new(backend), "users");
//! let jane = users.insert_one(doc! { "name": "Jane" }).await?;
//! assert_eq!(jane.get("id"), jane.get("_id"));
//! ```

use bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    backend::{BulkWriteResult, FindOptions, IndexSpec, StoreBackend, UpdateOutcome, WriteModel},
    document::{ID_FIELD, identity_selector, with_id, with_id_opt},
    error::CollectionResult,
};

/// A persistence engine bound to a single collection.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: Arc<B>,
    name: String,
}

impl<B: StoreBackend> Clone for DocumentStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            name: self.name.clone(),
        }
    }
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Binds `backend` to the collection `name`.
    pub fn new(backend: Arc<B>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared engine handle.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Another collection on the same engine.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(Arc::clone(&self.backend), name)
    }

    pub async fn find(&self, selector: Document, options: FindOptions) -> CollectionResult<Vec<Document>> {
        Ok(self
            .backend
            .find(&self.name, selector, options)
            .await?
            .into_iter()
            .map(with_id)
            .collect())
    }

    pub async fn find_one(
        &self,
        selector: Document,
        projection: Option<Document>,
    ) -> CollectionResult<Option<Document>> {
        Ok(with_id_opt(
            self.backend
                .find_one(&self.name, selector, projection)
                .await?,
        ))
    }

    /// Looks a document up by identity. A `null` identity finds nothing.
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> CollectionResult<Option<Document>> {
        let id = id.into();

        if matches!(id, Bson::Null) {
            return Ok(None);
        }

        self.find_one(identity_selector(id), None).await
    }

    /// Looks identities up one at a time, skipping the ones not found.
    pub async fn find_all_by_id<I>(&self, ids: I) -> CollectionResult<Vec<Document>>
    where
        I: IntoIterator,
        I::Item: Into<Bson>,
    {
        let mut found = Vec::new();

        for id in ids {
            if let Some(document) = self.find_by_id(id).await? {
                found.push(document);
            }
        }

        Ok(found)
    }

    /// Applies `update` and returns the document as it is afterwards.
    pub async fn find_one_and_update(
        &self,
        selector: Document,
        update: Document,
    ) -> CollectionResult<Option<Document>> {
        Ok(with_id_opt(
            self.backend
                .find_one_and_update(&self.name, selector, update)
                .await?,
        ))
    }

    pub async fn find_one_and_delete(&self, selector: Document) -> CollectionResult<Option<Document>> {
        Ok(with_id_opt(
            self.backend
                .find_one_and_delete(&self.name, selector)
                .await?,
        ))
    }

    pub async fn find_one_and_replace(
        &self,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<Option<Document>> {
        Ok(with_id_opt(
            self.backend
                .find_one_and_replace(&self.name, selector, replacement)
                .await?,
        ))
    }

    /// Inserts a document and returns it with its assigned identity.
    pub async fn insert_one(&self, document: Document) -> CollectionResult<Document> {
        let id = self
            .backend
            .insert_one(&self.name, document.clone())
            .await?;

        Ok(with_id(stored(id, document)))
    }

    /// Inserts documents and returns them with their assigned identities.
    pub async fn insert_many(&self, documents: Vec<Document>) -> CollectionResult<Vec<Document>> {
        let ids = self
            .backend
            .insert_many(&self.name, documents.clone())
            .await?;

        Ok(ids
            .into_iter()
            .zip(documents)
            .map(|(id, document)| with_id(stored(id, document)))
            .collect())
    }

    pub async fn replace_one(&self, selector: Document, replacement: Document) -> CollectionResult<UpdateOutcome> {
        self.backend
            .replace_one(&self.name, selector, replacement)
            .await
    }

    /// Applies `update` to the first match, then re-reads it by `selector`.
    ///
    /// When the update changes a field the selector matches on, the re-read can miss.
    pub async fn update_one(&self, selector: Document, update: Document) -> CollectionResult<Option<Document>> {
        self.backend
            .update_one(&self.name, selector.clone(), update)
            .await?;

        self.find_one(selector, None).await
    }

    pub async fn update_many(&self, selector: Document, update: Document) -> CollectionResult<UpdateOutcome> {
        self.backend
            .update_many(&self.name, selector, update)
            .await
    }

    pub async fn delete_one(&self, selector: Document) -> CollectionResult<u64> {
        self.backend
            .delete_one(&self.name, selector)
            .await
    }

    pub async fn delete_many(&self, selector: Document) -> CollectionResult<u64> {
        self.backend
            .delete_many(&self.name, selector)
            .await
    }

    pub async fn count_documents(&self, selector: Document) -> CollectionResult<u64> {
        self.backend
            .count_documents(&self.name, selector)
            .await
    }

    pub async fn estimated_document_count(&self) -> CollectionResult<u64> {
        self.backend
            .estimated_document_count(&self.name)
            .await
    }

    pub async fn distinct(&self, field: &str, selector: Document) -> CollectionResult<Vec<Bson>> {
        self.backend
            .distinct(&self.name, field, selector)
            .await
    }

    /// Runs an aggregation pipeline. Stage output is returned as produced.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> CollectionResult<Vec<Document>> {
        self.backend
            .aggregate(&self.name, pipeline)
            .await
    }

    pub async fn bulk_write(&self, models: Vec<WriteModel>) -> CollectionResult<BulkWriteResult> {
        self.backend
            .bulk_write(&self.name, models)
            .await
    }

    pub async fn create_index(&self, index: IndexSpec) -> CollectionResult<String> {
        self.backend
            .create_index(&self.name, index)
            .await
    }

    pub async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> CollectionResult<Vec<String>> {
        self.backend
            .create_indexes(&self.name, indexes)
            .await
    }

    /// Describes every index on the collection.
    pub async fn indexes(&self) -> CollectionResult<Vec<Document>> {
        self.backend.list_indexes(&self.name).await
    }

    pub async fn index_exists(&self, names: &[String]) -> CollectionResult<bool> {
        self.backend
            .index_exists(&self.name, names)
            .await
    }

    pub async fn drop_index(&self, name: &str) -> CollectionResult<()> {
        self.backend
            .drop_index(&self.name, name)
            .await
    }

    pub async fn drop_indexes(&self) -> CollectionResult<()> {
        self.backend.drop_indexes(&self.name).await
    }

    pub async fn re_index(&self) -> CollectionResult<Document> {
        self.backend.re_index(&self.name).await
    }

    /// Renames the underlying collection. The store keeps addressing the old name; use
    /// [`DocumentStore::sibling`] to reach the renamed one.
    pub async fn rename(&self, new_name: &str) -> CollectionResult<()> {
        self.backend
            .rename(&self.name, new_name)
            .await
    }

    pub async fn stats(&self) -> CollectionResult<Document> {
        self.backend.stats(&self.name).await
    }

    pub async fn options(&self) -> CollectionResult<Document> {
        self.backend.options(&self.name).await
    }

    pub async fn is_capped(&self) -> CollectionResult<bool> {
        self.backend.is_capped(&self.name).await
    }

    pub async fn drop(&self) -> CollectionResult<bool> {
        StoreBackend::drop(self.backend.as_ref(), &self.name).await
    }
}

/// The document as the engine stored it: identity first, then the written fields.
fn stored(id: Bson, document: Document) -> Document {
    let mut stored = Document::new();
    stored.insert(ID_FIELD, id);

    for (key, value) in document {
        if key != ID_FIELD {
            stored.insert(key, value);
        }
    }

    stored
}
