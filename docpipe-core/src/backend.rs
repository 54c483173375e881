//! Persistence engine abstraction.
//!
//! This module defines the contract every persistence engine implements so collections can run
//! against an in-memory map, a MongoDB deployment, or anything else speaking selectors and
//! update documents.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait exposes the document-engine primitives a collection needs (finds,
//! inserts, updates, deletes, counts, aggregation and index administration) addressed by
//! collection name. Implementations must be thread-safe (`Send + Sync`) and support concurrent
//! access.
//!
//! Selectors are canonical documents (`{ field: value | { $op: value } }`) and updates are
//! `$set`/`$unset` documents as produced by [`Modifier::into_update`](crate::modifier::Modifier::into_update).
//! Identity generation belongs to the engine: inserting a document without `_id` assigns one.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for persistence engines
//! - [`StoreBackendBuilder`]: Factory trait for creating engine instances
//!
//! # Examples
//!
//! ```ignore
//! use docpipe::backend::{StoreBackend, FindOptions};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let id = backend.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
//! let adults = backend
//!     .find("users", doc! { "age": { "$gte": 18 } }, FindOptions::default())
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    error::CollectionResult,
    query::{PageDescriptor, SortDirection},
};

/// Sort, paging and projection for multi-document reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    /// `None` or `Some(0)` means unbounded.
    pub limit: Option<u64>,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

impl From<&PageDescriptor> for FindOptions {
    fn from(page: &PageDescriptor) -> Self {
        Self {
            sort: (!page.sort.is_empty()).then(|| page.sort.clone()),
            skip: (page.skip > 0).then_some(page.skip),
            limit: (page.limit > 0).then_some(page.limit),
            projection: None,
        }
    }
}

/// Counts reported by update and replace operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// One operation of a [`StoreBackend::bulk_write`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne { document: Document },
    UpdateOne { selector: Document, update: Document },
    UpdateMany { selector: Document, update: Document },
    ReplaceOne { selector: Document, replacement: Document },
    DeleteOne { selector: Document },
    DeleteMany { selector: Document },
}

/// Aggregate counts of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_ids: Vec<Bson>,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
}

/// Declaration of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Field -> direction (`1` / `-1`).
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(keys: Document) -> Self {
        Self { keys, name: None, unique: false }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// The explicit name, or the engine-style default `field_dir` joined by `_`.
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.keys
                .iter()
                .map(|(field, dir)| format!("{field}_{}", SortDirection::from_value(dir).as_i32()))
                .collect::<Vec<_>>()
                .join("_")
        })
    }
}

/// Abstract interface for document persistence engines.
///
/// Every method addresses one collection by name. Collections come into existence on first
/// write; reading from a missing collection behaves like reading from an empty one.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple async
/// tasks. The concurrency model is implementation-specific.
///
/// # Error Handling
///
/// Operations return [`CollectionResult<T>`](crate::error::CollectionResult). Engine failures
/// surface as [`CollectionError::Backend`](crate::error::CollectionError::Backend); selectors the
/// engine cannot interpret as
/// [`CollectionError::InvalidQuery`](crate::error::CollectionError::InvalidQuery).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns every document matching `selector`, honouring sort, skip, limit and projection.
    async fn find(
        &self,
        collection: &str,
        selector: Document,
        options: FindOptions,
    ) -> CollectionResult<Vec<Document>>;

    /// Returns the first document matching `selector`.
    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
        projection: Option<Document>,
    ) -> CollectionResult<Option<Document>>;

    /// Applies `update` to the first match and returns the document as it is after the update.
    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> CollectionResult<Option<Document>>;

    /// Deletes the first match and returns it.
    async fn find_one_and_delete(
        &self,
        collection: &str,
        selector: Document,
    ) -> CollectionResult<Option<Document>>;

    /// Replaces the first match, keeping its identity, and returns the new document.
    async fn find_one_and_replace(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<Option<Document>>;

    /// Inserts a document, assigning an identity when it has none. Returns the identity.
    async fn insert_one(&self, collection: &str, document: Document) -> CollectionResult<Bson>;

    /// Inserts documents in order. Returns their identities in the same order.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> CollectionResult<Vec<Bson>>;

    /// Replaces the first match, keeping its identity.
    async fn replace_one(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<UpdateOutcome>;

    /// Applies `update` to the first match.
    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> CollectionResult<UpdateOutcome>;

    /// Applies `update` to every match.
    async fn update_many(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> CollectionResult<UpdateOutcome>;

    /// Deletes the first match. Returns the number of deleted documents.
    async fn delete_one(&self, collection: &str, selector: Document) -> CollectionResult<u64>;

    /// Deletes every match. Returns the number of deleted documents.
    async fn delete_many(&self, collection: &str, selector: Document) -> CollectionResult<u64>;

    async fn count_documents(&self, collection: &str, selector: Document) -> CollectionResult<u64>;

    /// Fast, possibly approximate, document count.
    async fn estimated_document_count(&self, collection: &str) -> CollectionResult<u64>;

    /// Distinct values of `field` among documents matching `selector`.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        selector: Document,
    ) -> CollectionResult<Vec<Bson>>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> CollectionResult<Vec<Document>>;

    /// Executes a batch of writes in order, stopping at the first failure.
    ///
    /// The default implementation dispatches each model to the single-operation methods.
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> CollectionResult<BulkWriteResult> {
        let mut result = BulkWriteResult::default();

        for model in models {
            match model {
                WriteModel::InsertOne { document } => {
                    result
                        .inserted_ids
                        .push(self.insert_one(collection, document).await?);
                }
                WriteModel::UpdateOne { selector, update } => {
                    let outcome = self.update_one(collection, selector, update).await?;
                    result.matched += outcome.matched;
                    result.modified += outcome.modified;
                }
                WriteModel::UpdateMany { selector, update } => {
                    let outcome = self.update_many(collection, selector, update).await?;
                    result.matched += outcome.matched;
                    result.modified += outcome.modified;
                }
                WriteModel::ReplaceOne { selector, replacement } => {
                    let outcome = self.replace_one(collection, selector, replacement).await?;
                    result.matched += outcome.matched;
                    result.modified += outcome.modified;
                }
                WriteModel::DeleteOne { selector } => {
                    result.deleted += self.delete_one(collection, selector).await?;
                }
                WriteModel::DeleteMany { selector } => {
                    result.deleted += self.delete_many(collection, selector).await?;
                }
            }
        }

        Ok(result)
    }

    /// Creates an index and returns its name.
    async fn create_index(&self, collection: &str, index: IndexSpec) -> CollectionResult<String>;

    /// Creates several indexes and returns their names.
    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexSpec>,
    ) -> CollectionResult<Vec<String>> {
        let mut names = Vec::with_capacity(indexes.len());

        for index in indexes {
            names.push(self.create_index(collection, index).await?);
        }

        Ok(names)
    }

    /// Describes every index of the collection as `{ name, key, unique? }` documents.
    async fn list_indexes(&self, collection: &str) -> CollectionResult<Vec<Document>>;

    /// Whether every named index exists.
    async fn index_exists(&self, collection: &str, names: &[String]) -> CollectionResult<bool> {
        let existing = self
            .list_indexes(collection)
            .await?
            .into_iter()
            .filter_map(|index| index.get_str("name").ok().map(str::to_string))
            .collect::<Vec<_>>();

        Ok(names.iter().all(|name| existing.contains(name)))
    }

    async fn drop_index(&self, collection: &str, name: &str) -> CollectionResult<()>;

    /// Drops every index except the identity index.
    async fn drop_indexes(&self, collection: &str) -> CollectionResult<()>;

    /// Rebuilds the collection's indexes and returns the engine's report.
    async fn re_index(&self, collection: &str) -> CollectionResult<Document>;

    /// Renames a collection.
    async fn rename(&self, collection: &str, new_name: &str) -> CollectionResult<()>;

    /// Storage statistics for the collection.
    async fn stats(&self, collection: &str) -> CollectionResult<Document>;

    /// The options the collection was created with.
    async fn options(&self, collection: &str) -> CollectionResult<Document>;

    async fn is_capped(&self, collection: &str) -> CollectionResult<bool> {
        Ok(self
            .options(collection)
            .await?
            .get_bool("capped")
            .unwrap_or(false))
    }

    /// Drops the collection. Returns whether it existed.
    async fn drop(&self, collection: &str) -> CollectionResult<bool>;

    /// Cleanly shuts down the engine, releasing all resources.
    ///
    /// The default implementation is a no-op, but engines holding external connections should
    /// override this.
    async fn shutdown(self) -> CollectionResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> CollectionResult<Self::Backend>;
}
