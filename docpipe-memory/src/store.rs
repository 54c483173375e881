//! In-memory persistence engine.
//!
//! This module provides a simple but complete in-memory engine that keeps each collection as an
//! insertion-ordered list of BSON documents behind an async-safe read-write lock.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::trace;
use uuid::Uuid;

use docpipe_core::{
    backend::{FindOptions, IndexSpec, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    document::ID_FIELD,
    error::{CollectionError, CollectionResult},
    query::Expr,
};

use crate::{
    evaluator::{Comparable, compare_documents, lookup, matches},
    update::{apply_projection, apply_update},
};

const ID_INDEX: &str = "_id_";

#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexSpec::new(doc! { ID_FIELD: 1 }).named(ID_INDEX).unique()],
        }
    }

    fn positions(&self, selector: &Document) -> CollectionResult<Vec<usize>> {
        let expr = Expr::from_selector(selector)?;
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if matches(document, &expr)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn first_position(&self, selector: &Document) -> CollectionResult<Option<usize>> {
        let expr = Expr::from_selector(selector)?;

        for (position, document) in self.documents.iter().enumerate() {
            if matches(document, &expr)? {
                return Ok(Some(position));
            }
        }

        Ok(None)
    }

    /// Fails if `candidate` collides with another document on a unique index.
    fn check_unique(&self, collection: &str, candidate: &Document, skip: Option<usize>) -> CollectionResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index_key(candidate, index);

            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, existing)| index_key(existing, index) == key);

            if collides {
                return Err(CollectionError::Backend(format!(
                    "duplicate key in {collection} for index {}",
                    index.resolved_name()
                )));
            }
        }

        Ok(())
    }

    /// Applies `update` to the document at `position`. Returns whether it changed.
    fn update_at(&mut self, collection: &str, position: usize, update: &Document) -> CollectionResult<bool> {
        let current = &self.documents[position];
        let updated = apply_update(current, update)?;

        if &updated == current {
            return Ok(false);
        }

        self.check_unique(collection, &updated, Some(position))?;
        self.documents[position] = updated;

        Ok(true)
    }

    fn replace_at(&mut self, collection: &str, position: usize, replacement: Document) -> CollectionResult<bool> {
        let id = self.documents[position]
            .get(ID_FIELD)
            .cloned()
            .unwrap_or(Bson::Null);

        if let Some(other) = replacement.get(ID_FIELD) {
            if Comparable::from(other) != Comparable::from(&id) {
                return Err(CollectionError::InvalidDocument("the identity of a document cannot change".into()));
            }
        }

        let mut document = doc! { ID_FIELD: id };
        for (key, value) in replacement {
            if key != ID_FIELD {
                document.insert(key, value);
            }
        }

        let changed = document != self.documents[position];
        self.check_unique(collection, &document, Some(position))?;
        self.documents[position] = document;

        Ok(changed)
    }
}

fn index_key(document: &Document, index: &IndexSpec) -> Vec<Bson> {
    index
        .keys
        .keys()
        .map(|field| {
            lookup(document, field)
                .into_iter()
                .next()
                .cloned()
                .unwrap_or(Bson::Null)
        })
        .collect()
}

type StoreMap = HashMap<String, MemoryCollection>;

/// Thread-safe in-memory persistence engine.
///
/// This struct implements the [`StoreBackend`] trait on top of `mea` async read-write locks.
/// Selectors are evaluated with the core selector parser; updates support `$set`, `$unset`,
/// `$inc` and `$push`. Documents inserted without an identity get a UUID v4 string.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// safely shared across async tasks. Multiple clones of the same instance share the same data.
///
/// # Performance
///
/// Every query scans the whole collection; indexes only enforce uniqueness. For larger
/// datasets, use the MongoDB engine.
///
/// # Example
///
/// ```ignore
/// use docpipe_memory::InMemoryStore;
/// use docpipe::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let id = store.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
///     let found = store.find_one("users", doc! { "_id": id }, None).await?;
///     assert!(found.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> collection
    store: Arc<RwLock<StoreMap>>,
    /// Number of write operations that reached storage.
    writes: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of write operations that reached storage so far.
    ///
    /// Lookups never count; writes that match nothing still count.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Names of the existing collections, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    async fn read_filtered(&self, collection: &str, selector: &Document) -> CollectionResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(collection) = store.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(collection
            .positions(selector)?
            .into_iter()
            .map(|position| collection.documents[position].clone())
            .collect())
    }
}

fn paginate(mut documents: Vec<Document>, options: &FindOptions) -> Vec<Document> {
    if let Some(sort) = options.sort.as_ref().filter(|sort| !sort.is_empty()) {
        documents.sort_by(|a, b| compare_documents(a, b, sort));
    }

    let skip = options.skip.unwrap_or(0) as usize;
    let limit = match options.limit {
        Some(limit) if limit > 0 => limit as usize,
        _ => usize::MAX,
    };

    documents
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|document| match &options.projection {
            Some(projection) => apply_projection(&document, projection),
            None => document,
        })
        .collect()
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, selector: Document, options: FindOptions) -> CollectionResult<Vec<Document>> {
        let documents = self.read_filtered(collection, &selector).await?;

        Ok(paginate(documents, &options))
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
        projection: Option<Document>,
    ) -> CollectionResult<Option<Document>> {
        let store = self.store.read().await;
        let Some(collection) = store.get(collection) else {
            return Ok(None);
        };

        Ok(collection
            .first_position(&selector)?
            .map(|position| {
                let document = &collection.documents[position];
                match &projection {
                    Some(projection) => apply_projection(document, projection),
                    None => document.clone(),
                }
            }))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> CollectionResult<Option<Document>> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(None);
        };

        let Some(position) = entry.first_position(&selector)? else {
            return Ok(None);
        };

        entry.update_at(collection, position, &update)?;
        trace!(collection, position, "find_one_and_update");

        Ok(Some(entry.documents[position].clone()))
    }

    async fn find_one_and_delete(&self, collection: &str, selector: Document) -> CollectionResult<Option<Document>> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(None);
        };

        Ok(entry
            .first_position(&selector)?
            .map(|position| entry.documents.remove(position)))
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<Option<Document>> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(None);
        };

        let Some(position) = entry.first_position(&selector)? else {
            return Ok(None);
        };

        entry.replace_at(collection, position, replacement)?;

        Ok(Some(entry.documents[position].clone()))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> CollectionResult<Bson> {
        let mut ids = self.insert_many(collection, vec![document]).await?;

        ids.pop()
            .ok_or_else(|| CollectionError::Unknown("insert produced no identity".into()))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> CollectionResult<Vec<Bson>> {
        self.record_write();

        let mut store = self.store.write().await;
        let entry = store
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let id = match document.get(ID_FIELD) {
                Some(id) => id.clone(),
                None => Bson::String(Uuid::new_v4().to_string()),
            };

            let mut stored = doc! { ID_FIELD: id.clone() };
            for (key, value) in document {
                if key != ID_FIELD {
                    stored.insert(key, value);
                }
            }

            entry.check_unique(collection, &stored, None)?;
            entry.documents.push(stored);
            trace!(collection, id = %id, "insert");
            ids.push(id);
        }

        Ok(ids)
    }

    async fn replace_one(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<UpdateOutcome> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let Some(position) = entry.first_position(&selector)? else {
            return Ok(UpdateOutcome::default());
        };

        let modified = entry.replace_at(collection, position, replacement)?;

        Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(modified),
            upserted_id: None,
        })
    }

    async fn update_one(&self, collection: &str, selector: Document, update: Document) -> CollectionResult<UpdateOutcome> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let Some(position) = entry.first_position(&selector)? else {
            return Ok(UpdateOutcome::default());
        };

        let modified = entry.update_at(collection, position, &update)?;

        Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(modified),
            upserted_id: None,
        })
    }

    async fn update_many(&self, collection: &str, selector: Document, update: Document) -> CollectionResult<UpdateOutcome> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let positions = entry.positions(&selector)?;
        let mut outcome = UpdateOutcome {
            matched: positions.len() as u64,
            ..Default::default()
        };

        for position in positions {
            if entry.update_at(collection, position, &update)? {
                outcome.modified += 1;
            }
        }

        Ok(outcome)
    }

    async fn delete_one(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        Ok(self
            .find_one_and_delete(collection, selector)
            .await?
            .map_or(0, |_| 1))
    }

    async fn delete_many(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        self.record_write();

        let mut store = self.store.write().await;
        let Some(entry) = store.get_mut(collection) else {
            return Ok(0);
        };

        let positions = entry.positions(&selector)?;
        for position in positions.iter().rev() {
            entry.documents.remove(*position);
        }

        trace!(collection, deleted = positions.len(), "delete_many");

        Ok(positions.len() as u64)
    }

    async fn count_documents(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(entry) => Ok(entry.positions(&selector)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn estimated_document_count(&self, collection: &str) -> CollectionResult<u64> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map_or(0, |entry| entry.documents.len() as u64))
    }

    async fn distinct(&self, collection: &str, field: &str, selector: Document) -> CollectionResult<Vec<Bson>> {
        let documents = self.read_filtered(collection, &selector).await?;
        let mut values: Vec<Bson> = Vec::new();

        for document in &documents {
            for value in lookup(document, field) {
                let flattened = match value {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                };

                for value in flattened {
                    if !values
                        .iter()
                        .any(|seen| Comparable::from(seen) == Comparable::from(value))
                    {
                        values.push(value.clone());
                    }
                }
            }
        }

        Ok(values)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> CollectionResult<Vec<Document>> {
        let mut documents = self.read_filtered(collection, &Document::new()).await?;

        for stage in pipeline {
            let Some((operator, argument)) = stage.into_iter().next() else {
                return Err(CollectionError::InvalidQuery("empty aggregation stage".into()));
            };

            documents = match (operator.as_str(), argument) {
                ("$match", Bson::Document(selector)) => {
                    let expr = Expr::from_selector(&selector)?;
                    let mut kept = Vec::with_capacity(documents.len());
                    for document in documents {
                        if matches(&document, &expr)? {
                            kept.push(document);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(sort)) => paginate(documents, &FindOptions { sort: Some(sort), ..Default::default() }),
                ("$skip", value) => paginate(documents, &FindOptions { skip: Some(stage_count(&value)?), ..Default::default() }),
                ("$limit", value) => paginate(documents, &FindOptions { limit: Some(stage_count(&value)?), ..Default::default() }),
                ("$project", Bson::Document(projection)) => documents
                    .iter()
                    .map(|document| apply_projection(document, &projection))
                    .collect(),
                ("$count", Bson::String(field)) => {
                    let mut counted = Document::new();
                    counted.insert(field, documents.len() as i64);
                    vec![counted]
                }
                (operator, _) => {
                    return Err(CollectionError::InvalidQuery(format!(
                        "unsupported aggregation stage {operator}"
                    )));
                }
            };
        }

        Ok(documents)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> CollectionResult<String> {
        self.record_write();

        let mut store = self.store.write().await;
        let entry = store
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);
        let name = index.resolved_name();

        if let Some(existing) = entry.indexes.iter().find(|existing| existing.resolved_name() == name) {
            if existing.keys != index.keys || existing.unique != index.unique {
                return Err(CollectionError::Backend(format!(
                    "index {name} already exists with different options"
                )));
            }
            return Ok(name);
        }

        if index.unique {
            let mut seen = Vec::with_capacity(entry.documents.len());
            for document in &entry.documents {
                let key = index_key(document, &index);
                if seen.contains(&key) {
                    return Err(CollectionError::Backend(format!(
                        "cannot build unique index {name}: duplicate key in {collection}"
                    )));
                }
                seen.push(key);
            }
        }

        entry.indexes.push(index);

        Ok(name)
    }

    async fn list_indexes(&self, collection: &str) -> CollectionResult<Vec<Document>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map(|entry| {
                entry
                    .indexes
                    .iter()
                    .map(|index| {
                        let mut description = doc! { "name": index.resolved_name(), "key": index.keys.clone() };
                        if index.unique && index.resolved_name() != ID_INDEX {
                            description.insert("unique", true);
                        }
                        description
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> CollectionResult<()> {
        self.record_write();

        if name == ID_INDEX {
            return Err(CollectionError::Backend("cannot drop the identity index".into()));
        }

        let mut store = self.store.write().await;
        let entry = store
            .get_mut(collection)
            .ok_or_else(|| CollectionError::Backend(format!("collection {collection} does not exist")))?;

        let before = entry.indexes.len();
        entry
            .indexes
            .retain(|index| index.resolved_name() != name);

        if entry.indexes.len() == before {
            return Err(CollectionError::Backend(format!("index {name} not found in {collection}")));
        }

        Ok(())
    }

    async fn drop_indexes(&self, collection: &str) -> CollectionResult<()> {
        self.record_write();

        if let Some(entry) = self.store.write().await.get_mut(collection) {
            entry
                .indexes
                .retain(|index| index.resolved_name() == ID_INDEX);
        }

        Ok(())
    }

    async fn re_index(&self, collection: &str) -> CollectionResult<Document> {
        let count = self
            .store
            .read()
            .await
            .get(collection)
            .map_or(0, |entry| entry.indexes.len() as i64);

        Ok(doc! { "nIndexesWas": count, "nIndexes": count, "ok": 1.0 })
    }

    async fn rename(&self, collection: &str, new_name: &str) -> CollectionResult<()> {
        self.record_write();

        let mut store = self.store.write().await;

        if store.contains_key(new_name) {
            return Err(CollectionError::Backend(format!("target collection {new_name} already exists")));
        }

        let entry = store
            .remove(collection)
            .ok_or_else(|| CollectionError::Backend(format!("collection {collection} does not exist")))?;
        store.insert(new_name.to_string(), entry);

        Ok(())
    }

    async fn stats(&self, collection: &str) -> CollectionResult<Document> {
        let store = self.store.read().await;
        let (count, indexes) = store
            .get(collection)
            .map_or((0, 0), |entry| (entry.documents.len() as i64, entry.indexes.len() as i64));

        Ok(doc! {
            "ns": collection,
            "count": count,
            "nindexes": indexes,
            "capped": false,
        })
    }

    async fn options(&self, _collection: &str) -> CollectionResult<Document> {
        Ok(Document::new())
    }

    async fn drop(&self, collection: &str) -> CollectionResult<bool> {
        self.record_write();

        Ok(self
            .store
            .write()
            .await
            .remove(collection)
            .is_some())
    }
}

fn stage_count(value: &Bson) -> CollectionResult<u64> {
    match value {
        Bson::Int32(n) if *n >= 0 => Ok(*n as u64),
        Bson::Int64(n) if *n >= 0 => Ok(*n as u64),
        other => Err(CollectionError::InvalidQuery(format!("expected a non-negative integer, got {other}"))),
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docpipe_memory::InMemoryStore;
/// use docpipe::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder()
///         .with_documents("users", vec![doc! { "_id": "u1", "name": "Jane" }])
///         .build()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryStoreBuilder {
    /// Seeds a collection with documents when the store is built.
    pub fn with_documents(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds the store and inserts any seeded documents. Seeding does not count as writes.
    async fn build(self) -> CollectionResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (collection, documents) in self.seed {
            store.insert_many(&collection, documents).await?;
        }

        store.writes.store(0, Ordering::SeqCst);

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .with_documents(
                "people",
                vec![
                    doc! { "_id": "a", "name": "Ann", "age": 31, "tags": ["x"] },
                    doc! { "_id": "b", "name": "Bob", "age": 25, "tags": ["x", "y"] },
                    doc! { "_id": "c", "name": "Cid", "age": 40 },
                ],
            )
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn assigns_uuid_identities() {
        let store = InMemoryStore::new();
        let id = store.insert_one("things", doc! { "n": 1 }).await.unwrap();

        let id = id.as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn finds_with_sort_skip_limit_and_projection() {
        let store = seeded().await;

        let found = store
            .find(
                "people",
                doc! { "age": { "$gte": 25 } },
                FindOptions {
                    sort: Some(doc! { "age": -1 }),
                    skip: Some(1),
                    limit: Some(1),
                    projection: Some(doc! { "name": 1 }),
                },
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": "a", "name": "Ann" }]);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn updates_and_returns_the_new_document() {
        let store = seeded().await;

        let updated = store
            .find_one_and_update(
                "people",
                doc! { "_id": "b" },
                doc! { "$set": { "address.city": "Oslo" }, "$unset": { "tags": "" }, "$inc": { "age": 1 } },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated, doc! { "_id": "b", "name": "Bob", "age": 26, "address": { "city": "Oslo" } });
    }

    #[tokio::test]
    async fn updates_require_operators() {
        let store = seeded().await;

        let err = store
            .update_one("people", doc! { "_id": "a" }, doc! { "name": "Anne" })
            .await
            .unwrap_err();

        assert!(matches!(err, CollectionError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn deletes_and_counts() {
        let store = seeded().await;

        assert_eq!(store.count_documents("people", doc! { "tags": "x" }).await.unwrap(), 2);
        assert_eq!(store.delete_many("people", doc! { "tags": "x" }).await.unwrap(), 2);
        assert_eq!(store.estimated_document_count("people").await.unwrap(), 1);
        assert_eq!(store.delete_one("people", doc! { "_id": "zzz" }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn distinct_flattens_arrays() {
        let store = seeded().await;

        let tags = store.distinct("people", "tags", doc! {}).await.unwrap();

        assert_eq!(tags, vec![Bson::String("x".into()), Bson::String("y".into())]);
    }

    #[tokio::test]
    async fn aggregates_simple_pipelines() {
        let store = seeded().await;

        let counted = store
            .aggregate(
                "people",
                vec![doc! { "$match": { "age": { "$gt": 26 } } }, doc! { "$count": "total" }],
            )
            .await
            .unwrap();
        assert_eq!(counted, vec![doc! { "total": 2_i64 }]);

        let youngest = store
            .aggregate(
                "people",
                vec![doc! { "$sort": { "age": 1 } }, doc! { "$limit": 1 }, doc! { "$project": { "_id": 0, "name": 1 } }],
            )
            .await
            .unwrap();
        assert_eq!(youngest, vec![doc! { "name": "Bob" }]);
    }

    #[tokio::test]
    async fn unique_indexes_reject_duplicates() {
        let store = seeded().await;

        let name = store
            .create_index("people", IndexSpec::new(doc! { "name": 1 }).unique())
            .await
            .unwrap();
        assert_eq!(name, "name_1");
        assert!(store.index_exists("people", &["_id_".into(), "name_1".into()]).await.unwrap());

        let err = store
            .insert_one("people", doc! { "name": "Ann" })
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::Backend(_)));

        store.drop_indexes("people").await.unwrap();
        assert_eq!(store.list_indexes("people").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn renames_and_drops_collections() {
        let store = seeded().await;

        store.rename("people", "humans").await.unwrap();
        assert_eq!(store.collection_names().await, vec!["humans".to_string()]);
        assert!(store.drop("humans").await.unwrap());
        assert!(!store.drop("humans").await.unwrap());
    }
}
