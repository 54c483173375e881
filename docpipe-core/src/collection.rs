//! Collections and their lifecycle pipeline.
//!
//! A [`Collection`] is a named set of documents on a persistence engine, with a field
//! [`Schema`], a [`Hooks`] implementation and a cache handle. Its high-level operations wrap
//! every write in the hook pipeline:
//!
//! - [`Collection::create`] stamps `createdAt`/`owner`, runs the `before` hooks, coerces the
//!   document against the schema, inserts it, runs the `after` hooks and re-reads it.
//! - [`Collection::save`] diffs the supplied fields into an update modifier, stamps `updatedAt`
//!   and applies it to the document matching a selector.
//! - [`Collection::remove`] deletes a single document by its resolved identity.
//!
//! Lookups that find nothing return `Ok(None)`; only engine failures, hook failures and copying
//! a missing document are errors.
//!
//! Collections are cheap to clone; clones share the same state.
//!
//! # Example
//!
//! ```ignore
//! use docpipe::prelude::*;
//!
//! let contacts = Collection::builder("contacts", Arc::new(InMemoryStore::new()))
//!     .with_field(FieldSpec::new("firstName").required().cast(Cast::FirstName))
//!     .build()?;
//!
//! let context = Context::new().with_user(doc! { "_id": "u1" });
//! let jane = contacts.create(doc! { "name": "Jane Doe" }, &context).await?;
//! ```

use bson::{Bson, Document};
use futures::future::try_join_all;
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, debug_span, warn};

use crate::{
    backend::{FindOptions, StoreBackend},
    cache::{Cache, NoCache, cache_key},
    config::CollectionConfig,
    context::Context,
    document::{ID_ALIAS, ID_FIELD, Lookup, identity_key, identity_selector, with_id, without_identity},
    error::{CollectionError, CollectionResult},
    hooks::{HookContext, Hooks, NoHooks},
    modifier::ModifierDiffer,
    page::SearchPage,
    query::QueryNormalizer,
    schema::{Coerced, FieldSpec, Schema, SchemaInput},
    store::DocumentStore,
};

/// Field stamped with the creation time.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Field stamped with the time of the last `save`.
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Field holding the identity of the creating principal.
pub const OWNER_FIELD: &str = "owner";

/// Fields dropped by [`Collection::copy`].
const COPY_OMITTED_FIELDS: [&str; 5] = [ID_FIELD, ID_ALIAS, CREATED_AT_FIELD, UPDATED_AT_FIELD, OWNER_FIELD];

macro_rules! log_op {
    ($collection:expr, $($arg:tt)+) => {
        if $collection.is_logging() {
            debug!(collection = %$collection.name(), $($arg)+);
        }
    };
}

struct CollectionInner<B: StoreBackend + 'static> {
    store: DocumentStore<B>,
    schema: Schema,
    hooks: Arc<dyn Hooks<B>>,
    cache: Arc<dyn Cache>,
    logging: AtomicBool,
    peers: RwLock<HashMap<String, Weak<CollectionInner<B>>>>,
}

/// A named document collection with a schema and lifecycle hooks.
pub struct Collection<B: StoreBackend + 'static> {
    inner: Arc<CollectionInner<B>>,
}

impl<B: StoreBackend + 'static> Clone for Collection<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StoreBackend + 'static> fmt::Debug for Collection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("schema", &self.inner.schema)
            .field("logging", &self.is_logging())
            .finish()
    }
}

impl<B: StoreBackend + 'static> Collection<B> {
    /// Starts building a collection named `name` on `backend`.
    pub fn builder(name: impl Into<String>, backend: Arc<B>) -> CollectionBuilder<B> {
        CollectionBuilder::new(name, backend)
    }

    pub fn name(&self) -> &str {
        self.inner.store.name()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Direct access to the engine primitives for this collection.
    pub fn store(&self) -> &DocumentStore<B> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.inner.cache
    }

    /// The cache key of a document of this collection.
    pub fn cache_key(&self, id: &Bson) -> String {
        cache_key(self.name(), id)
    }

    pub fn enable_log(&self) {
        self.inner.logging.store(true, Ordering::Relaxed);
    }

    pub fn disable_log(&self) {
        self.inner.logging.store(false, Ordering::Relaxed);
    }

    pub fn is_logging(&self) -> bool {
        self.inner.logging.load(Ordering::Relaxed)
    }

    /// Makes `collections` reachable through [`Collection::peer`]. Later entries replace earlier
    /// ones with the same name.
    ///
    /// Peers are held weakly; a peer dropped everywhere else disappears from the map.
    pub async fn use_collections<I>(&self, collections: I)
    where
        I: IntoIterator<Item = Collection<B>>,
    {
        let mut peers = self.inner.peers.write().await;

        for collection in collections {
            peers.insert(collection.name().to_string(), Arc::downgrade(&collection.inner));
        }
    }

    /// Looks up a collection previously passed to [`Collection::use_collections`].
    pub async fn peer(&self, name: &str) -> Option<Collection<B>> {
        self.inner
            .peers
            .read()
            .await
            .get(name)
            .and_then(Weak::upgrade)
            .map(|inner| Collection { inner })
    }

    /// Names of the live peers, sorted.
    pub async fn peer_names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .peers
            .read()
            .await
            .iter()
            .filter(|(_, peer)| peer.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Coerces a document, list or page envelope against this collection's schema.
    pub fn run_schema(&self, input: SchemaInput) -> Coerced {
        let _span = debug_span!("schema", collection = %self.name()).entered();

        self.inner.schema.coerce(input)
    }

    fn use_schema(&self, data: Document) -> Document {
        let _span = debug_span!("schema", collection = %self.name()).entered();
        let (document, _issues) = self.inner.schema.coerce_document(data);

        with_id(document)
    }

    fn use_schema_all(&self, data: Vec<Document>) -> Vec<Document> {
        let _span = debug_span!("schema", collection = %self.name()).entered();

        self.inner.schema.coerce_documents(data).0
    }

    async fn resolve(&self, document: Document, context: &Context) -> CollectionResult<Document> {
        match &context.resolver {
            Some(resolver) => resolver.resolve(document, context).await,
            None => Ok(with_id(document)),
        }
    }

    /// Creates a document and returns it as read back from the engine.
    ///
    /// `createdAt` is stamped with the current time and `owner` with the principal's identity
    /// when the context carries one. Schema issues are logged and do not abort the insert.
    pub async fn create(&self, input: Document, context: &Context) -> CollectionResult<Option<Document>> {
        let mut data = input;
        data.insert(CREATED_AT_FIELD, bson::DateTime::now());

        if let Some(owner) = context.principal_id() {
            data.insert(OWNER_FIELD, owner.clone());
        }

        let hooks = &self.inner.hooks;
        let ctx = HookContext::new(self, context);
        let data = hooks.before(data, &ctx).await?;
        let data = hooks.before_create(data, &ctx).await?;

        log_op!(self, data = ?data, "create");

        let data = self.use_schema(data);
        let document = self.inner.store.insert_one(data.clone()).await?;

        let ctx = ctx.with_data(&data);
        hooks.after(Some(&document), &ctx).await?;
        hooks.after_create(&document, &ctx).await?;

        match document.get(ID_FIELD) {
            Some(id) => self.get(Lookup::Id(id.clone()), context).await,
            None => Ok(None),
        }
    }

    /// Finds a single document by identity or selector.
    ///
    /// An empty selector finds nothing. The context's projection applies, and its resolver (if
    /// any) produces the returned value.
    pub async fn get(&self, lookup: impl Into<Lookup>, context: &Context) -> CollectionResult<Option<Document>> {
        let selector = lookup.into().into_selector();

        log_op!(self, selector = ?selector, "get");

        if selector.is_empty() {
            return Ok(None);
        }

        let found = self
            .inner
            .store
            .find_one(selector, context.options.projection.clone())
            .await?;

        match found {
            Some(document) => Ok(Some(self.resolve(document, context).await?)),
            None => Ok(None),
        }
    }

    /// Runs a loosely-typed query and returns one page of results.
    ///
    /// `query` is normalized by [`QueryNormalizer::normalize`]; `parent` clauses are merged in
    /// last and win. When the context names another collection, that collection is searched
    /// instead. Documents are resolved concurrently, passed through the schema and returned in
    /// engine order.
    pub async fn search(&self, query: Document, parent: Document, context: &Context) -> CollectionResult<SearchPage> {
        let (selector, page) = QueryNormalizer::normalize(query, parent);

        let store = match context.collection.as_deref() {
            Some(name) if !name.is_empty() => self.inner.store.sibling(name),
            _ => self.inner.store.clone(),
        };

        log_op!(self, selector = ?selector, page = ?page, target = %store.name(), "find");

        let count = store.count_documents(selector.clone()).await?;
        let found = store
            .find(selector, FindOptions::from(&page))
            .await?;
        let data = try_join_all(
            found
                .into_iter()
                .map(|document| self.resolve(document, context)),
        )
        .await?;

        Ok(SearchPage::builder(self.use_schema_all(data))
            .with_descriptor(&page)
            .with_count(count)
            .build())
    }

    /// Writes the supplied fields onto the document matching `lookup` and returns it re-read.
    ///
    /// Returns `Ok(None)` without writing when the selector is empty or the data yields no
    /// change. Identity fields in `data` are ignored. `keepArrays` and `keepEmptyStrings` are
    /// taken from the context options.
    pub async fn save(
        &self,
        lookup: impl Into<Lookup>,
        data: Document,
        context: &Context,
    ) -> CollectionResult<Option<Document>> {
        let selector = lookup.into().into_selector();
        let existing = self.get(selector.clone(), context).await?;

        let hooks = &self.inner.hooks;
        let ctx = HookContext::new(self, context)
            .with_selector(&selector)
            .with_doc(existing.as_ref());
        let data = hooks.before(data, &ctx).await?;
        let data = without_identity(hooks.before_save(data, &ctx).await?);

        let mut modifier = ModifierDiffer::diff(&data, context.options.modifier_options());

        log_op!(self, selector = ?selector, modifier = ?modifier, options = ?context.options, "save");

        if selector.is_empty() || modifier.is_empty() {
            return Ok(None);
        }

        modifier.set(UPDATED_AT_FIELD, bson::DateTime::now());

        let updated = self
            .inner
            .store
            .find_one_and_update(selector.clone(), modifier.into_update())
            .await?;

        let ctx = ctx.with_data(&data);
        hooks.after(updated.as_ref(), &ctx).await?;
        hooks.after_save(updated.as_ref(), &ctx).await?;

        self.get(selector, context).await
    }

    /// Removes the document matching `lookup` and returns it.
    ///
    /// Returns `Ok(None)` without deleting when the selector is empty or matches nothing.
    pub async fn remove(&self, lookup: impl Into<Lookup>, context: &Context) -> CollectionResult<Option<Document>> {
        let selector = lookup.into().into_selector();

        log_op!(self, selector = ?selector, "remove");

        if selector.is_empty() {
            return Ok(None);
        }

        let existing = match self.get(selector.clone(), context).await? {
            Some(document) if !document.is_empty() => document,
            _ => return Ok(None),
        };

        let Some(id) = existing.get(ID_FIELD).cloned() else {
            warn!(collection = %self.name(), "resolved document has no identity, nothing removed");
            return Ok(None);
        };

        let hooks = &self.inner.hooks;
        let ctx = HookContext::new(self, context)
            .with_selector(&selector)
            .with_doc(Some(&existing));
        hooks.before_remove(existing.clone(), &ctx).await?;

        let deleted = self
            .inner
            .store
            .find_one_and_delete(identity_selector(id))
            .await?;
        hooks.after_remove(deleted.as_ref(), &ctx).await?;

        Ok(deleted)
    }

    /// Deletes every document matching `selector`, without hooks. Returns the deleted count.
    pub async fn remove_many(&self, selector: Document) -> CollectionResult<u64> {
        log_op!(self, selector = ?selector, "removeMany");

        self.inner.store.delete_many(selector).await
    }

    /// Returns a copy of a document ready to be created again: identity, timestamps and owner
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CopySourceNotFound`] if no document has this identity.
    pub async fn copy(&self, id: impl Into<Bson>) -> CollectionResult<Document> {
        let id = id.into();

        let mut document = self
            .inner
            .store
            .find_one(identity_selector(id.clone()), None)
            .await?
            .ok_or_else(|| CollectionError::CopySourceNotFound(identity_key(&id), self.name().to_string()))?;

        for field in COPY_OMITTED_FIELDS {
            document.remove(field);
        }

        Ok(document)
    }

    /// Looks a document up by identity.
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> CollectionResult<Option<Document>> {
        let id = id.into();

        log_op!(self, id = %identity_key(&id), "get");

        self.inner.store.find_by_id(id).await
    }

    /// Looks identities up one after the other, skipping the ones not found.
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
}

/// Builder for [`Collection`].
pub struct CollectionBuilder<B: StoreBackend + 'static> {
    name: String,
    backend: Arc<B>,
    fields: Vec<FieldSpec>,
    hooks: Arc<dyn Hooks<B>>,
    cache: Arc<dyn Cache>,
    logging: bool,
}

impl<B: StoreBackend + 'static> CollectionBuilder<B> {
    pub fn new(name: impl Into<String>, backend: Arc<B>) -> Self {
        Self {
            name: name.into(),
            backend,
            fields: Vec::new(),
            hooks: Arc::new(NoHooks),
            cache: Arc::new(NoCache),
            logging: true,
        }
    }

    /// Starts from a declarative configuration.
    pub fn from_config(config: CollectionConfig, backend: Arc<B>) -> Self {
        Self {
            fields: config.schema,
            logging: config.logging,
            ..Self::new(config.name, backend)
        }
    }

    /// Appends a field declaration.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends every field of `schema`.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.fields.extend(schema.fields().iter().cloned());
        self
    }

    pub fn with_hooks(mut self, hooks: impl Hooks<B> + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Shares an existing cache handle.
    pub fn with_shared_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Validates the schema and builds the collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidSchema`] for an empty name or duplicate fields.
    pub fn build(self) -> CollectionResult<Collection<B>> {
        if self.name.is_empty() {
            return Err(CollectionError::InvalidSchema("collection name cannot be empty".into()));
        }

        let schema = Schema::new(self.fields)?;

        Ok(Collection {
            inner: Arc::new(CollectionInner {
                store: DocumentStore::new(self.backend, self.name),
                schema,
                hooks: self.hooks,
                cache: self.cache,
                logging: AtomicBool::new(self.logging),
                peers: RwLock::new(HashMap::new()),
            }),
        })
    }
}
