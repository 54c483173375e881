//! Lifecycle hooks.
//!
//! Every write a [`Collection`] performs passes through a [`Hooks`] implementation:
//!
//! ```text
//! create: before -> before_create -> coerce -> insert -> after -> after_create
//! save:   before -> before_save   -> diff   -> update -> after -> after_save
//! remove: before_remove -> delete -> after_remove
//! ```
//!
//! `before*` hooks return the (possibly transformed) document to continue with; `after*` hooks
//! observe the result. All methods default to pass-through, so implementors override only what
//! they need. A hook error aborts the operation.
//!
//! # Example
//!
//! ```ignore
//! use docpipe::hooks::{Hooks, HookContext};
//!
//! struct Slugify;
//!
//! #[async_trait]
//! impl<B: StoreBackend + 'static> Hooks<B> for Slugify {
//!     async fn before_create(&self, mut data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
//!         if let Ok(title) = data.get_str("title") {
//!             let slug = title.to_lowercase().replace(' ', "-");
//!             data.insert("slug", slug);
//!         }
//!         Ok(data)
//!     }
//! }
//! ```

use async_trait::async_trait;
use bson::Document;

use crate::{
    backend::StoreBackend,
    collection::Collection,
    context::Context,
    error::CollectionResult,
};

/// What a hook can see about the operation in flight.
pub struct HookContext<'a, B: StoreBackend + 'static> {
    /// The collection running the operation. Peers are reachable through
    /// [`Collection::peer`].
    pub collection: &'a Collection<B>,
    /// The caller's context.
    pub context: &'a Context,
    /// The selector of a `save` or `remove`.
    pub selector: Option<&'a Document>,
    /// The document as it was before a `save` or `remove`.
    pub doc: Option<&'a Document>,
    /// The data that was written. Only set for `after*` hooks of `create` and `save`.
    pub data: Option<&'a Document>,
}

impl<'a, B: StoreBackend + 'static> HookContext<'a, B> {
    pub fn new(collection: &'a Collection<B>, context: &'a Context) -> Self {
        Self {
            collection,
            context,
            selector: None,
            doc: None,
            data: None,
        }
    }

    pub fn with_selector(mut self, selector: &'a Document) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_doc(mut self, doc: Option<&'a Document>) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_data(mut self, data: &'a Document) -> Self {
        self.data = Some(data);
        self
    }
}

/// Overridable before/after extension points of a collection.
#[async_trait]
pub trait Hooks<B: StoreBackend + 'static>: Send + Sync {
    /// Runs before `create` and `save`, ahead of the operation-specific hook.
    async fn before(&self, data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        Ok(data)
    }

    async fn before_create(&self, data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        Ok(data)
    }

    async fn before_save(&self, data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        Ok(data)
    }

    /// Receives the document about to be removed. The delete always targets the identity of
    /// the document as found, whatever this hook returns.
    async fn before_remove(&self, doc: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        Ok(doc)
    }

    /// Runs after `create` and `save`, ahead of the operation-specific hook.
    async fn after(&self, _doc: Option<&Document>, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        Ok(())
    }

    async fn after_create(&self, _doc: &Document, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        Ok(())
    }

    async fn after_save(&self, _doc: Option<&Document>, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        Ok(())
    }

    async fn after_remove(&self, _doc: Option<&Document>, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        Ok(())
    }
}

/// Hooks that change nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

#[async_trait]
impl<B: StoreBackend + 'static> Hooks<B> for NoHooks {}
