//! Per-call operation context.

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::{
    document::ID_FIELD,
    error::CollectionResult,
    modifier::ModifierOptions,
};

/// Turns a stored document into the value handed back to the caller.
///
/// When a [`Context`] carries a resolver it shapes every `get` and `search` result. The resolver
/// receives the stored document with its `id` alias already applied.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, document: Document, context: &Context) -> CollectionResult<Document>;
}

/// Free-form options forwarded to the operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_arrays: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_empty_strings: Option<bool>,
    /// Projection applied to single-document reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
}

impl OperationOptions {
    /// The differ options with any overrides applied.
    pub fn modifier_options(&self) -> ModifierOptions {
        let defaults = ModifierOptions::default();

        ModifierOptions {
            keep_arrays: self.keep_arrays.unwrap_or(defaults.keep_arrays),
            keep_empty_strings: self
                .keep_empty_strings
                .unwrap_or(defaults.keep_empty_strings),
        }
    }
}

/// Who is acting and how. Built per call and never stored.
#[derive(Clone, Default)]
pub struct Context {
    /// The acting principal. Its `_id` becomes the `owner` of created documents.
    pub user: Option<Document>,
    pub options: OperationOptions,
    /// Custom result resolver for reads.
    pub resolver: Option<Arc<dyn Resolver>>,
    /// Searches this collection instead of the receiving one.
    pub collection: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: Document) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// The principal's identity, if a principal with one is present.
    pub fn principal_id(&self) -> Option<&Bson> {
        self.user
            .as_ref()
            .and_then(|user| user.get(ID_FIELD))
            .filter(|id| !matches!(id, Bson::Null))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("user", &self.user)
            .field("options", &self.options)
            .field("resolver", &self.resolver.is_some())
            .field("collection", &self.collection)
            .finish()
    }
}
