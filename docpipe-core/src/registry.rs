//! Named collections over a shared engine.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, CollectionBuilder},
    config::CollectionConfig,
    error::CollectionResult,
};

/// A set of collections sharing one engine handle.
///
/// Register every collection at setup, then call [`Collections::wire`] so each one can reach
/// the others through [`Collection::peer`].
#[derive(Debug)]
pub struct Collections<B: StoreBackend + 'static> {
    backend: Arc<B>,
    collections: BTreeMap<String, Collection<B>>,
}

impl<B: StoreBackend + 'static> Collections<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            collections: BTreeMap::new(),
        }
    }

    /// Builds the engine and starts an empty registry on it.
    pub async fn connect<T>(builder: T) -> CollectionResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        Ok(Self::new(Arc::new(builder.build().await?)))
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// A collection builder bound to this registry's engine.
    pub fn builder(&self, name: impl Into<String>) -> CollectionBuilder<B> {
        Collection::builder(name, Arc::clone(&self.backend))
    }

    /// Adds a collection, returning the one it replaces.
    pub fn register(&mut self, collection: Collection<B>) -> Option<Collection<B>> {
        self.collections
            .insert(collection.name().to_string(), collection)
    }

    /// Builds a collection from configuration and registers it.
    pub fn register_config(&mut self, config: CollectionConfig) -> CollectionResult<Collection<B>> {
        config.build_schema()?;

        let collection = CollectionBuilder::from_config(config, Arc::clone(&self.backend)).build()?;
        self.register(collection.clone());

        Ok(collection)
    }

    pub fn get(&self, name: &str) -> Option<Collection<B>> {
        self.collections.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Gives every registered collection every other one as a peer.
    pub async fn wire(&self) {
        for (name, collection) in &self.collections {
            let others = self
                .collections
                .iter()
                .filter(|(other, _)| *other != name)
                .map(|(_, other)| other.clone())
                .collect::<Vec<_>>();

            collection.use_collections(others).await;
        }
    }
}
