//! Main docpipe crate providing a unified interface for document collections.
//!
//! This crate is the primary entry point for users of docpipe. It re-exports the core types
//! from the sub-crates and gives convenient access to the persistence engines.
//!
//! # Features
//!
//! - **Schema coercion** - Declarative fields with required-field policy, casts and date conversion
//! - **Query normalization** - Loose query objects become selectors plus sort and paging
//! - **Partial updates** - Nested partial documents are diffed into `$set`/`$unset` modifiers
//! - **Lifecycle hooks** - `before`/`after` extension points around create, save and remove
//! - **Multiple engines** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docpipe::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> CollectionResult<()> {
//!     let contacts = Collection::builder("contacts", Arc::new(InMemoryStore::new()))
//!         .with_field(FieldSpec::new("firstName").required().cast(Cast::FirstName))
//!         .with_field(FieldSpec::new("lastName").required().cast(Cast::LastName))
//!         .with_field(FieldSpec::new("phone").cast(Cast::Phone))
//!         .build()?;
//!
//!     let context = Context::new().with_user(doc! { "_id": "u1" });
//!
//!     // Missing names are derived from `name`, the phone number is normalized
//!     let jane = contacts
//!         .create(doc! { "name": "Jane Doe", "phone": "(202) 555-0143" }, &context)
//!         .await?
//!         .unwrap();
//!
//!     // Only the changed fields are written
//!     contacts
//!         .save(jane.get("_id").cloned().unwrap(), doc! { "address": { "city": "Oslo" } }, &context)
//!         .await?;
//!
//!     // Loose query objects with paging
//!     let page = contacts
//!         .search(doc! { "lastName": "Doe", "limit": 10, "sort": { "createdAt": -1 } }, doc! {}, &context)
//!         .await?;
//!
//!     println!("{} of {} contacts", page.data.len(), page.count);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Declarative Collections
//!
//! Collections can also be declared in JSON and registered together, so that hooks can reach
//! sibling collections by name:
//!
//! ```ignore
//! use docpipe::{prelude::*, memory::InMemoryStoreBuilder};
//!
//! let mut collections = Collections::connect(InMemoryStoreBuilder::default()).await?;
//!
//! collections.register_config(CollectionConfig::from_json(r#"{ "name": "contacts" }"#)?)?;
//! collections.register_config(CollectionConfig::from_json(r#"{ "name": "companies" }"#)?)?;
//! collections.wire().await;
//!
//! let contacts = collections.get("contacts").unwrap();
//! assert!(contacts.peer("companies").await.is_some());
//! ```
//!
//! # Engines
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB storage (requires `mongodb` feature)

pub mod prelude;

pub use docpipe_core::{
    backend, cache, cast, collection, config, context, document, error, hooks, modifier, page,
    query, registry, schema, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory engine and cache implementations.
pub mod memory {
    pub use docpipe_memory::{InMemoryCache, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB engine implementation.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docpipe_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
