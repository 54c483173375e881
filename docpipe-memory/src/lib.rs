//! In-memory persistence engine for docpipe.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait and
//! the `Cache` trait. It uses async-aware read-write locks for concurrent access and is meant
//! for development, testing and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Selector support** - Comparison, logical, membership and existence operators over dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc` and `$push`
//! - **Unique indexes** - Enforced on insert, update and replace
//!
//! # Quick Start
//!
//! ```ignore
//! use docpipe::{collection::Collection, context::Context, memory::InMemoryStore};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(InMemoryStore::new());
//!     let users = Collection::builder("users", backend).build()?;
//!
//!     let alice = users.create(doc! { "name": "Alice" }, &Context::new()).await?;
//!     assert!(alice.is_some());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpipe_memory;

pub mod cache;
mod evaluator;
pub mod store;
mod update;

pub use cache::InMemoryCache;
pub use store::{InMemoryStore, InMemoryStoreBuilder};
