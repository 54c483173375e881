//! MongoDB persistence engine for docpipe.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Selectors,
//! update modifiers and aggregation pipelines are handed to the server unchanged, so every
//! operator MongoDB understands is available to collections built on it.
//!
//! To use this engine, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docpipe = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docpipe::{backend::StoreBackendBuilder, mongodb::MongoDbStore, registry::Collections};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collections = Collections::connect(
//!         MongoDbStore::builder("mongodb://localhost:27017", "my_database"),
//!     )
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpipe_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
