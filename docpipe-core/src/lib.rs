//! A document collection layer that sits between application code and a document-oriented
//! persistence engine.
//!
//! This crate is the core of the docpipe project and provides:
//!
//! - **Identity handling** ([`document`]) - `_id` / `id` aliasing and single-document lookups
//! - **Query normalization** ([`query`]) - Loose query objects to canonical selectors, sort and paging
//! - **Schema coercion** ([`schema`], [`cast`]) - Declarative field specs, required-field policy and casts
//! - **Update modifiers** ([`modifier`]) - Partial documents to `$set`/`$unset` updates
//! - **Engine abstraction** ([`backend`]) - The contract persistence engines implement
//! - **Document store** ([`store`]) - Identity-aliased pass-through over an engine collection
//! - **Collections** ([`collection`]) - The create/save/remove lifecycle pipeline with [`hooks`]
//! - **Registry and configuration** ([`registry`], [`config`]) - Named collections and JSON declarations
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docpipe_core::{collection::Collection, context::Context, schema::FieldSpec, cast::Cast};
//! use bson::doc;
//!
//! let contacts = Collection::builder("contacts", backend)
//!     .with_field(FieldSpec::new("firstName").required().cast(Cast::FirstName))
//!     .with_field(FieldSpec::new("lastName").required().cast(Cast::LastName))
//!     .build()?;
//!
//! let jane = contacts
//!     .create(doc! { "name": "Jane Doe" }, &Context::new())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpipe_core;

pub mod backend;
pub mod cache;
pub mod cast;
pub mod collection;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod hooks;
pub mod modifier;
pub mod page;
pub mod query;
pub mod registry;
pub mod schema;
pub mod store;
