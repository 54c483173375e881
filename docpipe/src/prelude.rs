//! Convenient re-exports of commonly used types from docpipe.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docpipe::prelude::*;
//! ```

pub use docpipe_core::{
    backend::{FindOptions, IndexSpec, StoreBackend, StoreBackendBuilder, WriteModel},
    cache::{Cache, NoCache},
    cast::Cast,
    collection::{Collection, CollectionBuilder},
    config::CollectionConfig,
    context::{Context, OperationOptions, Resolver},
    document::Lookup,
    error::{CollectionError, CollectionResult},
    hooks::{HookContext, Hooks, NoHooks},
    modifier::{Modifier, ModifierDiffer, ModifierOptions},
    page::SearchPage,
    query::{Expr, Filter, PageDescriptor, QueryNormalizer, QueryVisitor, SortDirection},
    registry::Collections,
    schema::{Coerced, FieldSpec, FieldType, Schema, SchemaInput},
    store::DocumentStore,
};
