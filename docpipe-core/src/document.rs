//! Document identity handling.
//!
//! Every persisted document carries its identity under [`ID_FIELD`]. Whenever a document
//! leaves the store it is surfaced with the same value duplicated under [`ID_ALIAS`]; the alias is
//! always derived from the identity field and never written independently.

use bson::{Bson, Document, doc, oid::ObjectId};

/// Name of the identity field, the single source of truth for a document's identity.
pub const ID_FIELD: &str = "_id";

/// Name of the derived identity alias exposed to callers.
pub const ID_ALIAS: &str = "id";

/// Copies the identity field into the `id` alias.
///
/// A document without an identity cannot carry an alias, so any stray `id` is removed.
pub fn with_id(mut document: Document) -> Document {
    match document.get(ID_FIELD).cloned() {
        Some(id) => {
            document.insert(ID_ALIAS, id);
        }
        None => {
            document.remove(ID_ALIAS);
        }
    }

    document
}

/// Optional variant of [`with_id`] used on lookups that may find nothing.
pub fn with_id_opt(document: Option<Document>) -> Option<Document> {
    document.map(with_id)
}

/// Removes both the identity and its alias, leaving only the writable fields.
pub fn without_identity(mut document: Document) -> Document {
    document.remove(ID_FIELD);
    document.remove(ID_ALIAS);
    document
}

/// Builds the selector matching exactly one identity.
pub fn identity_selector(id: impl Into<Bson>) -> Document {
    doc! { ID_FIELD: id.into() }
}

/// Renders an identity for log lines and cache keys.
///
/// Strings are rendered without quotes so `"abc"` and `ObjectId("abc")`-style values both
/// produce a stable bare token.
pub fn identity_key(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

/// The target of a single-document lookup: either a bare identity or a full selector.
///
/// `get`, `save` and `remove` accept anything convertible into a `Lookup`, so callers can pass
/// `"abc123"`, an [`ObjectId`], or `doc! { "email": "jane@example.com" }` interchangeably.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Match on the identity field.
    Id(Bson),
    /// Match on an arbitrary selector.
    Selector(Document),
}

impl Lookup {
    /// Converts the lookup into the selector sent to the store.
    pub fn into_selector(self) -> Document {
        match self {
            Lookup::Id(id) => identity_selector(id),
            Lookup::Selector(selector) => selector,
        }
    }
}

impl From<&str> for Lookup {
    fn from(id: &str) -> Self {
        Lookup::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for Lookup {
    fn from(id: String) -> Self {
        Lookup::Id(Bson::String(id))
    }
}

impl From<ObjectId> for Lookup {
    fn from(id: ObjectId) -> Self {
        Lookup::Id(Bson::ObjectId(id))
    }
}

impl From<Document> for Lookup {
    fn from(selector: Document) -> Self {
        Lookup::Selector(selector)
    }
}

impl From<Bson> for Lookup {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Document(selector) => Lookup::Selector(selector),
            id => Lookup::Id(id),
        }
    }
}
