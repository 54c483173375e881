//! Error types and result types for collection operations.
//!
//! Validation problems found while coercing documents are not errors: they are reported as
//! [`CoercionIssue`](crate::schema::CoercionIssue)s and logged. The variants here cover the
//! genuinely fatal paths (invalid configuration, failing backends, copying a missing document).
//! Use [`CollectionResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with a collection.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The schema declaration is invalid (unknown cast, duplicate field, malformed config).
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// A selector or query could not be interpreted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// `copy` was asked to duplicate a document that does not exist.
    /// The first argument is the document identity, the second is the collection name.
    #[error("Copy source {0} not found in collection {1}")]
    CopySourceNotFound(String, String),
    /// An error occurred in the underlying persistence engine.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A specialized `Result` type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

impl From<BsonError> for CollectionError {
    fn from(err: BsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for CollectionError {
    fn from(err: SerdeJsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}

impl From<std::convert::Infallible> for CollectionError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
