//! Declarative collection configuration.
//!
//! A collection can be described entirely in JSON:
//!
//! ```json
//! {
//!   "name": "contacts",
//!   "logging": false,
//!   "schema": [
//!     { "name": "firstName", "required": true, "cast": "firstName" },
//!     { "name": "email", "required": true, "requiredException": ["phone"] },
//!     { "name": "phone", "cast": "phone" },
//!     { "name": "birthday", "type": "date" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    error::{CollectionError, CollectionResult},
    schema::{FieldSpec, Schema},
};

fn default_logging() -> bool {
    true
}

/// Serializable description of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Collection name on the engine.
    pub name: String,
    /// Whether operation logging starts enabled.
    #[serde(default = "default_logging")]
    pub logging: bool,
    /// Field declarations, in order.
    #[serde(default)]
    pub schema: Vec<FieldSpec>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logging: default_logging(),
            schema: Vec::new(),
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidSchema`] on malformed JSON, unknown casts or unknown
    /// field types.
    pub fn from_json(json: &str) -> CollectionResult<Self> {
        serde_json::from_str(json).map_err(|e| CollectionError::InvalidSchema(e.to_string()))
    }

    /// Validates the field declarations into a [`Schema`].
    pub fn build_schema(&self) -> CollectionResult<Schema> {
        if self.name.is_empty() {
            return Err(CollectionError::InvalidSchema("collection name cannot be empty".into()));
        }

        Schema::new(self.schema.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cast::Cast, schema::FieldType};

    #[test]
    fn parses_json_configuration() {
        let config = CollectionConfig::from_json(
            r#"{
                "name": "contacts",
                "schema": [
                    { "name": "firstName", "required": true, "cast": "firstName" },
                    { "name": "birthday", "type": "date" }
                ]
            }"#,
        )
        .unwrap();

        assert!(config.logging);
        let schema = config.build_schema().unwrap();
        assert_eq!(schema.field("firstName").unwrap().cast, Some(Cast::FirstName));
        assert_eq!(schema.field("birthday").unwrap().field_type, Some(FieldType::Date));
    }

    #[test]
    fn rejects_unknown_casts_and_duplicates() {
        let unknown = CollectionConfig::from_json(r#"{ "name": "c", "schema": [{ "name": "a", "cast": "upper" }] }"#);
        assert!(matches!(unknown, Err(CollectionError::InvalidSchema(_))));

        let duplicate = CollectionConfig::from_json(r#"{ "name": "c", "schema": [{ "name": "a" }, { "name": "a" }] }"#)
            .unwrap()
            .build_schema();
        assert!(matches!(duplicate, Err(CollectionError::InvalidSchema(_))));
    }
}
