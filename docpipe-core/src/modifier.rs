//! Update modifiers derived from a desired document.
//!
//! [`ModifierDiffer::diff`] turns a partial document into a field-level update: every supplied
//! value becomes a `$set` entry on its dotted path and `null` becomes an `$unset` entry. Empty
//! strings are skipped unless `keep_empty_strings` is on. Only the supplied fields are touched;
//! nothing is compared against the stored document.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

/// Knobs for [`ModifierDiffer::diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifierOptions {
    /// Set arrays whole instead of flattening them into positional paths.
    pub keep_arrays: bool,
    /// Set empty strings instead of skipping the field.
    pub keep_empty_strings: bool,
}

impl Default for ModifierOptions {
    fn default() -> Self {
        Self {
            keep_arrays: true,
            keep_empty_strings: false,
        }
    }
}

/// A field-level update instruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifier {
    /// Dotted path -> value to write.
    pub set: Document,
    /// Dotted path -> `""`, fields to remove.
    pub unset: Document,
}

impl Modifier {
    /// Whether applying the modifier would change nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Adds a `$set` entry, replacing any pending unset of the same path.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Bson>) {
        let path = path.into();
        self.unset.remove(&path);
        self.set.insert(path, value.into());
    }

    /// Renders the update document, omitting empty sections.
    pub fn into_update(self) -> Document {
        let mut update = doc! {};

        if !self.set.is_empty() {
            update.insert("$set", self.set);
        }
        if !self.unset.is_empty() {
            update.insert("$unset", self.unset);
        }

        update
    }
}

/// Computes [`Modifier`]s.
pub struct ModifierDiffer;

impl ModifierDiffer {
    /// Derives the modifier that writes `desired` over an existing document.
    pub fn diff(desired: &Document, options: ModifierOptions) -> Modifier {
        let mut modifier = Modifier::default();

        for (key, value) in desired {
            Self::flatten(key.clone(), value, options, &mut modifier);
        }

        modifier
    }

    fn flatten(path: String, value: &Bson, options: ModifierOptions, modifier: &mut Modifier) {
        match value {
            Bson::Document(nested) if !nested.is_empty() => {
                for (key, value) in nested {
                    Self::flatten(format!("{path}.{key}"), value, options, modifier);
                }
            }
            Bson::Array(items) if !options.keep_arrays && !items.is_empty() => {
                for (index, value) in items.iter().enumerate() {
                    Self::flatten(format!("{path}.{index}"), value, options, modifier);
                }
            }
            Bson::Null | Bson::Undefined => {
                modifier.unset.insert(path, "");
            }
            Bson::String(s) if s.is_empty() && !options.keep_empty_strings => {}
            other => {
                modifier.set.insert(path, other.clone());
            }
        }
    }
}
