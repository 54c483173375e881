//! Built-in cast functions applied during schema coercion.
//!
//! A cast either derives a field from its siblings (`firstName` from `name`) or rewrites the
//! field's own value (`phone`). Casts are identified by name in schema declarations and parsed
//! into [`Cast`] when the schema is built, so an unknown name is rejected up front.

use bson::{Bson, Document};
use phonenumber::{Mode, country};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::CollectionError;

/// Region assumed for phone numbers written without an international prefix.
pub const DEFAULT_PHONE_REGION: country::Id = country::Id::US;

/// A named transformation applied to a field during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cast {
    /// First space-separated token of `name`.
    FirstName,
    /// Second space-separated token of `name`.
    LastName,
    /// `firstName` joined with `lastName` (when present) by a single space.
    Name,
    /// The field's own value parsed as a phone number and formatted as E.164.
    Phone,
}

impl Cast {
    /// Every built-in cast, in declaration order.
    pub const ALL: [Cast; 4] = [Cast::FirstName, Cast::LastName, Cast::Name, Cast::Phone];

    /// The identifier used in schema declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cast::FirstName => "firstName",
            Cast::LastName => "lastName",
            Cast::Name => "name",
            Cast::Phone => "phone",
        }
    }

    /// Computes the cast value.
    ///
    /// `source` is the full input document and `current` the field's value, if any. Returns
    /// `None` when no usable value can be produced.
    pub fn apply(&self, source: &Document, current: Option<&Bson>) -> Option<Bson> {
        match self {
            Cast::FirstName => name_part(source, 0),
            Cast::LastName => name_part(source, 1),
            Cast::Name => {
                let first = non_empty_str(source.get("firstName"))?;

                Some(Bson::String(match non_empty_str(source.get("lastName")) {
                    Some(last) => format!("{first} {last}"),
                    None => first.to_string(),
                }))
            }
            Cast::Phone => {
                let raw = match current? {
                    Bson::String(s) => s.clone(),
                    Bson::Int32(n) => n.to_string(),
                    Bson::Int64(n) => n.to_string(),
                    _ => return None,
                };

                phonenumber::parse(Some(DEFAULT_PHONE_REGION), raw)
                    .ok()
                    .map(|number| Bson::String(number.format().mode(Mode::E164).to_string()))
            }
        }
    }
}

fn non_empty_str(value: Option<&Bson>) -> Option<&str> {
    value
        .and_then(Bson::as_str)
        .filter(|s| !s.is_empty())
}

fn name_part(source: &Document, index: usize) -> Option<Bson> {
    non_empty_str(source.get("name"))?
        .split(' ')
        .nth(index)
        .filter(|part| !part.is_empty())
        .map(|part| Bson::String(part.to_string()))
}

impl FromStr for Cast {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cast::ALL
            .into_iter()
            .find(|cast| cast.as_str() == s)
            .ok_or_else(|| CollectionError::InvalidSchema(format!("unknown cast function: {s}")))
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
