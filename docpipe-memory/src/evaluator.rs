//! Selector evaluation for in-memory document filtering.
//!
//! Selectors are parsed into an [`Expr`] tree by the core crate and walked here with a
//! [`QueryVisitor`]. Field paths may be dotted (`address.city`) and traverse arrays of
//! sub-documents; comparisons against array fields match when any element matches.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docpipe_core::{
    error::{CollectionError, CollectionResult},
    query::{Expr, FieldOp, QueryVisitor, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Cross-type ordering rank, following the usual document-database ordering.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting; values of different types order by type.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Collects every value reachable at a dotted `path`.
///
/// Numeric segments index into arrays; other segments applied to an array are mapped over its
/// sub-documents.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };

    let mut current = document
        .get(first)
        .into_iter()
        .collect::<Vec<_>>();

    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|value| descend(value, segment))
            .collect();
    }

    current
}

fn descend<'a>(value: &'a Bson, segment: &str) -> Vec<&'a Bson> {
    match value {
        Bson::Document(document) => document.get(segment).into_iter().collect(),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get(index).into_iter().collect(),
            Err(_) => items
                .iter()
                .filter_map(|item| item.as_document())
                .filter_map(|document| document.get(segment))
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// The value used when sorting on `path`: the first reachable value, or null.
pub(crate) fn sort_key<'a>(document: &'a Document, path: &str) -> Comparable<'a> {
    lookup(document, path)
        .into_iter()
        .next()
        .map(Comparable::from)
        .unwrap_or(Comparable::Null)
}

/// Orders documents by a canonical sort specification.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, dir) in sort {
        let ordering = sort_key(a, path).sort_cmp(&sort_key(b, path));
        let ordering = match SortDirection::from_value(dir) {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> CollectionResult<bool> {
        self.visit_expr(expr)
    }

    /// Equality with array-membership semantics. A missing field equals `null`.
    fn matches_eq(values: &[&Bson], expected: &Bson) -> bool {
        let expected = Comparable::from(expected);

        if values.is_empty() {
            return expected == Comparable::Null;
        }

        values.iter().any(|value| {
            let value = Comparable::from(*value);

            value == expected
                || matches!(&value, Comparable::Array(items) if items.iter().any(|item| item == &expected))
        })
    }

    fn matches_ordering(values: &[&Bson], expected: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(expected);

        values.iter().any(|value| match Comparable::from(*value) {
            Comparable::Array(items) => items
                .iter()
                .any(|item| item.partial_cmp(&expected).is_some_and(&accept)),
            value => value
                .partial_cmp(&expected)
                .is_some_and(&accept),
        })
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = CollectionError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!lookup(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let values = lookup(self.document, field);

        let list = || -> CollectionResult<&Vec<Bson>> {
            value
                .as_array()
                .ok_or_else(|| CollectionError::InvalidQuery(format!("{} expects an array", op.operator())))
        };

        Ok(match op {
            FieldOp::Eq => Self::matches_eq(&values, value),
            FieldOp::Ne => !Self::matches_eq(&values, value),
            FieldOp::Gt => Self::matches_ordering(&values, value, |o| o == Ordering::Greater),
            FieldOp::Gte => Self::matches_ordering(&values, value, |o| o != Ordering::Less),
            FieldOp::Lt => Self::matches_ordering(&values, value, |o| o == Ordering::Less),
            FieldOp::Lte => Self::matches_ordering(&values, value, |o| o != Ordering::Greater),
            FieldOp::In => list()?
                .iter()
                .any(|candidate| Self::matches_eq(&values, candidate)),
            FieldOp::Nin => !list()?
                .iter()
                .any(|candidate| Self::matches_eq(&values, candidate)),
            FieldOp::All => {
                let required = list()?;
                !required.is_empty()
                    && required
                        .iter()
                        .all(|candidate| Self::matches_eq(&values, candidate))
            }
        })
    }
}

/// Whether `document` satisfies `expr`.
pub(crate) fn matches(document: &Document, expr: &Expr) -> CollectionResult<bool> {
    DocumentEvaluator::new(document).evaluate(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eval(document: &Document, selector: Document) -> bool {
        matches(document, &Expr::from_selector(&selector).unwrap()).unwrap()
    }

    #[test]
    fn matches_nested_paths_and_arrays() {
        let document = doc! {
            "name": "Jane",
            "age": 34,
            "tags": ["admin", "ops"],
            "address": { "city": "Oslo" },
            "pets": [{ "kind": "cat" }, { "kind": "dog" }],
        };

        assert!(eval(&document, doc! { "address.city": "Oslo" }));
        assert!(eval(&document, doc! { "tags": "ops" }));
        assert!(eval(&document, doc! { "pets.kind": "dog" }));
        assert!(eval(&document, doc! { "tags.0": "admin" }));
        assert!(eval(&document, doc! { "age": { "$gte": 30, "$lt": 40 } }));
        assert!(eval(&document, doc! { "age": { "$in": [33, 34.0] } }));
        assert!(eval(&document, doc! { "tags": { "$all": ["ops", "admin"] } }));
        assert!(!eval(&document, doc! { "tags": { "$nin": ["ops"] } }));
        assert!(eval(&document, doc! { "missing": Bson::Null }));
        assert!(eval(&document, doc! { "missing": { "$exists": false } }));
        assert!(eval(&document, doc! { "$or": [{ "age": 1 }, { "name": "Jane" }] }));
        assert!(!eval(&document, doc! { "$nor": [{ "name": "Jane" }] }));
        assert!(eval(&document, doc! { "age": { "$not": { "$gt": 40 } } }));
    }

    #[test]
    fn sorts_across_types_and_keys() {
        let a = doc! { "rank": 1, "name": "b" };
        let b = doc! { "rank": 1, "name": "a" };
        let c = doc! { "name": "c" };

        let sort = doc! { "rank": -1, "name": 1 };
        let mut documents = vec![c.clone(), a.clone(), b.clone()];
        documents.sort_by(|x, y| compare_documents(x, y, &sort));

        assert_eq!(documents, vec![b, a, c]);
    }
}
