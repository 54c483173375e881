//! Query normalization and selector handling.
//!
//! Callers hand collections loosely-shaped query objects such as
//! `{ age: { gte: 18 }, status: "active", sort: ["age", -1], limit: 10 }`. The
//! [`QueryNormalizer`] turns those into a canonical selector (`{ age: { $gte: 18 }, status:
//! "active" }`) and a [`PageDescriptor`] (`sort`, `skip`, `limit`).
//!
//! Canonical selectors can also be parsed into an [`Expr`] tree and walked with a
//! [`QueryVisitor`], which is how backends without a native query language evaluate them.
//!
//! # Example
//!
//! ```ignore
//! use docpipe::query::{QueryNormalizer, Filter};
//! use bson::doc;
//!
//! let (selector, page) = QueryNormalizer::normalize(
//!     doc! { "age": { "gte": 18 }, "sort": ["age", -1], "limit": 10 },
//!     doc! {},
//! );
//! assert_eq!(selector, doc! { "age": { "$gte": 18 } });
//! assert_eq!(page.limit, 10);
//!
//! // The same selector, built programmatically
//! let built = Filter::gte("age", 18).to_selector();
//! ```

use bson::{Bson, Document, doc};
use serde::Serialize;
use std::convert::Infallible;

use crate::error::{CollectionError, CollectionResult};

/// Prefix marking an operator key inside a selector.
pub const OPERATOR_PREFIX: char = '$';

const LIMIT_KEY: &str = "limit";
const SKIP_KEY: &str = "skip";
const SORT_KEY: &str = "sort";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// Interprets a raw direction value. Anything that is not a non-zero number sorts descending.
    pub fn from_value(value: &Bson) -> Self {
        match to_number(value) {
            Some(n) if n > 0.0 => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    /// The numeric form understood by document engines.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Canonical sort and pagination settings extracted from a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageDescriptor {
    /// Ordered mapping of field name to direction (`1` or `-1`).
    pub sort: Document,
    /// Number of documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return; `0` means unbounded.
    pub limit: u64,
}

impl PageDescriptor {
    /// Total number of pages for `count` matching documents, `0` when unbounded.
    pub fn pages(&self, count: u64) -> u64 {
        if self.limit > 0 {
            count.div_ceil(self.limit)
        } else {
            0
        }
    }
}

/// Converts loosely-typed query objects into canonical selectors and page descriptors.
pub struct QueryNormalizer;

impl QueryNormalizer {
    /// Splits `query` into a selector and a [`PageDescriptor`].
    ///
    /// `limit`, `skip` and `sort` are extracted; every other key becomes a selector clause via
    /// [`QueryNormalizer::format_query_operator`]. Entries of `parent` are merged last and win
    /// on key collisions.
    pub fn normalize(query: Document, parent: Document) -> (Document, PageDescriptor) {
        let mut page = PageDescriptor::default();
        let mut selector = Document::new();

        for (key, value) in query {
            match key.as_str() {
                LIMIT_KEY => page.limit = to_count(&value),
                SKIP_KEY => page.skip = to_count(&value),
                SORT_KEY => page.sort = Self::normalize_sort(&value),
                _ => {
                    selector.insert(key, Self::format_query_operator(value));
                }
            }
        }

        for (key, value) in parent {
            selector.insert(key, value);
        }

        (selector, page)
    }

    /// Rewrites the keys of a plain mapping into operator keys; scalars pass through unchanged.
    ///
    /// `{ gte: 5 }` becomes `{ $gte: 5 }`, while `5` stays `5`. Keys that already carry the
    /// operator prefix are left alone.
    pub fn format_query_operator(value: Bson) -> Bson {
        match value {
            Bson::Document(clauses) => Bson::Document(
                clauses
                    .into_iter()
                    .map(|(key, value)| {
                        if key.starts_with(OPERATOR_PREFIX) {
                            (key, value)
                        } else {
                            (format!("{OPERATOR_PREFIX}{key}"), value)
                        }
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Normalizes the accepted sort shapes into an ordered `field -> ±1` mapping.
    ///
    /// - `["age", -1]` sorts by `age` in the given direction (descending when the direction is
    ///   missing or not a non-zero number).
    /// - `[["age", 1], ["name", -1]]` is forwarded pair by pair, the way document engines read a
    ///   list of sort pairs.
    /// - `{ age: 1 }` is already canonical.
    /// - A bare string sorts by that field, descending.
    pub fn normalize_sort(sort: &Bson) -> Document {
        match sort {
            Bson::Array(items) if items.is_empty() => Document::new(),
            Bson::Array(items) if !matches!(items[0], Bson::Array(_)) => {
                let Some(field) = items[0].as_str() else {
                    return Document::new();
                };
                let direction = items
                    .get(1)
                    .map(SortDirection::from_value)
                    .unwrap_or(SortDirection::Desc);

                doc! { field: direction.as_i32() }
            }
            Bson::Array(pairs) => pairs
                .iter()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    let field = pair.first()?.as_str()?;
                    let direction = pair
                        .get(1)
                        .map(SortDirection::from_value)
                        .unwrap_or(SortDirection::Desc);

                    Some((field.to_string(), Bson::Int32(direction.as_i32())))
                })
                .collect(),
            Bson::Document(sort) => sort.clone(),
            Bson::String(field) if !field.is_empty() => {
                doc! { field.as_str(): SortDirection::Desc.as_i32() }
            }
            _ => Document::new(),
        }
    }

    /// Turns a field list such as `"name, email age"` into a projection `{ name: 1, email: 1, age: 1 }`.
    pub fn format_fields(fields: &str) -> Document {
        fields
            .split(|c: char| c.is_whitespace() || c == ',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(|field| (field.to_string(), Bson::Int32(1)))
            .collect()
    }
}

/// Numeric reading of a loosely-typed value, mirroring unary-plus semantics.
pub(crate) fn to_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) if n.is_finite() => Some(*n),
        Bson::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Bson::Null => Some(0.0),
        Bson::String(s) if s.trim().is_empty() => Some(0.0),
        Bson::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn to_count(value: &Bson) -> u64 {
    match to_number(value) {
        Some(n) if n > 0.0 => n.trunc() as u64,
        _ => 0,
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (or, for array fields, containing the value).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Equal to any of the listed values.
    In,
    /// Equal to none of the listed values.
    Nin,
    /// Array field contains all of the listed values.
    All,
}

impl FieldOp {
    /// Parses an operator key (including its prefix).
    pub fn from_operator(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            "$all" => FieldOp::All,
            _ => return None,
        })
    }

    /// The operator key for this comparison.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
            FieldOp::All => "$all",
        }
    }
}

/// A filter expression over documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name (dotted paths allowed) to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a canonical selector into an expression tree.
    ///
    /// Top-level clauses are ANDed. Supported logical operators are `$and`, `$or` and `$nor`;
    /// supported field operators are `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
    /// `$all`, `$exists` and `$not`. A field value that is not an operator object is an implicit
    /// equality.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidQuery`] for unknown operators or malformed operands.
    pub fn from_selector(selector: &Document) -> CollectionResult<Expr> {
        let mut clauses = Vec::with_capacity(selector.len());

        for (key, value) in selector {
            if key.starts_with(OPERATOR_PREFIX) {
                clauses.push(Self::parse_logical(key, value)?);
            } else {
                clauses.push(Self::parse_field(key, value)?);
            }
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Expr::And(clauses),
        })
    }

    /// Renders this expression back into a canonical selector.
    pub fn to_selector(&self) -> Document {
        match SelectorRenderer.visit_expr(self) {
            Ok(selector) => selector,
            Err(never) => match never {},
        }
    }

    fn parse_logical(key: &str, value: &Bson) -> CollectionResult<Expr> {
        let branches = value
            .as_array()
            .ok_or_else(|| CollectionError::InvalidQuery(format!("{key} expects an array")))?
            .iter()
            .map(|branch| match branch {
                Bson::Document(selector) => Self::from_selector(selector),
                _ => Err(CollectionError::InvalidQuery(format!("{key} expects selector objects"))),
            })
            .collect::<CollectionResult<Vec<_>>>()?;

        match key {
            "$and" => Ok(Expr::And(branches)),
            "$or" => Ok(Expr::Or(branches)),
            "$nor" => Ok(Expr::Or(branches).not()),
            _ => Err(CollectionError::InvalidQuery(format!("unsupported operator {key}"))),
        }
    }

    fn parse_field(field: &str, value: &Bson) -> CollectionResult<Expr> {
        let clauses = match value {
            Bson::Document(clauses) if is_operator_object(clauses) => clauses,
            _ => return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
        };

        let mut exprs = Vec::with_capacity(clauses.len());

        for (key, operand) in clauses {
            let expr = match key.as_str() {
                "$exists" => Expr::Exists(field.to_string(), is_truthy(operand)),
                "$not" => match operand {
                    Bson::Document(inner) => Self::parse_field(field, &Bson::Document(inner.clone()))?.not(),
                    _ => return Err(CollectionError::InvalidQuery("$not expects an operator object".into())),
                },
                op => {
                    let op = FieldOp::from_operator(op)
                        .ok_or_else(|| CollectionError::InvalidQuery(format!("unsupported operator {op}")))?;

                    if matches!(op, FieldOp::In | FieldOp::Nin | FieldOp::All) && operand.as_array().is_none() {
                        return Err(CollectionError::InvalidQuery(format!("{} expects an array", op.operator())));
                    }

                    Expr::field(field.to_string(), op, operand.clone())
                }
            };

            exprs.push(expr);
        }

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }
}

fn is_operator_object(clauses: &Document) -> bool {
    !clauses.is_empty() && clauses.keys().all(|key| key.starts_with(OPERATOR_PREFIX))
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => to_number(other).map(|n| n != 0.0).unwrap_or(true),
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
///
/// # Example
///
/// ```ignore
/// use docpipe::query::Filter;
///
/// let selector = Filter::eq("status", "active")
///     .and(Filter::gt("age", 18))
///     .to_selector();
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(field.into(), FieldOp::In, Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(field.into(), FieldOp::Nin, Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<CollectionError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Renders expressions into canonical selector documents.
struct SelectorRenderer;

impl QueryVisitor for SelectorRenderer {
    type Output = Document;
    type Error = Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { op.operator(): value.clone() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mappings_become_operator_clauses() {
        assert_eq!(
            QueryNormalizer::format_query_operator(Bson::Document(doc! { "gte": 5 })),
            Bson::Document(doc! { "$gte": 5 })
        );
        assert_eq!(QueryNormalizer::format_query_operator(Bson::Int32(5)), Bson::Int32(5));
    }

    #[test]
    fn normalize_extracts_paging_and_merges_parent_last() {
        let (selector, page) = QueryNormalizer::normalize(
            doc! {
                "status": "draft",
                "age": { "lt": 30 },
                "limit": "10",
                "skip": 20,
                "sort": ["age", 1],
            },
            doc! { "status": "published", "owner": "u1" },
        );

        assert_eq!(
            selector,
            doc! { "status": "published", "age": { "$lt": 30 }, "owner": "u1" }
        );
        assert_eq!(page.limit, 10);
        assert_eq!(page.skip, 20);
        assert_eq!(page.sort, doc! { "age": 1 });
    }

    #[test]
    fn paging_defaults_to_unbounded() {
        let (_, page) = QueryNormalizer::normalize(doc! { "limit": "abc", "skip": -4 }, doc! {});

        assert_eq!(page.limit, 0);
        assert_eq!(page.skip, 0);
        assert!(page.sort.is_empty());
    }

    #[test]
    fn sort_direction_defaults_to_descending() {
        assert_eq!(QueryNormalizer::normalize_sort(&Bson::Array(vec!["age".into(), (-1).into()])), doc! { "age": -1 });
        assert_eq!(QueryNormalizer::normalize_sort(&Bson::Array(vec!["age".into()])), doc! { "age": -1 });
        assert_eq!(QueryNormalizer::normalize_sort(&Bson::Array(vec!["age".into(), "up".into()])), doc! { "age": -1 });
        assert_eq!(QueryNormalizer::normalize_sort(&Bson::Array(vec!["age".into(), "1".into()])), doc! { "age": 1 });
    }

    #[test]
    fn nested_sort_pairs_are_forwarded_in_order() {
        let sort = bson::bson!([["age", 1], ["name", -1], ["createdAt", "x"]]);

        let normalized = QueryNormalizer::normalize_sort(&sort);

        assert_eq!(normalized, doc! { "age": 1, "name": -1, "createdAt": -1 });
        assert_eq!(normalized.keys().collect::<Vec<_>>(), vec!["age", "name", "createdAt"]);
    }

    #[test]
    fn pages_round_up() {
        let page = PageDescriptor { limit: 10, ..Default::default() };

        assert_eq!(page.pages(25), 3);
        assert_eq!(page.pages(20), 2);
        assert_eq!(PageDescriptor::default().pages(25), 0);
    }

    #[test]
    fn format_fields_builds_projection() {
        assert_eq!(
            QueryNormalizer::format_fields(" name, email  age,"),
            doc! { "name": 1, "email": 1, "age": 1 }
        );
    }

    #[test]
    fn selector_parses_into_expression_tree() {
        let expr = Expr::from_selector(&doc! {
            "age": { "$gte": 18, "$lt": 65 },
            "status": "active",
            "$or": [{ "role": "admin" }, { "tags": { "$in": ["staff"] } }],
        })
        .unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::And(vec![Filter::gte("age", 18), Filter::lt("age", 65)]),
                Filter::eq("status", "active"),
                Expr::Or(vec![Filter::eq("role", "admin"), Filter::any_of("tags", ["staff"])]),
            ])
        );
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let err = Expr::from_selector(&doc! { "name": { "$regex": "^J" } }).unwrap_err();

        assert!(matches!(err, CollectionError::InvalidQuery(_)));
    }

    #[test]
    fn filters_render_to_selectors() {
        let selector = Filter::eq("status", "active")
            .and(Filter::not_exists("deletedAt"))
            .to_selector();

        assert_eq!(
            selector,
            doc! { "$and": [
                { "status": { "$eq": "active" } },
                { "deletedAt": { "$exists": false } },
            ] }
        );
        assert_eq!(
            Expr::from_selector(&selector).unwrap(),
            Expr::And(vec![Filter::eq("status", "active"), Filter::not_exists("deletedAt")])
        );
    }
}
