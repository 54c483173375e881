//! Declarative field schemas and document coercion.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s. Coercing a document against it:
//!
//! - keeps declared fields first (in schema order) and passes unknown fields through untouched,
//! - fills or flags missing required fields,
//! - converts `date` fields into BSON datetimes,
//! - runs each field's [`Cast`].
//!
//! Problems are reported as [`CoercionIssue`]s and logged; the offending record stays in the
//! output. Callers must not assume invalid records have been filtered out.
//!
//! # Example
//!
//! ```ignore
//! use docpipe::schema::{Schema, FieldSpec, SchemaInput};
//! use docpipe::cast::Cast;
//! use bson::doc;
//!
//! let schema = Schema::new(vec![
//!     FieldSpec::new("firstName").required().cast(Cast::FirstName),
//!     FieldSpec::new("phone").cast(Cast::Phone),
//! ])?;
//!
//! let coerced = schema.coerce(SchemaInput::Single(doc! { "name": "Jane Doe" }));
//! assert!(coerced.is_clean());
//! ```

use bson::{Bson, Document};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashSet, fmt};
use tracing::warn;

use crate::{
    cast::Cast,
    error::{CollectionError, CollectionResult},
};

const PAGE_DATA_KEY: &str = "data";
const PAGE_LIMIT_KEY: &str = "limit";

/// The declared type of a field. Only `date` changes coercion behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

/// Declaration of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// The field name.
    pub name: String,
    /// Optional declared type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// Whether the field must be present after coercion.
    #[serde(default)]
    pub required: bool,
    /// Optional cast applied to the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<Cast>,
    /// Fields whose presence waives `required`. Accepts a single name or a list.
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub required_exception: Vec<String>,
}

impl FieldSpec {
    /// Creates an optional, untyped field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
            required: false,
            cast: None,
            required_exception: Vec::new(),
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the declared type.
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Sets the cast applied to the field.
    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    /// Waives the requirement when any of `fields` is present on the input.
    pub fn required_unless<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_exception
            .extend(fields.into_iter().map(Into::into));
        self
    }

    fn is_waived_by(&self, source: &Document) -> bool {
        self.required_exception
            .iter()
            .any(|field| source.contains_key(field))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(field) => vec![field],
        OneOrMany::Many(fields) => fields,
    })
}

/// What went wrong with a field during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A required field is absent and neither an exception nor a cast could account for it.
    MissingRequired,
    /// The field's cast produced no usable value.
    CastFailed,
    /// A `date` field holds a value that cannot be read as a date.
    InvalidDate,
}

/// A validation problem found while coercing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionIssue {
    /// Position of the record in the input (always `0` for single documents).
    pub record: usize,
    /// The field concerned.
    pub field: String,
    /// The kind of problem.
    pub kind: IssueKind,
}

impl fmt::Display for CoercionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            IssueKind::MissingRequired => "field is missing",
            IssueKind::CastFailed => "cast produced no value",
            IssueKind::InvalidDate => "value is not a valid date",
        };

        write!(f, "record {}: {} {}", self.record, self.field, reason)
    }
}

/// Input accepted by [`Schema::coerce`]: a document, a list of documents, or a paginated
/// envelope `{ data: [...], limit, ... }`. The output keeps the same shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaInput {
    /// A single document.
    Single(Document),
    /// A list of documents.
    List(Vec<Document>),
    /// A paginated envelope. `envelope` holds every key other than `data`, in order.
    Page {
        data: Vec<Document>,
        envelope: Document,
    },
}

impl SchemaInput {
    /// Detects the shape of a loosely-typed value.
    ///
    /// A document with an array `data` and a non-zero `limit` is treated as a paginated envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidDocument`] when the value (or a list element) is not a
    /// document.
    pub fn detect(value: Bson) -> CollectionResult<Self> {
        match value {
            Bson::Array(items) => Ok(SchemaInput::List(documents_of(items)?)),
            Bson::Document(mut document) => {
                let is_page = matches!(document.get(PAGE_DATA_KEY), Some(Bson::Array(_)))
                    && document
                        .get(PAGE_LIMIT_KEY)
                        .and_then(crate::query::to_number)
                        .is_some_and(|limit| limit != 0.0);

                if !is_page {
                    return Ok(SchemaInput::Single(document));
                }

                let data = match document.remove(PAGE_DATA_KEY) {
                    Some(Bson::Array(items)) => documents_of(items)?,
                    _ => Vec::new(),
                };

                Ok(SchemaInput::Page { data, envelope: document })
            }
            other => Err(CollectionError::InvalidDocument(format!(
                "expected a document or a list of documents, got {other}"
            ))),
        }
    }

    /// Converts back into a loosely-typed value. Envelopes get `data` appended after their
    /// other keys.
    pub fn into_bson(self) -> Bson {
        match self {
            SchemaInput::Single(document) => Bson::Document(document),
            SchemaInput::List(documents) => Bson::Array(documents.into_iter().map(Bson::Document).collect()),
            SchemaInput::Page { data, mut envelope } => {
                envelope.insert(
                    PAGE_DATA_KEY,
                    Bson::Array(data.into_iter().map(Bson::Document).collect()),
                );
                Bson::Document(envelope)
            }
        }
    }
}

fn documents_of(items: Vec<Bson>) -> CollectionResult<Vec<Document>> {
    items
        .into_iter()
        .map(|item| match item {
            Bson::Document(document) => Ok(document),
            other => Err(CollectionError::InvalidDocument(format!("expected a document, got {other}"))),
        })
        .collect()
}

/// Result of a coercion: the shaped output plus every issue found.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub output: SchemaInput,
    pub issues: Vec<CoercionIssue>,
}

impl Coerced {
    /// Whether coercion found no issue.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Indices of records with at least one issue.
    pub fn failed_records(&self) -> Vec<usize> {
        let mut records = self
            .issues
            .iter()
            .map(|issue| issue.record)
            .collect::<Vec<_>>();
        records.dedup();
        records
    }
}

/// An ordered, append-only list of field declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate field names.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidSchema`] if two specs share a name.
    pub fn new(fields: Vec<FieldSpec>) -> CollectionResult<Self> {
        let mut schema = Schema::default();

        for field in fields {
            schema.push(field)?;
        }

        Ok(schema)
    }

    /// Appends a field declaration.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidSchema`] if the field name is empty or already declared.
    pub fn push(&mut self, field: FieldSpec) -> CollectionResult<()> {
        if field.name.is_empty() {
            return Err(CollectionError::InvalidSchema("field name cannot be empty".into()));
        }
        if self.field(&field.name).is_some() {
            return Err(CollectionError::InvalidSchema(format!("duplicate field: {}", field.name)));
        }

        self.fields.push(field);
        Ok(())
    }

    /// The declared fields, in order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Coerces a document, a list or a paginated envelope, preserving its shape.
    pub fn coerce(&self, input: SchemaInput) -> Coerced {
        let mut issues = Vec::new();

        let output = match input {
            SchemaInput::Single(document) => {
                SchemaInput::Single(self.coerce_record(0, document, &mut issues))
            }
            SchemaInput::List(documents) => SchemaInput::List(self.coerce_all(documents, &mut issues)),
            SchemaInput::Page { data, envelope } => SchemaInput::Page {
                data: self.coerce_all(data, &mut issues),
                envelope,
            },
        };

        Coerced { output, issues }
    }

    /// Coerces a single document.
    pub fn coerce_document(&self, document: Document) -> (Document, Vec<CoercionIssue>) {
        let mut issues = Vec::new();
        let document = self.coerce_record(0, document, &mut issues);

        (document, issues)
    }

    /// Coerces a list of documents; issues carry each document's position.
    pub fn coerce_documents(&self, documents: Vec<Document>) -> (Vec<Document>, Vec<CoercionIssue>) {
        let mut issues = Vec::new();
        let documents = self.coerce_all(documents, &mut issues);

        (documents, issues)
    }

    fn coerce_all(&self, documents: Vec<Document>, issues: &mut Vec<CoercionIssue>) -> Vec<Document> {
        documents
            .into_iter()
            .enumerate()
            .map(|(record, document)| self.coerce_record(record, document, issues))
            .collect()
    }

    fn coerce_record(&self, record: usize, source: Document, issues: &mut Vec<CoercionIssue>) -> Document {
        if self.fields.is_empty() {
            return source;
        }

        let declared = self
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect::<HashSet<_>>();

        let mut consistent = Document::new();
        for field in &self.fields {
            if let Some(value) = source.get(&field.name) {
                consistent.insert(field.name.clone(), value.clone());
            }
        }

        let mut flag = |field: &FieldSpec, kind: IssueKind| {
            let issue = CoercionIssue { record, field: field.name.clone(), kind };
            warn!(record, field = %field.name, "coercion issue: {issue}");
            issues.push(issue);
        };

        for field in &self.fields {
            if field.required && !consistent.contains_key(&field.name) && !field.is_waived_by(&source) {
                match field.cast.and_then(|cast| cast.apply(&source, None)) {
                    Some(value) => {
                        consistent.insert(field.name.clone(), value);
                    }
                    None => flag(field, IssueKind::MissingRequired),
                }
            }

            if field.field_type == Some(FieldType::Date) {
                if let Some(value) = consistent.get(&field.name) {
                    match to_datetime(value) {
                        Some(date) => {
                            consistent.insert(field.name.clone(), Bson::DateTime(date));
                        }
                        None => flag(field, IssueKind::InvalidDate),
                    }
                }
            }

            if let Some(cast) = field.cast {
                let current = consistent
                    .get(&field.name)
                    .filter(|value| is_present(value))
                    .cloned();

                if let Some(current) = current {
                    match cast.apply(&source, Some(&current)) {
                        Some(value) => {
                            consistent.insert(field.name.clone(), value);
                        }
                        None => flag(field, IssueKind::CastFailed),
                    }
                }
            }
        }

        for (key, value) in source {
            if !declared.contains(key.as_str()) {
                consistent.insert(key, value);
            }
        }

        consistent
    }
}

fn is_present(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Reads a value as a point in time: BSON datetimes, RFC 3339 or `YYYY-MM-DD` strings, and
/// epoch milliseconds.
pub fn to_datetime(value: &Bson) -> Option<bson::DateTime> {
    match value {
        Bson::DateTime(date) => Some(*date),
        Bson::Int32(millis) => Some(bson::DateTime::from_millis(i64::from(*millis))),
        Bson::Int64(millis) => Some(bson::DateTime::from_millis(*millis)),
        Bson::Double(millis) if millis.is_finite() => Some(bson::DateTime::from_millis(*millis as i64)),
        Bson::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|date| date.timestamp_millis())
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|date| date.and_utc().timestamp_millis())
            })
            .map(bson::DateTime::from_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn people() -> Schema {
        Schema::new(vec![
            FieldSpec::new("firstName").required().cast(Cast::FirstName),
            FieldSpec::new("lastName").required().cast(Cast::LastName),
            FieldSpec::new("birthday").with_type(FieldType::Date),
            FieldSpec::new("phone").cast(Cast::Phone),
        ])
        .unwrap()
    }

    #[test]
    fn derives_required_fields_from_casts() {
        let (document, issues) = people().coerce_document(doc! { "name": "Jane Doe", "role": "admin" });

        assert!(issues.is_empty());
        assert_eq!(
            document,
            doc! { "firstName": "Jane", "lastName": "Doe", "name": "Jane Doe", "role": "admin" }
        );
    }

    #[test]
    fn required_exception_waives_requirement() {
        let schema = Schema::new(vec![FieldSpec::new("b").required().required_unless(["a"])]).unwrap();

        let (_, issues) = schema.coerce_document(doc! { "a": 1 });
        assert!(issues.is_empty());

        let (document, issues) = schema.coerce_document(doc! {});
        assert_eq!(
            issues,
            vec![CoercionIssue { record: 0, field: "b".into(), kind: IssueKind::MissingRequired }]
        );
        assert_eq!(document, doc! {});
    }

    #[test]
    fn invalid_records_are_kept() {
        let coerced = people().coerce(SchemaInput::List(vec![
            doc! { "name": "Jane Doe" },
            doc! { "nickname": "JD", "phone": "nope" },
        ]));

        let SchemaInput::List(documents) = &coerced.output else {
            panic!("expected a list");
        };
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].get_str("nickname").unwrap(), "JD");
        assert_eq!(documents[1].get_str("phone").unwrap(), "nope");
        assert_eq!(coerced.failed_records(), vec![1]);
        assert_eq!(
            coerced
                .issues
                .iter()
                .map(|issue| (issue.field.as_str(), issue.kind))
                .collect::<Vec<_>>(),
            vec![
                ("firstName", IssueKind::MissingRequired),
                ("lastName", IssueKind::MissingRequired),
                ("phone", IssueKind::CastFailed),
            ]
        );
    }

    #[test]
    fn converts_dates_and_phones() {
        let (document, issues) = people().coerce_document(doc! {
            "firstName": "Jane",
            "lastName": "Doe",
            "name": "Jane Doe",
            "birthday": "1990-04-01T00:00:00Z",
            "phone": "415-555-2671",
        });

        assert!(issues.is_empty());
        assert_eq!(
            document.get_datetime("birthday").unwrap().timestamp_millis(),
            638_928_000_000
        );
        assert_eq!(document.get_str("phone").unwrap(), "+14155552671");
    }

    #[test]
    fn unreadable_dates_are_flagged_and_kept() {
        let (document, issues) = people().coerce_document(doc! { "name": "Jane Doe", "birthday": "soon" });

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::InvalidDate);
        assert_eq!(document.get_str("birthday").unwrap(), "soon");
    }

    #[test]
    fn coercion_is_idempotent() {
        let schema = people();
        let once = schema.coerce(SchemaInput::Single(doc! {
            "name": "Jane Doe",
            "birthday": 638_928_000_000_i64,
            "phone": "(415) 555-2671",
        }));
        let twice = schema.coerce(once.output.clone());

        assert!(once.is_clean());
        assert_eq!(once, twice);
    }

    #[test]
    fn shapes_are_preserved() {
        let schema = people();

        assert!(matches!(
            schema.coerce(SchemaInput::Single(doc! { "name": "A B" })).output,
            SchemaInput::Single(_)
        ));

        let input = SchemaInput::detect(bson!({
            "data": [{ "name": "A B" }, { "name": "C D" }],
            "limit": 10,
            "count": 2,
        }))
        .unwrap();
        let output = schema.coerce(input).output.into_bson();

        let envelope = output.as_document().unwrap();
        assert_eq!(envelope.get_i32("limit").unwrap(), 10);
        assert_eq!(envelope.get_i32("count").unwrap(), 2);
        let data = envelope.get_array("data").unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].as_document().unwrap().get_str("firstName").unwrap(), "C");
    }

    #[test]
    fn envelopes_without_limit_are_single_documents() {
        let input = SchemaInput::detect(bson!({ "data": [], "limit": 0 })).unwrap();

        assert!(matches!(input, SchemaInput::Single(_)));
    }

    #[test]
    fn schema_declarations_deserialize_from_json() {
        let schema: Schema = serde_json::from_value(serde_json::json!([
            { "name": "email", "required": true, "requiredException": "phone" },
            { "name": "phone", "cast": "phone" },
            { "name": "since", "type": "date", "requiredException": ["legacy", "imported"] },
        ]))
        .unwrap();

        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field("email").unwrap().required_exception, vec!["phone"]);
        assert_eq!(schema.field("phone").unwrap().cast, Some(Cast::Phone));
        assert_eq!(schema.field("since").unwrap().field_type, Some(FieldType::Date));

        let unknown = serde_json::from_value::<Schema>(serde_json::json!([{ "name": "x", "cast": "shout" }]));
        assert!(unknown.is_err());
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let err = Schema::new(vec![FieldSpec::new("a"), FieldSpec::new("a")]).unwrap_err();

        assert!(matches!(err, CollectionError::InvalidSchema(_)));
    }
}
