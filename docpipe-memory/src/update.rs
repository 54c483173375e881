//! Update operators and projections applied to stored documents.

use bson::{Bson, Document};

use docpipe_core::{
    document::ID_FIELD,
    error::{CollectionError, CollectionResult},
    query::OPERATOR_PREFIX,
};

/// Applies an operator update (`$set`, `$unset`, `$inc`, `$push`) to a copy of `current`.
pub(crate) fn apply_update(current: &Document, update: &Document) -> CollectionResult<Document> {
    if update.is_empty() {
        return Err(CollectionError::InvalidDocument("update document is empty".into()));
    }

    let mut document = current.clone();

    for (operator, argument) in update {
        if !operator.starts_with(OPERATOR_PREFIX) {
            return Err(CollectionError::InvalidDocument(format!(
                "update field {operator} is not an operator"
            )));
        }

        let Bson::Document(fields) = argument else {
            return Err(CollectionError::InvalidDocument(format!("{operator} expects a document")));
        };

        for (path, value) in fields {
            if path == ID_FIELD || path.starts_with("_id.") {
                return Err(CollectionError::InvalidDocument("the identity of a document cannot change".into()));
            }

            match operator.as_str() {
                "$set" => set_path(&mut document, path, value.clone())?,
                "$unset" => unset_path(&mut document, path),
                "$inc" => {
                    let total = increment(get_path(&document, path), value)?;
                    set_path(&mut document, path, total)?;
                }
                "$push" => {
                    let items = push(get_path(&document, path), value)?;
                    set_path(&mut document, path, items)?;
                }
                other => {
                    return Err(CollectionError::InvalidQuery(format!("unsupported update operator {other}")));
                }
            }
        }
    }

    Ok(document)
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            Bson::Array(items) => {
                let (index, rest) = rest.split_once('.').map_or((rest, None), |(i, r)| (i, Some(r)));
                let item = items.get(index.parse::<usize>().ok()?)?;
                match (item, rest) {
                    (item, None) => Some(item),
                    (Bson::Document(child), Some(rest)) => get_path(child, rest),
                    _ => None,
                }
            }
            _ => None,
        },
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> CollectionResult<()> {
    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(child)) => set_path(child, rest, value),
        Some(Bson::Array(items)) => {
            let (index, rest) = rest.split_once('.').map_or((rest, None), |(i, r)| (i, Some(r)));
            let slot = index
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| CollectionError::InvalidDocument(format!("cannot set {path}: no such array element")))?;

            match (slot, rest) {
                (slot, None) => {
                    *slot = value;
                    Ok(())
                }
                (Bson::Document(child), Some(rest)) => set_path(child, rest, value),
                _ => Err(CollectionError::InvalidDocument(format!("cannot set {path}: element is not a document"))),
            }
        }
        _ => Err(CollectionError::InvalidDocument(format!("cannot set {path}: {head} is not a document"))),
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

fn increment(current: Option<&Bson>, by: &Bson) -> CollectionResult<Bson> {
    let current = current.unwrap_or(&Bson::Int32(0));

    let overflow = || CollectionError::InvalidDocument(format!("incrementing {current} by {by} overflows"));

    Ok(match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => {
                return Err(CollectionError::InvalidDocument(format!(
                    "cannot increment {current} by {by}"
                )));
            }
        },
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn push(current: Option<&Bson>, value: &Bson) -> CollectionResult<Bson> {
    let mut items = match current {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(other) => {
            return Err(CollectionError::InvalidDocument(format!("cannot push onto non-array value {other}")));
        }
    };

    match value {
        Bson::Document(spec) if spec.contains_key("$each") => match spec.get("$each") {
            Some(Bson::Array(each)) => items.extend(each.iter().cloned()),
            _ => return Err(CollectionError::InvalidDocument("$each expects an array".into())),
        },
        value => items.push(value.clone()),
    }

    Ok(Bson::Array(items))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Applies an inclusion or exclusion projection. `_id` is kept unless excluded explicitly.
pub(crate) fn apply_projection(document: &Document, projection: &Document) -> Document {
    let keep_id = projection.get(ID_FIELD).is_none_or(truthy);

    let fields = projection
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD)
        .collect::<Vec<_>>();

    if fields.iter().any(|(_, value)| truthy(value)) {
        let paths = fields
            .iter()
            .filter(|(_, value)| truthy(value))
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();

        let mut projected = Document::new();
        if keep_id {
            if let Some(id) = document.get(ID_FIELD) {
                projected.insert(ID_FIELD, id.clone());
            }
        }
        for (key, value) in include(document, &paths) {
            projected.insert(key, value);
        }

        return projected;
    }

    let mut projected = document.clone();
    for (path, _) in fields {
        unset_path(&mut projected, path);
    }
    if !keep_id {
        projected.remove(ID_FIELD);
    }

    projected
}

fn include(document: &Document, paths: &[&str]) -> Document {
    let mut included = Document::new();

    for (key, value) in document {
        if paths.contains(&key.as_str()) {
            included.insert(key.clone(), value.clone());
            continue;
        }

        let nested = paths
            .iter()
            .filter_map(|path| path.strip_prefix(key.as_str())?.strip_prefix('.'))
            .collect::<Vec<_>>();

        if let (false, Bson::Document(child)) = (nested.is_empty(), value) {
            let child = include(child, &nested);
            if !child.is_empty() {
                included.insert(key.clone(), child);
            }
        }
    }

    included
}
