//! Attribute flattening over nested documents.
//!
//! Metahub documents are arbitrarily nested maps and lists of scalars.
//! Every component that needs a schema-free view of them goes through this
//! module: metamodel extraction aggregates flattened paths across a
//! collection, static mappings resolve a single path against one document,
//! and the metamodel tree view is rebuilt from a flat view.
//!
//! Flattening rules:
//!
//! - map keys extend the current path with the separator
//! - list elements are visited under the *same* path, so lists fan several
//!   values into one path instead of extending it with an index
//! - scalars accumulate their string form as a value; numbers render
//!   without locale grouping, booleans as `true`/`false`
//! - `null`, empty maps, and empty lists contribute nothing

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A flattened document: attribute path to the set of distinct observed
/// values. Sets, not sequences; value ordering is not meaningful.
pub type FlatMap = BTreeMap<String, BTreeSet<String>>;

/// Renders a scalar value in its canonical string form.
///
/// Returns `None` for `null` and for containers.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Flattens one nested document into a path-indexed multimap.
#[must_use]
pub fn flatten(document: &Value, separator: &str) -> FlatMap {
    let mut out = FlatMap::new();
    walk(document, "", separator, &mut out);
    out
}

fn walk(value: &Value, path: &str, separator: &str, out: &mut FlatMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}{separator}{key}")
                };
                walk(child, &child_path, separator, out);
            }
        }
        Value::Array(items) => {
            // Lists do not extend the path; every element lands on it.
            for item in items {
                walk(item, path, separator, out);
            }
        }
        scalar => {
            if path.is_empty() {
                return;
            }
            if let Some(text) = scalar_to_string(scalar) {
                out.entry(path.to_owned()).or_default().insert(text);
            }
        }
    }
}

/// Resolves one attribute path against a document, returning every scalar
/// value observed at that path.
///
/// Lists along the path are descended transparently, matching [`flatten`]:
/// `resolve` of path `p` returns exactly the values `flatten` would file
/// under `p`. An unresolvable path yields an empty vector.
#[must_use]
pub fn resolve(document: &Value, path: &str, separator: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split(separator).collect();
    let mut values = Vec::new();
    resolve_segments(document, &segments, &mut values);
    values
}

fn resolve_segments(value: &Value, segments: &[&str], out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                resolve_segments(item, segments, out);
            }
        }
        Value::Object(map) => {
            if let Some((head, rest)) = segments.split_first() {
                if let Some(child) = map.get(*head) {
                    resolve_segments(child, rest, out);
                }
            }
        }
        scalar => {
            if segments.is_empty() {
                if let Some(text) = scalar_to_string(scalar) {
                    out.push(text);
                }
            }
        }
    }
}

/// Rebuilds the nested tree representation of a flat view.
///
/// Each path is split on the separator and nested as maps; the final
/// segment holds the value collection as an array. Singleton collections
/// stay arrays here; only the curation pipeline collapses singletons.
///
/// When one path is both a leaf and an interior node (possible with mixed
/// scalar/map lists), the interior structure wins.
#[must_use]
pub fn rebuild_tree(flat: &FlatMap, separator: &str) -> Value {
    let mut root = Map::new();
    for (path, values) in flat {
        let segments: Vec<&str> = path.split(separator).collect();
        let Some((leaf, interior)) = segments.split_last() else {
            continue;
        };
        let mut node = &mut root;
        for segment in interior {
            let entry = node
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = entry
                .as_object_mut()
                .unwrap_or_else(|| unreachable!("entry was just made an object"));
        }
        let leaf_values = Value::Array(values.iter().cloned().map(Value::String).collect());
        match node.get(*leaf) {
            Some(existing) if existing.is_object() => {}
            _ => {
                node.insert((*leaf).to_owned(), leaf_values);
            }
        }
    }
    Value::Object(root)
}

/// Removes the subtree at `path` from a document in place.
///
/// Lists along the path are descended transparently, so the subtree is
/// removed from every matching branch. Used by data providers to strip
/// attributes that must not be indexed.
pub fn remove_path(document: &mut Value, path: &str, separator: &str) {
    let segments: Vec<&str> = path.split(separator).collect();
    remove_segments(document, &segments);
}

fn remove_segments(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match value {
        Value::Array(items) => {
            for item in items {
                remove_segments(item, segments);
            }
        }
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*head);
            } else if let Some(child) = map.get_mut(*head) {
                remove_segments(child, rest);
            }
        }
        _ => {}
    }
}
