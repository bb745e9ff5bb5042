//! Document store contract and in-memory backend.
//!
//! The persistent document store is an external collaborator: it must hold
//! immutable raw documents per (version, object type), the replaceable
//! curated set, and answer containment and multi-collection join queries.
//! The engine only depends on the [`DocumentStore`] trait.
//!
//! [`MemoryStore`] is a thread-safe in-memory implementation used by the
//! engine's tests and suitable for small-scale embedded use.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::flatten;
use crate::id::{DocumentId, VersionId};
use crate::predicate::Predicate;

/// One equality join between two object types' attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    /// Object type on the left side of the equality.
    pub from_object_type: String,
    /// Attribute path within the left document.
    pub from_attribute: String,
    /// Object type on the right side of the equality.
    pub to_object_type: String,
    /// Attribute path within the right document.
    pub to_attribute: String,
}

/// A compiled multi-collection search query.
///
/// Produced by the query compiler; consumed verbatim by
/// [`DocumentStore::query_join`]. The caller's free-form predicate travels
/// as a parsed [`Predicate`] AST, never as text.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The version snapshot the query is scoped to.
    pub version: VersionId,
    /// Attribute path separator used to resolve join and predicate paths.
    pub separator: String,
    /// Object types producing one row component each.
    pub sources: Vec<String>,
    /// Object types whose content the caller wants returned.
    pub projections: Vec<String>,
    /// Equality join conditions between sources.
    pub joins: Vec<JoinCondition>,
    /// Optional caller predicate over qualified attribute paths.
    pub predicate: Option<Predicate>,
    /// Maximum number of rows. Never zero: a caller limit of zero is
    /// translated to `usize::MAX` during compilation.
    pub limit: usize,
}

/// One result row: object type name to that row's document content.
pub type JoinRow = BTreeMap<String, Value>;

/// Persistent document store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a raw document under a version and object type.
    ///
    /// Versions are append-only; inserting never mutates previously stored
    /// documents.
    async fn insert(
        &self,
        version: VersionId,
        object_type: &str,
        document: Value,
    ) -> Result<DocumentId>;

    /// Returns all raw documents of one (version, object type).
    async fn documents(&self, version: VersionId, object_type: &str) -> Result<Vec<Value>>;

    /// Returns the raw documents of one (version, object type) matching a
    /// containment predicate. Predicate paths are unqualified and resolved
    /// with the given separator.
    async fn query_containment(
        &self,
        version: VersionId,
        object_type: &str,
        predicate: &Predicate,
        separator: &str,
    ) -> Result<Vec<Value>>;

    /// Executes a compiled multi-collection join query.
    async fn query_join(&self, query: &CompiledQuery) -> Result<Vec<JoinRow>>;

    /// Atomically replaces the whole curated set of a version.
    ///
    /// Curated documents are recomputed wholesale; there is no merge.
    async fn replace_curated(
        &self,
        version: VersionId,
        curated: Vec<(String, Vec<Value>)>,
    ) -> Result<()>;

    /// Returns the curated documents of one (version, object type).
    async fn curated(&self, version: VersionId, object_type: &str) -> Result<Vec<Value>>;

    /// Removes every document belonging to a version.
    ///
    /// Used to discard the partial output of a failed ingestion run.
    async fn drop_version(&self, version: VersionId) -> Result<()>;
}

type Shelf = HashMap<(VersionId, String), Vec<Value>>;

/// In-memory document store.
///
/// Thread-safe via `RwLock`. Joins are evaluated as a pruned nested-loop
/// product, which is adequate for tests and small embedded catalogues.
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: RwLock<Shelf>,
    curated: RwLock<Shelf>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(shelf: &RwLock<Shelf>) -> Result<std::sync::RwLockReadGuard<'_, Shelf>> {
        shelf.read().map_err(|_| Error::internal("lock poisoned"))
    }

    fn write(shelf: &RwLock<Shelf>) -> Result<std::sync::RwLockWriteGuard<'_, Shelf>> {
        shelf.write().map_err(|_| Error::internal("lock poisoned"))
    }
}

/// Resolves a possibly object-type-qualified path within a row.
///
/// A prefix before the first `.` that names a row component scopes the
/// lookup to that component's document; otherwise the path is resolved
/// against every component and the results are pooled.
fn resolve_in_row(row: &JoinRow, path: &str, separator: &str) -> Vec<String> {
    if let Some((qualifier, rest)) = path.split_once('.') {
        if let Some(document) = row.get(qualifier) {
            return flatten::resolve(document, rest, separator);
        }
    }
    row.values()
        .flat_map(|document| flatten::resolve(document, path, separator))
        .collect()
}

/// Checks every join condition whose two sides are both present in the row.
fn joins_hold(row: &JoinRow, joins: &[JoinCondition], separator: &str) -> bool {
    joins.iter().all(|join| {
        let (Some(from), Some(to)) = (
            row.get(&join.from_object_type),
            row.get(&join.to_object_type),
        ) else {
            return true;
        };
        let from_values = flatten::resolve(from, &join.from_attribute, separator);
        let to_values = flatten::resolve(to, &join.to_attribute, separator);
        from_values.iter().any(|v| to_values.contains(v))
    })
}

fn product(
    query: &CompiledQuery,
    shelf: &Shelf,
    row: &mut JoinRow,
    remaining: &[String],
    out: &mut Vec<JoinRow>,
) {
    if out.len() >= query.limit {
        return;
    }
    let Some((source, rest)) = remaining.split_first() else {
        let matches = query
            .predicate
            .as_ref()
            .map_or(true, |p| p.matches(&|path| resolve_in_row(row, path, &query.separator)));
        if matches {
            out.push(row.clone());
        }
        return;
    };
    let key = (query.version, source.clone());
    let Some(documents) = shelf.get(&key) else {
        return;
    };
    for document in documents {
        row.insert(source.clone(), document.clone());
        // Prune as soon as a completed join condition fails.
        if joins_hold(row, &query.joins, &query.separator) {
            product(query, shelf, row, rest, out);
        }
        row.remove(source);
        if out.len() >= query.limit {
            return;
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        version: VersionId,
        object_type: &str,
        document: Value,
    ) -> Result<DocumentId> {
        let mut raw = Self::write(&self.raw)?;
        raw.entry((version, object_type.to_owned()))
            .or_default()
            .push(document);
        Ok(DocumentId::generate())
    }

    async fn documents(&self, version: VersionId, object_type: &str) -> Result<Vec<Value>> {
        let raw = Self::read(&self.raw)?;
        Ok(raw
            .get(&(version, object_type.to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn query_containment(
        &self,
        version: VersionId,
        object_type: &str,
        predicate: &Predicate,
        separator: &str,
    ) -> Result<Vec<Value>> {
        let documents = self.documents(version, object_type).await?;
        Ok(documents
            .into_iter()
            .filter(|document| {
                predicate.matches(&|path| flatten::resolve(document, path, separator))
            })
            .collect())
    }

    async fn query_join(&self, query: &CompiledQuery) -> Result<Vec<JoinRow>> {
        if query.limit == 0 {
            return Err(Error::internal(
                "compiled query limit must be non-zero; zero means unlimited and is \
                 translated to usize::MAX by the compiler",
            ));
        }
        let raw = Self::read(&self.raw)?;
        let mut out = Vec::new();
        let mut row = JoinRow::new();
        product(query, &raw, &mut row, &query.sources, &mut out);
        Ok(out)
    }

    async fn replace_curated(
        &self,
        version: VersionId,
        curated: Vec<(String, Vec<Value>)>,
    ) -> Result<()> {
        let mut shelf = Self::write(&self.curated)?;
        shelf.retain(|(v, _), _| *v != version);
        for (object_type, documents) in curated {
            shelf.insert((version, object_type), documents);
        }
        Ok(())
    }

    async fn curated(&self, version: VersionId, object_type: &str) -> Result<Vec<Value>> {
        let curated = Self::read(&self.curated)?;
        Ok(curated
            .get(&(version, object_type.to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn drop_version(&self, version: VersionId) -> Result<()> {
        Self::write(&self.raw)?.retain(|(v, _), _| *v != version);
        Self::write(&self.curated)?.retain(|(v, _), _| *v != version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(version: VersionId, sources: &[&str], joins: Vec<JoinCondition>) -> CompiledQuery {
        CompiledQuery {
            version,
            separator: ">".into(),
            sources: sources.iter().map(|s| (*s).to_owned()).collect(),
            projections: sources.iter().map(|s| (*s).to_owned()).collect(),
            joins,
            predicate: None,
            limit: usize::MAX,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = MemoryStore::new();
        let version = VersionId::generate();
        store
            .insert(version, "donor", json!({"id": "d1"}))
            .await
            .unwrap();
        let documents = store.documents(version, "donor").await.unwrap();
        assert_eq!(documents, vec![json!({"id": "d1"})]);
        assert!(store.documents(version, "sample").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_matches_on_attribute_equality() {
        let store = MemoryStore::new();
        let version = VersionId::generate();
        store
            .insert(version, "donor", json!({"id": "d1"}))
            .await
            .unwrap();
        store
            .insert(version, "donor", json!({"id": "d2"}))
            .await
            .unwrap();
        store
            .insert(version, "sample", json!({"donor_id": "d1", "tissue": "liver"}))
            .await
            .unwrap();

        let q = query(
            version,
            &["donor", "sample"],
            vec![JoinCondition {
                from_object_type: "donor".into(),
                from_attribute: "id".into(),
                to_object_type: "sample".into(),
                to_attribute: "donor_id".into(),
            }],
        );
        let rows = store.query_join(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["donor"], json!({"id": "d1"}));
        assert_eq!(rows[0]["sample"]["tissue"], json!("liver"));
    }

    #[tokio::test]
    async fn join_respects_limit_and_predicate() {
        let store = MemoryStore::new();
        let version = VersionId::generate();
        for i in 0..5 {
            store
                .insert(version, "track", json!({"n": i}))
                .await
                .unwrap();
        }

        let mut q = query(version, &["track"], Vec::new());
        q.limit = 2;
        assert_eq!(store.query_join(&q).await.unwrap().len(), 2);

        q.limit = usize::MAX;
        q.predicate = Some(Predicate::parse("track.n = 3").unwrap());
        let rows = store.query_join(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["track"]["n"], json!(3));
    }

    #[tokio::test]
    async fn containment_filters_documents() {
        let store = MemoryStore::new();
        let version = VersionId::generate();
        store
            .insert(version, "track", json!({"assay": "H3K27me3"}))
            .await
            .unwrap();
        store
            .insert(version, "track", json!({"assay": "WGBS"}))
            .await
            .unwrap();

        let predicate = Predicate::parse("assay CONTAINS 'K27'").unwrap();
        let hits = store
            .query_containment(version, "track", &predicate, ">")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn replace_curated_is_wholesale() {
        let store = MemoryStore::new();
        let version = VersionId::generate();
        store
            .replace_curated(version, vec![("track".into(), vec![json!({"a": 1})])])
            .await
            .unwrap();
        store
            .replace_curated(version, vec![("other".into(), vec![json!({"b": 2})])])
            .await
            .unwrap();
        assert!(store.curated(version, "track").await.unwrap().is_empty());
        assert_eq!(store.curated(version, "other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drop_version_removes_only_that_version() {
        let store = MemoryStore::new();
        let v1 = VersionId::generate();
        let v2 = VersionId::generate();
        store.insert(v1, "track", json!({})).await.unwrap();
        store.insert(v2, "track", json!({})).await.unwrap();
        store.drop_version(v1).await.unwrap();
        assert!(store.documents(v1, "track").await.unwrap().is_empty());
        assert_eq!(store.documents(v2, "track").await.unwrap().len(), 1);
    }
}
