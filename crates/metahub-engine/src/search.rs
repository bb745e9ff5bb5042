//! Search query compilation.
//!
//! A search request names a hub, an optional set of object types to
//! return, a free-form predicate, and a limit. The compiler resolves the
//! hub's current version, walks the version's reference graph to decide
//! which collections the query must draw from, parses the predicate into
//! an AST, and hands the store a fully-resolved [`CompiledQuery`]. The
//! caller's text never reaches the store as text.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metahub_core::config::Settings;
use metahub_core::error::{Error, Result};
use metahub_core::metrics::record_search;
use metahub_core::predicate::Predicate;
use metahub_core::store::{CompiledQuery, DocumentStore, JoinCondition};

use crate::catalog::Catalog;
use crate::model::{Reference, SearchResult};

/// Compiles and executes search queries against a hub's current version.
pub struct SearchService {
    catalog: Arc<Catalog>,
    store: Arc<dyn DocumentStore>,
    settings: Settings,
}

impl SearchService {
    /// Creates a search service over the given catalog and store.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, store: Arc<dyn DocumentStore>, settings: Settings) -> Self {
        Self {
            catalog,
            store,
            settings,
        }
    }

    /// Searches a hub's current version.
    ///
    /// An empty `object_types` slice means "return whatever the reference
    /// graph connects": the projection defaults to every object type that
    /// participates in a live reference. A limit of zero means unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub, its current version, or a
    /// requested object type is missing, [`Error::Validation`] when the
    /// predicate does not parse or no projection can be derived, and
    /// [`Error::Execution`] when the store query fails or times out.
    pub async fn search(
        &self,
        source: &str,
        hub: &str,
        object_types: &[String],
        predicate: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let started = Instant::now();
        let hub = self.catalog.hub(source, hub).await?;
        let version = self.catalog.current_version(hub.id).await?;

        let known: BTreeSet<String> = self
            .catalog
            .object_types(version.id)
            .await?
            .into_iter()
            .map(|ot| ot.name)
            .collect();

        // A reference whose endpoint vanished from this version is inert,
        // not an error.
        let live: Vec<Reference> = self
            .catalog
            .references(version.id)
            .await?
            .into_iter()
            .filter(|r| known.contains(&r.from_object_type) && known.contains(&r.to_object_type))
            .collect();

        let subgraph: BTreeSet<String> = live
            .iter()
            .flat_map(|r| [r.from_object_type.clone(), r.to_object_type.clone()])
            .collect();

        let projections: BTreeSet<String> = if object_types.is_empty() {
            subgraph.clone()
        } else {
            for requested in object_types {
                if !known.contains(requested) {
                    return Err(Error::not_found("object type", requested));
                }
            }
            object_types.iter().cloned().collect()
        };
        if projections.is_empty() {
            return Err(Error::validation(
                "nothing to return: no object types requested and the version has no references",
            ));
        }

        let sources: BTreeSet<String> = subgraph.union(&projections).cloned().collect();

        let predicate = match predicate.trim() {
            "" => None,
            text => Some(Predicate::parse(text)?),
        };

        let query = CompiledQuery {
            version: version.id,
            separator: self.settings.separator.clone(),
            sources: sources.into_iter().collect(),
            projections: projections.iter().cloned().collect(),
            joins: live
                .into_iter()
                .map(|r| JoinCondition {
                    from_object_type: r.from_object_type,
                    from_attribute: r.from_attribute,
                    to_object_type: r.to_object_type,
                    to_attribute: r.to_attribute,
                })
                .collect(),
            predicate,
            limit: if limit == 0 { usize::MAX } else { limit },
        };

        let rows = tokio::time::timeout(
            self.settings.operation_timeout,
            self.store.query_join(&query),
        )
        .await
        .map_err(|_| Error::execution("search query timed out"))??;

        let results = rows
            .into_iter()
            .map(|row| SearchResult {
                content: row
                    .into_iter()
                    .filter(|(object_type, _)| projections.contains(object_type))
                    .collect(),
            })
            .collect();
        record_search(started.elapsed().as_secs_f64());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metahub_core::store::MemoryStore;
    use serde_json::json;

    async fn seed() -> (SearchService, Arc<Catalog>) {
        let catalog = Arc::new(Catalog::new());
        let store = Arc::new(MemoryStore::new());
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let version = catalog.begin_version(hub.id, "test").await.unwrap();
        for name in ["donor", "sample"] {
            catalog.record_object_type(version.id, name).await.unwrap();
        }
        catalog
            .add_reference(version.id, "donor", "id", "sample", "donor_id")
            .await
            .unwrap();
        store
            .insert(version.id, "donor", json!({"id": "d1", "sex": "F"}))
            .await
            .unwrap();
        store
            .insert(version.id, "donor", json!({"id": "d2", "sex": "M"}))
            .await
            .unwrap();
        store
            .insert(
                version.id,
                "sample",
                json!({"donor_id": "d1", "tissue": "liver"}),
            )
            .await
            .unwrap();
        store
            .insert(
                version.id,
                "sample",
                json!({"donor_id": "d2", "tissue": "blood"}),
            )
            .await
            .unwrap();
        catalog.activate_version(version.id, None).await.unwrap();

        let service = SearchService::new(catalog.clone(), store, Settings::default());
        (service, catalog)
    }

    #[tokio::test]
    async fn joins_collections_along_references() {
        let (service, _) = seed().await;
        let results = service
            .search("ihec", "epigenomes", &[], "donor.sex = 'F'", 0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content["donor"]["id"], json!("d1"));
        assert_eq!(results[0].content["sample"]["tissue"], json!("liver"));
    }

    #[tokio::test]
    async fn projection_restricts_returned_content_but_not_joins() {
        let (service, _) = seed().await;
        let results = service
            .search(
                "ihec",
                "epigenomes",
                &["sample".to_owned()],
                "donor.sex = 'F'",
                0,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains_key("sample"));
        assert!(!results[0].content.contains_key("donor"));
    }

    #[tokio::test]
    async fn limit_zero_means_unlimited() {
        let (service, _) = seed().await;
        let all = service
            .search("ihec", "epigenomes", &[], "", 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let one = service
            .search("ihec", "epigenomes", &[], "", 1)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn unknown_projection_is_not_found() {
        let (service, _) = seed().await;
        let err = service
            .search("ihec", "epigenomes", &["study".to_owned()], "", 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn malformed_predicate_is_a_validation_error() {
        let (service, _) = seed().await;
        let err = service
            .search("ihec", "epigenomes", &[], "sex = ", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn no_references_and_no_requested_types_is_a_validation_error() {
        let catalog = Arc::new(Catalog::new());
        let store = Arc::new(MemoryStore::new());
        let hub = catalog.hub_or_create("ihec", "flat").await;
        let version = catalog.begin_version(hub.id, "test").await.unwrap();
        catalog
            .record_object_type(version.id, "track")
            .await
            .unwrap();
        catalog.activate_version(version.id, None).await.unwrap();

        let service = SearchService::new(catalog, store, Settings::default());
        let err = service.search("ihec", "flat", &[], "", 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
