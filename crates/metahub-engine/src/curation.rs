//! Curation pipeline.
//!
//! Curation maps each raw document of the current version into a curated
//! document by applying the version's mappings in order. Static rules copy
//! values out of the raw document by attribute path; script rules hand the
//! whole document to a scripting engine and collect whatever strings it
//! returns. The curated set is swapped in wholesale at the end of the run,
//! so a cancelled or failed run never leaves a partially-curated version
//! behind.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use metahub_core::config::{CurationFailurePolicy, Settings};
use metahub_core::error::{Error, Result};
use metahub_core::metrics::record_curation_run;
use metahub_core::observability::curation_span;
use metahub_core::scripting::{ScriptingEngine, ScriptingRegistry};
use metahub_core::store::DocumentStore;
use tracing::Instrument;

use crate::catalog::Catalog;
use crate::model::{Mapping, MappingRule};

/// Outcome of one curation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurationReport {
    /// The version whose curated set was replaced.
    pub version: metahub_core::id::VersionId,
    /// Documents successfully curated.
    pub curated: usize,
    /// Documents skipped under [`CurationFailurePolicy::SkipDocument`].
    pub skipped: usize,
}

/// Runs the mapping pipeline over a hub's current version.
pub struct CurationPipeline {
    catalog: Arc<Catalog>,
    store: Arc<dyn DocumentStore>,
    scripting: ScriptingRegistry,
    settings: Settings,
}

impl CurationPipeline {
    /// Creates a pipeline over the given catalog, store, and engines.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn DocumentStore>,
        scripting: ScriptingRegistry,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            store,
            scripting,
            settings,
        }
    }

    /// Curates every object type of the hub's current version and swaps
    /// the curated set in atomically.
    ///
    /// The scripting engine is resolved up front: a run whose mappings
    /// include script rules never starts without one, regardless of the
    /// failure policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub or its current version is
    /// missing, [`Error::Configuration`] when a script rule exists but no
    /// engine is registered for the configured language, and
    /// [`Error::Execution`] when a document fails under
    /// [`CurationFailurePolicy::AbortRun`].
    pub async fn run(&self, source: &str, hub: &str) -> Result<CurationReport> {
        let span = curation_span(source, hub);
        self.run_inner(source, hub).instrument(span).await
    }

    async fn run_inner(&self, source: &str, hub: &str) -> Result<CurationReport> {
        let started = Instant::now();

        let hub = self.catalog.hub(source, hub).await?;
        let version = self.catalog.current_version(hub.id).await?;
        let mappings = self.catalog.mappings(version.id).await?;

        let engine = if mappings.iter().any(|m| !m.is_static()) {
            Some(self.scripting.resolve(&self.settings.scripting_language)?)
        } else {
            None
        };

        let mut curated: Vec<(String, Vec<Value>)> = Vec::new();
        let mut total = 0;
        let mut skipped: u64 = 0;
        for object_type in self.catalog.object_types(version.id).await? {
            let documents = self.store.documents(version.id, &object_type.name).await?;
            let mut shelf = Vec::with_capacity(documents.len());
            for document in &documents {
                match self
                    .curate_document(document, &mappings, engine.as_deref())
                    .await
                {
                    Ok(output) => shelf.push(output),
                    Err(error) => match self.settings.failure_policy {
                        CurationFailurePolicy::AbortRun => {
                            record_curation_run(started.elapsed().as_secs_f64(), skipped + 1);
                            return Err(error);
                        }
                        CurationFailurePolicy::SkipDocument => {
                            tracing::warn!(
                                object_type = %object_type.name,
                                error = %error,
                                "skipping document that failed curation"
                            );
                            skipped += 1;
                        }
                    },
                }
            }
            total += shelf.len();
            curated.push((object_type.name, shelf));
        }

        self.store.replace_curated(version.id, curated).await?;
        record_curation_run(started.elapsed().as_secs_f64(), skipped);
        Ok(CurationReport {
            version: version.id,
            curated: total,
            skipped: usize::try_from(skipped).unwrap_or(usize::MAX),
        })
    }

    /// Applies every mapping to one document.
    ///
    /// Each rule yields zero or more strings; the curated attribute is
    /// absent for zero, a plain string for one, and an array for more.
    async fn curate_document(
        &self,
        document: &Value,
        mappings: &[Mapping],
        engine: Option<&dyn ScriptingEngine>,
    ) -> Result<Value> {
        let mut output = Value::Object(Map::new());
        for mapping in mappings {
            let values = match &mapping.rule {
                MappingRule::Static { from } => {
                    metahub_core::flatten::resolve(document, from, &self.settings.separator)
                }
                MappingRule::Script { body } => {
                    // resolved up front in run(); unreachable only when a
                    // caller bypasses run(), so fail the same way
                    let engine = engine.ok_or_else(|| {
                        Error::configuration(format!(
                            "no scripting engine registered for language {:?}",
                            self.settings.scripting_language
                        ))
                    })?;
                    tokio::time::timeout(self.settings.operation_timeout, engine.execute(body, document))
                        .await
                        .map_err(|_| Error::execution("script execution timed out"))??
                }
            };
            match values.len() {
                0 => {}
                1 => set_path(
                    &mut output,
                    &mapping.to,
                    &self.settings.separator,
                    Value::String(values.into_iter().next().unwrap_or_default()),
                ),
                _ => set_path(
                    &mut output,
                    &mapping.to,
                    &self.settings.separator,
                    Value::Array(values.into_iter().map(Value::String).collect()),
                ),
            }
        }
        Ok(output)
    }
}

/// Sets a value at a separator-delimited path, creating intermediate
/// objects as needed. A later mapping writing through an earlier scalar
/// replaces it.
fn set_path(target: &mut Value, path: &str, separator: &str, value: Value) {
    let mut current = target;
    let mut segments = path.split(separator).peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return,
        };
        if segments.peek().is_none() {
            map.insert(segment.to_owned(), value);
            return;
        }
        current = map
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use metahub_core::store::MemoryStore;
    use serde_json::json;

    /// Splits the document's "words" attribute, standing in for a real
    /// scripting engine.
    struct SplitWords;

    #[async_trait]
    impl ScriptingEngine for SplitWords {
        fn language(&self) -> &str {
            "lua"
        }

        async fn execute(&self, _script: &str, document: &Value) -> Result<Vec<String>> {
            Ok(document
                .get("words")
                .and_then(Value::as_str)
                .map(|words| words.split(' ').map(ToOwned::to_owned).collect())
                .unwrap_or_default())
        }
    }

    /// Always fails, for failure-policy tests.
    struct Failing;

    #[async_trait]
    impl ScriptingEngine for Failing {
        fn language(&self) -> &str {
            "lua"
        }

        async fn execute(&self, _script: &str, _document: &Value) -> Result<Vec<String>> {
            Err(Error::execution("boom"))
        }
    }

    async fn seed(documents: Vec<Value>) -> (Arc<Catalog>, Arc<MemoryStore>) {
        let catalog = Arc::new(Catalog::new());
        let store = Arc::new(MemoryStore::new());
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let version = catalog.begin_version(hub.id, "test").await.unwrap();
        catalog
            .record_object_type(version.id, "track")
            .await
            .unwrap();
        for document in documents {
            store.insert(version.id, "track", document).await.unwrap();
        }
        catalog.activate_version(version.id, None).await.unwrap();
        (catalog, store)
    }

    fn pipeline(
        catalog: Arc<Catalog>,
        store: Arc<MemoryStore>,
        engine: Option<Arc<dyn ScriptingEngine>>,
        settings: Settings,
    ) -> CurationPipeline {
        let mut scripting = ScriptingRegistry::new();
        if let Some(engine) = engine {
            scripting.register(engine);
        }
        CurationPipeline::new(catalog, store, scripting, settings)
    }

    #[tokio::test]
    async fn static_single_value_becomes_a_string() {
        let (catalog, store) = seed(vec![json!({"sample": {"tissue": "liver"}})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Static {
                    from: "sample>tissue".into(),
                },
                "out",
            )
            .await
            .unwrap();

        let pipeline = pipeline(catalog, store.clone(), None, Settings::default());
        let report = pipeline.run("ihec", "epigenomes").await.unwrap();
        assert_eq!(report.curated, 1);
        assert_eq!(report.skipped, 0);

        let curated = store.curated(version.id, "track").await.unwrap();
        assert_eq!(curated, vec![json!({"out": "liver"})]);
    }

    #[tokio::test]
    async fn multiple_values_become_an_array_and_zero_stays_absent() {
        let (catalog, store) = seed(vec![json!({"tags": ["y", "z"]})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Static { from: "tags".into() },
                "out2",
            )
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Static { from: "missing".into() },
                "out3",
            )
            .await
            .unwrap();

        let pipeline = pipeline(catalog, store.clone(), None, Settings::default());
        pipeline.run("ihec", "epigenomes").await.unwrap();

        let curated = store.curated(version.id, "track").await.unwrap();
        assert_eq!(curated, vec![json!({"out2": ["y", "z"]})]);
    }

    #[tokio::test]
    async fn script_rules_use_the_registered_engine() {
        let (catalog, store) = seed(vec![json!({"words": "alpha beta"})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Script {
                    body: "return split(doc.words)".into(),
                },
                "split",
            )
            .await
            .unwrap();

        let pipeline = pipeline(
            catalog,
            store.clone(),
            Some(Arc::new(SplitWords)),
            Settings::default(),
        );
        pipeline.run("ihec", "epigenomes").await.unwrap();

        let curated = store.curated(version.id, "track").await.unwrap();
        assert_eq!(curated, vec![json!({"split": ["alpha", "beta"]})]);
    }

    #[tokio::test]
    async fn missing_engine_fails_before_touching_any_document() {
        let (catalog, store) = seed(vec![json!({"words": "alpha"})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Script { body: "x".into() },
                "out",
            )
            .await
            .unwrap();

        let pipeline = pipeline(catalog, store.clone(), None, Settings::default());
        let err = pipeline.run("ihec", "epigenomes").await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(store.curated(version.id, "track").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_policy_stops_on_the_first_failing_document() {
        let (catalog, store) = seed(vec![json!({"a": 1})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Script { body: "x".into() },
                "out",
            )
            .await
            .unwrap();

        let pipeline = pipeline(
            catalog,
            store.clone(),
            Some(Arc::new(Failing)),
            Settings::default(),
        );
        let err = pipeline.run("ihec", "epigenomes").await.unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        // The curated shelf was never replaced.
        assert!(store.curated(version.id, "track").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_policy_keeps_going_and_counts_skips() {
        let (catalog, store) = seed(vec![json!({"a": 1}), json!({"b": 2})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Script { body: "x".into() },
                "out",
            )
            .await
            .unwrap();

        let settings = Settings::default()
            .with_failure_policy(CurationFailurePolicy::SkipDocument);
        let pipeline = pipeline(catalog, store.clone(), Some(Arc::new(Failing)), settings);
        let report = pipeline.run("ihec", "epigenomes").await.unwrap();
        assert_eq!(report.curated, 0);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn nested_target_paths_build_intermediate_objects() {
        let (catalog, store) = seed(vec![json!({"tissue": "liver"})]).await;
        let version = catalog
            .current_version(catalog.hub("ihec", "epigenomes").await.unwrap().id)
            .await
            .unwrap();
        catalog
            .add_mapping(
                version.id,
                MappingRule::Static { from: "tissue".into() },
                "sample>tissue",
            )
            .await
            .unwrap();

        let pipeline = pipeline(catalog, store.clone(), None, Settings::default());
        pipeline.run("ihec", "epigenomes").await.unwrap();

        let curated = store.curated(version.id, "track").await.unwrap();
        assert_eq!(curated, vec![json!({"sample": {"tissue": "liver"}})]);
    }
}
