//! Metamodel extraction.
//!
//! The metamodel is the inferred attribute-path catalogue over one
//! (hub, object type): which paths occur across the collection's raw
//! documents and which distinct values each path holds. Both the flat and
//! the tree view are deterministic functions of the current version's
//! documents and the per-hub exclusion set; recomputing them from
//! identical input yields identical output regardless of document order.
//!
//! Views are cached per (version, object type) and recomputed lazily after
//! a version activation invalidates the cache. The version in the key is
//! what keeps a read that raced an activation from polluting the new
//! version's view: the racer stores under the superseded version's key.
//! Hidden attributes are excluded at read time, never baked into the
//! cached aggregation.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use metahub_core::config::Settings;
use metahub_core::error::{Error, Result};
use metahub_core::flatten::{self, FlatMap};
use metahub_core::id::HubId;
use metahub_core::observability::hub_span;
use metahub_core::store::DocumentStore;
use tracing::Instrument;

use crate::cache::{AttributeTypes, MetamodelCache};
use crate::catalog::Catalog;
use crate::model::{Hub, Version};

/// Read-side service computing metamodel views.
pub struct MetamodelService {
    catalog: Arc<Catalog>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<MetamodelCache>,
    settings: Settings,
    hidden: RwLock<HashMap<HubId, BTreeSet<String>>>,
}

impl MetamodelService {
    /// Creates a new service over the given catalog, store, and cache.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<MetamodelCache>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            store,
            cache,
            settings,
            hidden: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the exclusion set for a hub.
    ///
    /// Hidden attributes are dropped from every view at read time; the
    /// ingestion runner records each provider's set here.
    pub fn set_hidden_attributes(&self, hub: HubId, attributes: BTreeSet<String>) {
        self.hidden
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hub, attributes);
    }

    fn hidden_for(&self, hub: HubId) -> BTreeSet<String> {
        self.hidden
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hub)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the flat view: attribute path to distinct observed values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub, its current version, or
    /// the object type is missing, and [`Error::Execution`] when the store
    /// read fails or times out.
    pub async fn flat(&self, source: &str, hub: &str, object_type: &str) -> Result<FlatMap> {
        let (hub, version) = self.scope(source, hub, object_type).await?;
        let span = hub_span("metamodel_flat", &hub.name, object_type);
        async {
            let view = self.flat_unfiltered(&version, object_type).await?;
            let hidden = self.hidden_for(hub.id);
            Ok(view
                .iter()
                .filter(|(path, _)| !hidden.contains(*path))
                .map(|(path, values)| (path.clone(), values.clone()))
                .collect())
        }
        .instrument(span)
        .await
    }

    /// Returns the tree view: the flat view rebuilt into nested form, with
    /// hidden attributes excluded before rebuilding.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn tree(&self, source: &str, hub: &str, object_type: &str) -> Result<Value> {
        let (hub, version) = self.scope(source, hub, object_type).await?;
        if let Some(cached) = self.cache.tree(version.id, object_type) {
            return Ok((*cached).clone());
        }
        let view = self.flat_unfiltered(&version, object_type).await?;
        let hidden = self.hidden_for(hub.id);
        let filtered: FlatMap = view
            .iter()
            .filter(|(path, _)| !hidden.contains(*path))
            .map(|(path, values)| (path.clone(), values.clone()))
            .collect();
        let tree = flatten::rebuild_tree(&filtered, &self.settings.separator);
        self.cache
            .store_tree(version.id, object_type, Arc::new(tree.clone()));
        Ok(tree)
    }

    /// Returns the inferred value types per attribute path.
    ///
    /// A path maps to every type observed across the collection:
    /// `string`, `number`, `boolean`, and `array` for multi-valued
    /// attributes. Types are inferred per value from its stored
    /// representation.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn attribute_types(
        &self,
        source: &str,
        hub: &str,
        object_type: &str,
    ) -> Result<AttributeTypes> {
        let (hub, version) = self.scope(source, hub, object_type).await?;
        let view = match self.cache.types(version.id, object_type) {
            Some(cached) => cached,
            None => {
                let documents = self
                    .with_timeout(self.store.documents(version.id, object_type))
                    .await?;
                let mut types = AttributeTypes::new();
                for document in &documents {
                    collect_types(document, "", &self.settings.separator, &mut types);
                }
                let types = Arc::new(types);
                self.cache
                    .store_types(version.id, object_type, types.clone());
                types
            }
        };
        let hidden = self.hidden_for(hub.id);
        Ok(view
            .iter()
            .filter(|(path, _)| !hidden.contains(*path))
            .map(|(path, names)| (path.clone(), names.clone()))
            .collect())
    }

    /// Returns the attribute paths holding arrays of objects.
    ///
    /// These are the paths where one raw attribute fans out into several
    /// structured children (e.g. a track's list of sample records), which
    /// curation editors treat differently from scalar-valued lists.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn array_of_object_attributes(
        &self,
        source: &str,
        hub: &str,
        object_type: &str,
    ) -> Result<BTreeSet<String>> {
        let (hub, version) = self.scope(source, hub, object_type).await?;
        let view = match self.cache.array_attributes(version.id, object_type) {
            Some(cached) => cached,
            None => {
                let documents = self
                    .with_timeout(self.store.documents(version.id, object_type))
                    .await?;
                let mut paths = BTreeSet::new();
                for document in &documents {
                    collect_array_object_paths(document, "", &self.settings.separator, &mut paths);
                }
                let paths = Arc::new(paths);
                self.cache
                    .store_array_attributes(version.id, object_type, paths.clone());
                paths
            }
        };
        let hidden = self.hidden_for(hub.id);
        Ok(view
            .iter()
            .filter(|path| !hidden.contains(*path))
            .cloned()
            .collect())
    }

    /// Returns attribute paths, optionally restricted to those under a
    /// path prefix (with the prefix stripped).
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn attributes_flat(
        &self,
        source: &str,
        hub: &str,
        object_type: &str,
        path: &str,
    ) -> Result<Vec<String>> {
        let flat = self.flat(source, hub, object_type).await?;
        if path.is_empty() {
            return Ok(flat.keys().cloned().collect());
        }
        let prefix = format!("{path}{}", self.settings.separator);
        Ok(flat
            .keys()
            .filter_map(|attribute| attribute.strip_prefix(&prefix))
            .map(ToOwned::to_owned)
            .collect())
    }

    /// Returns the next path segment of every attribute under a prefix.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn attributes(
        &self,
        source: &str,
        hub: &str,
        object_type: &str,
        path: &str,
    ) -> Result<BTreeSet<String>> {
        let separator = self.settings.separator.clone();
        Ok(self
            .attributes_flat(source, hub, object_type, path)
            .await?
            .into_iter()
            .map(|attribute| match attribute.find(&separator) {
                Some(cut) => attribute[..cut].to_owned(),
                None => attribute,
            })
            .collect())
    }

    /// Returns the distinct values observed at one attribute path.
    ///
    /// # Errors
    ///
    /// Same conditions as [`MetamodelService::flat`].
    pub async fn values(
        &self,
        source: &str,
        hub: &str,
        object_type: &str,
        path: &str,
    ) -> Result<BTreeSet<String>> {
        let flat = self.flat(source, hub, object_type).await?;
        Ok(flat.get(path).cloned().unwrap_or_default())
    }

    /// Resolves the (hub, current version) scope and checks the object
    /// type exists in it.
    async fn scope(&self, source: &str, hub: &str, object_type: &str) -> Result<(Hub, Version)> {
        let hub = self.catalog.hub(source, hub).await?;
        let version = self.catalog.current_version(hub.id).await?;
        let known = self
            .catalog
            .object_types(version.id)
            .await?
            .iter()
            .any(|ot| ot.name == object_type);
        if !known {
            return Err(Error::not_found("object type", object_type));
        }
        Ok((hub, version))
    }

    async fn flat_unfiltered(&self, version: &Version, object_type: &str) -> Result<Arc<FlatMap>> {
        if let Some(cached) = self.cache.flat(version.id, object_type) {
            return Ok(cached);
        }
        let documents = self
            .with_timeout(self.store.documents(version.id, object_type))
            .await?;
        let mut merged = FlatMap::new();
        for document in &documents {
            for (path, values) in flatten::flatten(document, &self.settings.separator) {
                merged.entry(path).or_default().extend(values);
            }
        }
        let merged = Arc::new(merged);
        self.cache
            .store_flat(version.id, object_type, merged.clone());
        Ok(merged)
    }

    async fn with_timeout<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.operation_timeout, operation)
            .await
            .map_err(|_| Error::execution("document store query timed out"))?
    }
}

/// Walks a document collecting the value types observed at each path.
fn collect_types(value: &Value, path: &str, separator: &str, out: &mut AttributeTypes) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}{separator}{key}")
                };
                collect_types(child, &child_path, separator, out);
            }
        }
        Value::Array(items) => {
            if !path.is_empty() {
                out.entry(path.to_owned()).or_default().insert("array".into());
            }
            for item in items {
                collect_types(item, path, separator, out);
            }
        }
        Value::String(_) if !path.is_empty() => {
            out.entry(path.to_owned()).or_default().insert("string".into());
        }
        Value::Number(_) if !path.is_empty() => {
            out.entry(path.to_owned()).or_default().insert("number".into());
        }
        Value::Bool(_) if !path.is_empty() => {
            out.entry(path.to_owned()).or_default().insert("boolean".into());
        }
        _ => {}
    }
}

/// Walks a document collecting the paths whose value is an array holding
/// at least one object.
fn collect_array_object_paths(
    value: &Value,
    path: &str,
    separator: &str,
    out: &mut BTreeSet<String>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}{separator}{key}")
                };
                collect_array_object_paths(child, &child_path, separator, out);
            }
        }
        Value::Array(items) => {
            if !path.is_empty() && items.iter().any(Value::is_object) {
                out.insert(path.to_owned());
            }
            for item in items {
                collect_array_object_paths(item, path, separator, out);
            }
        }
        _ => {}
    }
}
