//! Derived-view cache for the metamodel.
//!
//! Every metamodel view is a pure function of one version's raw documents,
//! so the engine caches computed views keyed by (version, object type) and
//! throws the whole cache away when any version is activated. Keying by
//! version means a slow read that resolved its scope against a superseded
//! version can only ever store under that version's key; it can never be
//! observed by readers scoped to the newly-activated version, even when it
//! completes after the activation's invalidation ran.
//!
//! Invalidation is global by cache namespace, not per hub: a stale entry
//! under any key is wasted memory at worst, while a cold cache is only a
//! slow read.
//!
//! Invalidation is synchronous: [`MetamodelCache::invalidate_all`] has
//! completed before `activate` returns to its caller, so no caller can
//! read a stale view after a successful activation.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use metahub_core::flatten::FlatMap;
use metahub_core::id::VersionId;

/// Attribute path to the set of inferred value type names.
pub type AttributeTypes = BTreeMap<String, BTreeSet<String>>;

type Key = (VersionId, String);
type Namespace<V> = RwLock<HashMap<Key, Arc<V>>>;

fn read<V>(namespace: &Namespace<V>, key: &Key) -> Option<Arc<V>> {
    namespace
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

fn write<V>(namespace: &Namespace<V>, key: Key, value: Arc<V>) {
    namespace
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, value);
}

fn clear<V>(namespace: &Namespace<V>) {
    namespace
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Cache of computed metamodel views.
#[derive(Debug, Default)]
pub struct MetamodelCache {
    flat: Namespace<FlatMap>,
    tree: Namespace<Value>,
    types: Namespace<AttributeTypes>,
    array_attributes: Namespace<BTreeSet<String>>,
}

impl MetamodelCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached flat view for a (version, object type), if
    /// present.
    #[must_use]
    pub fn flat(&self, version: VersionId, object_type: &str) -> Option<Arc<FlatMap>> {
        read(&self.flat, &(version, object_type.to_owned()))
    }

    /// Stores the flat view for a (version, object type).
    pub fn store_flat(&self, version: VersionId, object_type: &str, view: Arc<FlatMap>) {
        write(&self.flat, (version, object_type.to_owned()), view);
    }

    /// Returns the cached tree view for a (version, object type), if
    /// present.
    #[must_use]
    pub fn tree(&self, version: VersionId, object_type: &str) -> Option<Arc<Value>> {
        read(&self.tree, &(version, object_type.to_owned()))
    }

    /// Stores the tree view for a (version, object type).
    pub fn store_tree(&self, version: VersionId, object_type: &str, view: Arc<Value>) {
        write(&self.tree, (version, object_type.to_owned()), view);
    }

    /// Returns the cached attribute-type map for a (version, object type),
    /// if present.
    #[must_use]
    pub fn types(&self, version: VersionId, object_type: &str) -> Option<Arc<AttributeTypes>> {
        read(&self.types, &(version, object_type.to_owned()))
    }

    /// Stores the attribute-type map for a (version, object type).
    pub fn store_types(&self, version: VersionId, object_type: &str, view: Arc<AttributeTypes>) {
        write(&self.types, (version, object_type.to_owned()), view);
    }

    /// Returns the cached array-of-objects attribute set for a
    /// (version, object type), if present.
    #[must_use]
    pub fn array_attributes(
        &self,
        version: VersionId,
        object_type: &str,
    ) -> Option<Arc<BTreeSet<String>>> {
        read(&self.array_attributes, &(version, object_type.to_owned()))
    }

    /// Stores the array-of-objects attribute set for a (version, object
    /// type).
    pub fn store_array_attributes(
        &self,
        version: VersionId,
        object_type: &str,
        view: Arc<BTreeSet<String>>,
    ) {
        write(
            &self.array_attributes,
            (version, object_type.to_owned()),
            view,
        );
    }

    /// Clears every namespace.
    ///
    /// Called synchronously from version activation; completes before the
    /// activation returns.
    pub fn invalidate_all(&self) {
        clear(&self.flat);
        clear(&self.tree);
        clear(&self.types);
        clear(&self.array_attributes);
        metrics::counter!(metahub_core::metrics::CACHE_INVALIDATIONS).increment(1);
    }
}
