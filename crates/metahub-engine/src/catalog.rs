//! In-memory registry of hubs, versions, and object types.
//!
//! The catalog is the single writer surface for version metadata. All
//! state sits behind one `RwLock`; every state transition happens inside
//! one write section, which is what makes activation atomic for readers:
//! no reader can ever observe zero or two current versions for a hub.
//!
//! Versions are append-only. The only mutable ordering state is the
//! mapping order number (see [`crate::mappings`]); everything else is
//! written once at ingestion time.

use std::collections::HashMap;
use tokio::sync::RwLock;

use metahub_core::error::{Error, Result};
use metahub_core::id::{HubId, ObjectTypeId, VersionId};

use crate::model::{Hub, Mapping, ObjectType, Reference, Version};

#[derive(Debug)]
pub(crate) struct VersionRecord {
    pub(crate) version: Version,
    pub(crate) object_types: Vec<ObjectType>,
    pub(crate) mappings: Vec<Mapping>,
    pub(crate) references: Vec<Reference>,
}

impl VersionRecord {
    fn new(version: Version) -> Self {
        Self {
            version,
            object_types: Vec::new(),
            mappings: Vec::new(),
            references: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct HubRecord {
    hub: Hub,
    versions: Vec<VersionId>,
}

#[derive(Debug, Default)]
pub(crate) struct CatalogInner {
    hubs: HashMap<HubId, HubRecord>,
    by_name: HashMap<(String, String), HubId>,
    pub(crate) versions: HashMap<VersionId, VersionRecord>,
}

impl CatalogInner {
    pub(crate) fn version_record(&self, version: VersionId) -> Result<&VersionRecord> {
        self.versions
            .get(&version)
            .ok_or_else(|| Error::not_found("version", version.to_string()))
    }

    pub(crate) fn version_record_mut(&mut self, version: VersionId) -> Result<&mut VersionRecord> {
        self.versions
            .get_mut(&version)
            .ok_or_else(|| Error::not_found("version", version.to_string()))
    }

    fn version(&self, version: VersionId) -> Result<&Version> {
        self.version_record(version).map(|record| &record.version)
    }

    fn hub_record(&self, hub: HubId) -> Result<&HubRecord> {
        self.hubs
            .get(&hub)
            .ok_or_else(|| Error::not_found("hub", hub.to_string()))
    }

    fn current_of(&self, hub: HubId) -> Option<Version> {
        let record = self.hubs.get(&hub)?;
        record
            .versions
            .iter()
            .filter_map(|id| self.versions.get(id).map(|r| &r.version))
            .find(|v| v.current)
            .cloned()
    }
}

/// Registry of hubs, versions, object types, mappings, and references.
#[derive(Debug, Default)]
pub struct Catalog {
    pub(crate) inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hub with the given source and name, creating it on
    /// first use.
    pub async fn hub_or_create(&self, source: &str, name: &str) -> Hub {
        let mut inner = self.inner.write().await;
        let key = (source.to_owned(), name.to_owned());
        if let Some(id) = inner.by_name.get(&key) {
            if let Some(record) = inner.hubs.get(id) {
                return record.hub.clone();
            }
        }
        let hub = Hub {
            id: HubId::generate(),
            source: source.to_owned(),
            name: name.to_owned(),
        };
        inner.by_name.insert(key, hub.id);
        inner.hubs.insert(
            hub.id,
            HubRecord {
                hub: hub.clone(),
                versions: Vec::new(),
            },
        );
        hub
    }

    /// Looks up a hub by source and name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist.
    pub async fn hub(&self, source: &str, name: &str) -> Result<Hub> {
        let inner = self.inner.read().await;
        let key = (source.to_owned(), name.to_owned());
        inner
            .by_name
            .get(&key)
            .and_then(|id| inner.hubs.get(id))
            .map(|record| record.hub.clone())
            .ok_or_else(|| Error::not_found("hub", format!("{source}/{name}")))
    }

    /// Looks up a hub by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist.
    pub async fn hub_by_id(&self, hub: HubId) -> Result<Hub> {
        let inner = self.inner.read().await;
        inner.hub_record(hub).map(|record| record.hub.clone())
    }

    /// Lists every hub.
    pub async fn hubs(&self) -> Vec<Hub> {
        let inner = self.inner.read().await;
        let mut hubs: Vec<Hub> = inner.hubs.values().map(|r| r.hub.clone()).collect();
        hubs.sort_by(|a, b| (&a.source, &a.name).cmp(&(&b.source, &b.name)));
        hubs
    }

    /// Creates a new, inactive version for a hub.
    ///
    /// The version gets the next sequence number. It does not become
    /// current until it is explicitly activated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist.
    pub async fn begin_version(&self, hub: HubId, created_by: &str) -> Result<Version> {
        let mut inner = self.inner.write().await;
        let last_sequence = {
            let record = inner.hub_record(hub)?;
            record
                .versions
                .iter()
                .filter_map(|id| inner.versions.get(id).map(|r| r.version.sequence))
                .max()
                .unwrap_or(0)
        };
        let version = Version {
            id: VersionId::generate(),
            hub,
            sequence: last_sequence + 1,
            created_at: chrono::Utc::now(),
            created_by: created_by.to_owned(),
            current: false,
        };
        inner
            .versions
            .insert(version.id, VersionRecord::new(version.clone()));
        inner
            .hubs
            .get_mut(&hub)
            .ok_or_else(|| Error::not_found("hub", hub.to_string()))?
            .versions
            .push(version.id);
        Ok(version)
    }

    /// Deletes an inactive version and all its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrentModification`] when the version is
    /// current, [`Error::NotFound`] when it does not exist.
    pub async fn delete_version(&self, version: VersionId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let (current, hub) = {
            let v = inner.version(version)?;
            (v.current, v.hub)
        };
        if current {
            return Err(Error::concurrent(format!(
                "version {version} is current and cannot be deleted"
            )));
        }
        inner.versions.remove(&version);
        if let Some(hub_record) = inner.hubs.get_mut(&hub) {
            hub_record.versions.retain(|id| *id != version);
        }
        Ok(())
    }

    /// Lists a hub's versions in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist.
    pub async fn versions(&self, hub: HubId) -> Result<Vec<Version>> {
        let inner = self.inner.read().await;
        let record = inner.hub_record(hub)?;
        let mut versions: Vec<Version> = record
            .versions
            .iter()
            .filter_map(|id| inner.versions.get(id).map(|r| r.version.clone()))
            .collect();
        versions.sort_by_key(|v| v.sequence);
        Ok(versions)
    }

    /// Returns the hub's current version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist or has no
    /// current version. A missing current version is an error, never a
    /// silently-empty result.
    pub async fn current_version(&self, hub: HubId) -> Result<Version> {
        let inner = self.inner.read().await;
        inner.hub_record(hub)?;
        inner
            .current_of(hub)
            .ok_or_else(|| Error::not_found("current version of hub", hub.to_string()))
    }

    /// Returns the hub's current version, or `None` when no version is
    /// active yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the hub does not exist.
    pub async fn try_current_version(&self, hub: HubId) -> Result<Option<Version>> {
        let inner = self.inner.read().await;
        inner.hub_record(hub)?;
        Ok(inner.current_of(hub))
    }

    /// Returns a version by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist.
    pub async fn version(&self, version: VersionId) -> Result<Version> {
        let inner = self.inner.read().await;
        inner.version(version).cloned()
    }

    /// Atomically makes `version` its hub's current version.
    ///
    /// Inside one write section: the previously current version (if any)
    /// loses its flag and `version` gains it. `expected_current` is the
    /// caller's view of the hub's current version; if another activation
    /// won the race in between, the call fails instead of silently
    /// re-ordering history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist and
    /// [`Error::ConcurrentModification`] when `expected_current` no longer
    /// matches.
    pub async fn activate_version(
        &self,
        version: VersionId,
        expected_current: Option<VersionId>,
    ) -> Result<Version> {
        let mut inner = self.inner.write().await;
        let hub = inner.version(version)?.hub;
        let actual_current = inner.current_of(hub).map(|v| v.id);
        if actual_current != expected_current {
            return Err(Error::concurrent(format!(
                "current version of hub {hub} changed during activation"
            )));
        }
        if let Some(previous) = actual_current {
            if let Some(record) = inner.versions.get_mut(&previous) {
                record.version.current = false;
            }
        }
        let activated = &mut inner.version_record_mut(version)?.version;
        activated.current = true;
        Ok(activated.clone())
    }

    /// Records an object type under a version, idempotently by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist.
    pub async fn record_object_type(&self, version: VersionId, name: &str) -> Result<ObjectType> {
        let mut inner = self.inner.write().await;
        let record = inner.version_record_mut(version)?;
        if let Some(existing) = record.object_types.iter().find(|ot| ot.name == name) {
            return Ok(existing.clone());
        }
        let object_type = ObjectType {
            id: ObjectTypeId::generate(),
            version,
            name: name.to_owned(),
        };
        record.object_types.push(object_type.clone());
        Ok(object_type)
    }

    /// Lists the object types of a version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist.
    pub async fn object_types(&self, version: VersionId) -> Result<Vec<ObjectType>> {
        let inner = self.inner.read().await;
        Ok(inner.version_record(version)?.object_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hub_or_create_is_idempotent() {
        let catalog = Catalog::new();
        let a = catalog.hub_or_create("ihec", "epigenomes").await;
        let b = catalog.hub_or_create("ihec", "epigenomes").await;
        assert_eq!(a, b);
        assert_eq!(catalog.hubs().await.len(), 1);
    }

    #[tokio::test]
    async fn versions_get_dense_increasing_sequence_numbers() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let v1 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        let v2 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        assert_eq!(v1.sequence, 1);
        assert_eq!(v2.sequence, 2);
        assert!(!v1.current);
    }

    #[tokio::test]
    async fn missing_current_version_is_not_found() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        catalog.begin_version(hub.id, "crawler").await.unwrap();
        let err = catalog.current_version(hub.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(catalog.try_current_version(hub.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activation_swaps_the_current_flag_atomically() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let v1 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        let v2 = catalog.begin_version(hub.id, "crawler").await.unwrap();

        catalog.activate_version(v1.id, None).await.unwrap();
        assert!(catalog.current_version(hub.id).await.unwrap().id == v1.id);

        catalog.activate_version(v2.id, Some(v1.id)).await.unwrap();
        let versions = catalog.versions(hub.id).await.unwrap();
        let current: Vec<_> = versions.iter().filter(|v| v.current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, v2.id);
    }

    #[tokio::test]
    async fn stale_activation_expectation_is_detected() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let v1 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        let v2 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        catalog.activate_version(v1.id, None).await.unwrap();

        let err = catalog.activate_version(v2.id, None).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn current_version_cannot_be_deleted() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let v1 = catalog.begin_version(hub.id, "crawler").await.unwrap();
        catalog.activate_version(v1.id, None).await.unwrap();
        let err = catalog.delete_version(v1.id).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn object_types_are_recorded_once_per_name() {
        let catalog = Catalog::new();
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let version = catalog.begin_version(hub.id, "crawler").await.unwrap();
        let a = catalog.record_object_type(version.id, "donor").await.unwrap();
        let b = catalog.record_object_type(version.id, "donor").await.unwrap();
        catalog.record_object_type(version.id, "sample").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(catalog.object_types(version.id).await.unwrap().len(), 2);
    }
}
