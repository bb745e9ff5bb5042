//! Version activation and reload notifications.
//!
//! Activation is the only operation that changes which version serves
//! reads. It runs as one guarded state transition in the catalog, then
//! synchronously invalidates every cached metamodel view before returning,
//! and finally publishes a reload event so embedding applications can
//! refresh whatever they derived from the old version.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use metahub_core::error::Result;
use metahub_core::event::{DomainEvent, EventBus, EventPayload};
use metahub_core::id::VersionId;

use crate::cache::MetamodelCache;
use crate::catalog::Catalog;
use crate::model::Version;

/// What a reload event announces about the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadOperation {
    /// A different version became current.
    VersionChange,
    /// New raw documents were ingested.
    Ingest,
    /// The curated set was recomputed.
    Curation,
}

/// Payload of a hub reload event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadPayload {
    /// Name of the affected hub.
    pub hub: String,
    /// What changed.
    pub operation: ReloadOperation,
    /// The version the change concerns.
    pub version: VersionId,
}

impl EventPayload for ReloadPayload {
    const EVENT_TYPE: &'static str = "hub.reload";
    const EVENT_VERSION: u32 = 1;
}

/// Coordinates activation, cache invalidation, and reload notification.
pub struct VersionLifecycle {
    catalog: Arc<Catalog>,
    cache: Arc<MetamodelCache>,
    events: EventBus<ReloadPayload>,
}

impl VersionLifecycle {
    /// Creates a lifecycle coordinator over the given catalog and cache.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, cache: Arc<MetamodelCache>) -> Self {
        Self {
            catalog,
            cache,
            events: EventBus::default(),
        }
    }

    /// Subscribes to reload events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DomainEvent<ReloadPayload>> {
        self.events.subscribe()
    }

    /// Makes a version the current one for its hub.
    ///
    /// The previous current version is read first and passed as the
    /// compare-and-swap expectation, so two concurrent activations of the
    /// same hub cannot both succeed against the same predecessor. The
    /// cache is invalidated before this method returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist and
    /// [`Error::ConcurrentModification`] when another activation raced
    /// this one.
    ///
    /// [`Error::NotFound`]: metahub_core::error::Error::NotFound
    /// [`Error::ConcurrentModification`]: metahub_core::error::Error::ConcurrentModification
    pub async fn activate(&self, version: VersionId) -> Result<Version> {
        let target = self.catalog.version(version).await?;
        let hub = self.catalog.hub_by_id(target.hub).await?;
        let expected = self
            .catalog
            .try_current_version(target.hub)
            .await?
            .map(|current| current.id);

        let activated = self.catalog.activate_version(version, expected).await?;
        self.cache.invalidate_all();
        metrics::counter!(metahub_core::metrics::VERSION_ACTIVATIONS).increment(1);
        tracing::info!(
            hub = %hub.name,
            version = %activated.id,
            sequence = activated.sequence,
            "activated version"
        );

        let event = DomainEvent::new(
            "lifecycle",
            ReloadPayload {
                hub: hub.name,
                operation: ReloadOperation::VersionChange,
                version: activated.id,
            },
        )?;
        self.events.publish(event);
        Ok(activated)
    }
}
