//! Data providers and the ingestion runner.
//!
//! A provider knows how to fetch one remote repository's documents and
//! what to do with them before they are stored: which attributes to strip
//! out entirely and which to hide from metamodel views. The runner turns
//! one fetch into one new, inactive version; activation is a separate,
//! deliberate step (see [`crate::lifecycle`]).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use metahub_core::config::Settings;
use metahub_core::error::Result;
use metahub_core::flatten::remove_path;
use metahub_core::id::HubId;
use metahub_core::metrics::{INGEST_DOCUMENTS, INGEST_ERRORS, INGEST_RUNS};
use metahub_core::observability::ingest_span;
use metahub_core::store::DocumentStore;
use tracing::Instrument;

use crate::catalog::Catalog;
use crate::metamodel::MetamodelService;
use crate::model::Version;

/// A source of raw documents for one hub.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Stable source identifier, used as the hub's source component.
    fn name(&self) -> &str;

    /// Fetches every document, tagged with its object type name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the remote repository cannot be
    /// reached or its payload cannot be decoded. A failed fetch aborts the
    /// run before any version is created.
    ///
    /// [`Error::Execution`]: metahub_core::error::Error::Execution
    async fn fetch(&self) -> Result<Vec<(String, Value)>>;

    /// Attribute paths to strip from every document before storing.
    fn attributes_to_skip(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Attribute paths to keep in storage but hide from metamodel views.
    fn attributes_to_hide(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Post-processes one fetched document before storage.
    ///
    /// The default removes every [`attributes_to_skip`] path. Providers
    /// with source-specific cleanup override this and usually still call
    /// the removal themselves.
    ///
    /// [`attributes_to_skip`]: DataProvider::attributes_to_skip
    fn postprocess(&self, mut document: Value, separator: &str) -> Value {
        for path in self.attributes_to_skip() {
            remove_path(&mut document, &path, separator);
        }
        document
    }
}

/// Executes ingestion runs, one at a time per hub.
pub struct IngestRunner {
    catalog: Arc<Catalog>,
    store: Arc<dyn DocumentStore>,
    metamodel: Arc<MetamodelService>,
    settings: Settings,
    locks: Mutex<HashMap<HubId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestRunner {
    /// Creates a runner over the given catalog, store, and metamodel
    /// service.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn DocumentStore>,
        metamodel: Arc<MetamodelService>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            store,
            metamodel,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn hub_lock(&self, hub: HubId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hub)
            .or_default()
            .clone()
    }

    /// Fetches a provider's documents into a new, inactive version.
    ///
    /// Runs for the same hub are serialized; runs for different hubs
    /// proceed concurrently. The fetch happens before the version is
    /// created, so a provider failure leaves no trace in the catalog. A
    /// storage failure mid-run deletes the partial version and its
    /// documents before returning the error.
    ///
    /// The returned version is never activated automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the fetch or a store write fails.
    ///
    /// [`Error::Execution`]: metahub_core::error::Error::Execution
    pub async fn run(
        &self,
        provider: &dyn DataProvider,
        hub_name: &str,
        created_by: &str,
    ) -> Result<Version> {
        let span = ingest_span(provider.name(), hub_name);
        self.run_inner(provider, hub_name, created_by)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        provider: &dyn DataProvider,
        hub_name: &str,
        created_by: &str,
    ) -> Result<Version> {
        let hub = self.catalog.hub_or_create(provider.name(), hub_name).await;
        let lock = self.hub_lock(hub.id);
        let _serialized = lock.lock().await;

        let fetched = match provider.fetch().await {
            Ok(fetched) => fetched,
            Err(error) => {
                metrics::counter!(INGEST_ERRORS).increment(1);
                return Err(error);
            }
        };

        let version = self.catalog.begin_version(hub.id, created_by).await?;
        let mut stored: u64 = 0;
        for (object_type, document) in fetched {
            let document = provider.postprocess(document, &self.settings.separator);
            let result = async {
                self.catalog
                    .record_object_type(version.id, &object_type)
                    .await?;
                self.store.insert(version.id, &object_type, document).await
            }
            .await;
            if let Err(error) = result {
                metrics::counter!(INGEST_ERRORS).increment(1);
                self.discard(version.id).await;
                return Err(error);
            }
            stored += 1;
        }

        self.metamodel
            .set_hidden_attributes(hub.id, provider.attributes_to_hide());

        metrics::counter!(INGEST_RUNS).increment(1);
        metrics::counter!(INGEST_DOCUMENTS).increment(stored);
        tracing::info!(
            hub = %hub.name,
            version = %version.id,
            documents = stored,
            "ingested version"
        );
        Ok(version)
    }

    /// Removes a partially-written version after a failed run.
    async fn discard(&self, version: metahub_core::id::VersionId) {
        if let Err(error) = self.store.drop_version(version).await {
            tracing::error!(%version, %error, "failed to drop documents of aborted run");
        }
        if let Err(error) = self.catalog.delete_version(version).await {
            tracing::error!(%version, %error, "failed to delete version of aborted run");
        }
    }
}
