//! # metahub-engine
//!
//! The metahub domain engine: schema inference, curation, search, and
//! version lifecycle over heterogeneous metadata documents.
//!
//! This crate implements four tightly-coupled pieces around one versioned
//! document store:
//!
//! - **Metamodel Extraction**: aggregates flattened attribute paths across
//!   a collection into flat and tree catalogue views
//! - **Curation Pipeline**: applies ordered mapping rules to raw documents,
//!   producing curated documents
//! - **Reference Graph & Query Compiler**: joins collections along declared
//!   cross-references to answer ad-hoc searches
//! - **Version Lifecycle**: governs atomic activation of immutable version
//!   snapshots and invalidation of derived caches
//!
//! ## Data model
//!
//! ```text
//! Source ──► Hub ──► Version (immutable, at most one current per hub)
//!                      ├── ObjectType ──► raw / curated Documents
//!                      ├── Mapping      (dense 0..N-1 order)
//!                      └── Reference    (cross-collection equality join)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use metahub_engine::prelude::*;
//!
//! let catalog = Arc::new(Catalog::new());
//! let cache = Arc::new(MetamodelCache::new());
//! let lifecycle = VersionLifecycle::new(catalog.clone(), cache.clone());
//!
//! lifecycle.activate(version_id).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod catalog;
pub mod curation;
pub mod lifecycle;
pub mod mappings;
pub mod metamodel;
pub mod model;
pub mod provider;
pub mod references;
pub mod search;

pub use metahub_core::error::{Error, Result};

pub use cache::MetamodelCache;
pub use catalog::Catalog;
pub use curation::{CurationPipeline, CurationReport};
pub use lifecycle::{ReloadOperation, ReloadPayload, VersionLifecycle};
pub use mappings::MoveDirection;
pub use metamodel::MetamodelService;
pub use model::{Hub, Mapping, MappingRule, ObjectType, Reference, SearchResult, Version};
pub use provider::{DataProvider, IngestRunner};
pub use search::SearchService;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cache::MetamodelCache;
    pub use crate::catalog::Catalog;
    pub use crate::curation::CurationPipeline;
    pub use crate::lifecycle::VersionLifecycle;
    pub use crate::metamodel::MetamodelService;
    pub use crate::model::{Hub, Mapping, MappingRule, ObjectType, Reference, Version};
    pub use crate::provider::{DataProvider, IngestRunner};
    pub use crate::search::SearchService;
    pub use metahub_core::error::{Error, Result};
}
