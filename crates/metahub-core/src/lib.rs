//! # metahub-core
//!
//! Shared kernel for the metahub metadata indexing engine.
//!
//! Metahub indexes heterogeneous, semi-structured metadata documents
//! harvested from external scientific catalogues, infers a queryable
//! "metamodel" over them, curates raw documents through operator-defined
//! mapping rules, and answers cross-collection search queries. This crate
//! provides the pieces every component of that engine shares:
//!
//! - **Error taxonomy**: typed errors for not-found, configuration,
//!   validation, execution, and concurrent-modification failures
//! - **Identifiers**: strongly-typed ULID newtypes for hubs, versions,
//!   object types, mappings, and references
//! - **Attribute flattening**: the path-indexed view over nested documents
//!   that both metamodel extraction and static mappings are built on
//! - **Collaborator contracts**: the document store, fetch, and scripting
//!   interfaces the engine is wired against, plus an in-memory store
//! - **Domain events**: the envelope and broadcast bus used to announce
//!   version activations
//!
//! ## Example
//!
//! ```rust
//! use metahub_core::flatten;
//! use serde_json::json;
//!
//! let doc = json!({"a": {"b": "x", "c": ["y", "z"]}});
//! let flat = flatten::flatten(&doc, ">");
//! assert!(flat["a>c"].contains("z"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod flatten;
pub mod id;
pub mod metrics;
pub mod observability;
pub mod predicate;
pub mod scripting;
pub mod store;

pub use config::{CurationFailurePolicy, Settings};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus, EventPayload};
pub use id::{DocumentId, HubId, MappingId, ObjectTypeId, ReferenceId, VersionId};
pub use predicate::{CompareOp, Literal, Predicate};
pub use store::{CompiledQuery, DocumentStore, JoinCondition, JoinRow, MemoryStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{CurationFailurePolicy, Settings};
    pub use crate::error::{Error, Result};
    pub use crate::flatten::{self, FlatMap};
    pub use crate::id::{HubId, MappingId, ObjectTypeId, ReferenceId, VersionId};
    pub use crate::predicate::Predicate;
    pub use crate::scripting::{ScriptingEngine, ScriptingRegistry};
    pub use crate::store::{CompiledQuery, DocumentStore, MemoryStore};
}
