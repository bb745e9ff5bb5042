//! Domain entities.
//!
//! These are plain serde records; invariants (single current version per
//! hub, dense mapping order) are enforced by the [`Catalog`], not by the
//! types themselves.
//!
//! [`Catalog`]: crate::catalog::Catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use metahub_core::id::{HubId, MappingId, ObjectTypeId, ReferenceId, VersionId};

/// A logical grouping of documents from one source (one schema context).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    /// Unique identifier.
    pub id: HubId,
    /// Name of the external source this hub belongs to.
    pub source: String,
    /// Hub name, unique within its source.
    pub name: String,
}

/// An immutable snapshot of all documents ingested for a hub at one time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique identifier.
    pub id: VersionId,
    /// Owning hub.
    pub hub: HubId,
    /// Dense, increasing sequence number within the hub, starting at 1.
    pub sequence: u64,
    /// When the snapshot was created.
    pub created_at: DateTime<Utc>,
    /// Who or what created the snapshot.
    pub created_by: String,
    /// Whether this is the hub's active version. At most one version per
    /// hub carries this flag.
    pub current: bool,
}

/// A named document collection within a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    /// Unique identifier.
    pub id: ObjectTypeId,
    /// Owning version.
    pub version: VersionId,
    /// Collection name (e.g. `"donor"`, `"sample"`).
    pub name: String,
}

/// How a mapping produces its values from a raw document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingRule {
    /// Static extraction of one attribute path.
    Static {
        /// Attribute path resolved against the raw document.
        from: String,
    },
    /// Delegation to the configured scripting engine.
    Script {
        /// Script body handed to the scripting contract.
        body: String,
    },
}

/// One ordered transformation rule within a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Unique identifier.
    pub id: MappingId,
    /// Owning version.
    pub version: VersionId,
    /// Position in the pipeline; dense 0..N-1 within the version.
    pub order: u64,
    /// Value production rule.
    pub rule: MappingRule,
    /// Attribute name in the curated document.
    pub to: String,
}

impl Mapping {
    /// Returns `true` for static path-extraction mappings.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.rule, MappingRule::Static { .. })
    }
}

/// A declared equality join between two object types' attributes.
///
/// Endpoints are recorded by object-type *name* so references can be
/// copied between versions whose object-type sets overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique identifier.
    pub id: ReferenceId,
    /// Owning version.
    pub version: VersionId,
    /// Left endpoint object-type name.
    pub from_object_type: String,
    /// Attribute path within the left document.
    pub from_attribute: String,
    /// Right endpoint object-type name.
    pub to_object_type: String,
    /// Attribute path within the right document.
    pub to_attribute: String,
}

/// One search result row: object-type name to that row's document content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResult {
    /// Projected document content per object type.
    pub content: BTreeMap<String, Value>,
}
