//! Strongly-typed identifiers for metahub entities.
//!
//! All identifiers are:
//! - **Strongly typed**: a `VersionId` cannot be passed where a `HubId`
//!   is expected
//! - **Lexicographically sortable**: ULIDs encode creation time and sort
//!   naturally
//! - **Globally unique**: no coordination required for generation
//!
//! # Example
//!
//! ```rust
//! use metahub_core::id::{HubId, VersionId};
//!
//! let hub = HubId::generate();
//! let version = VersionId::generate();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: HubId = version;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::Error;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new unique identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Creates an identifier from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the creation timestamp encoded in the identifier.
            #[must_use]
            pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                let ms = self.0.timestamp_ms();
                i64::try_from(ms)
                    .ok()
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .unwrap_or_else(chrono::Utc::now)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_str(s).map(Self).map_err(|e| Error::Validation {
                    message: format!(concat!("invalid ", $label, " id: {}"), e),
                })
            }
        }
    };
}

entity_id!(
    /// Identifier of a hub (one schema context within a source).
    HubId,
    "hub"
);

entity_id!(
    /// Identifier of an immutable version snapshot of a hub.
    VersionId,
    "version"
);

entity_id!(
    /// Identifier of an object type (a document collection within a version).
    ObjectTypeId,
    "object type"
);

entity_id!(
    /// Identifier of an ordered mapping rule within a version.
    MappingId,
    "mapping"
);

entity_id!(
    /// Identifier of a declared cross-collection reference.
    ReferenceId,
    "reference"
);

entity_id!(
    /// Identifier of one ingested document.
    DocumentId,
    "document"
);
