//! Reference management.
//!
//! References declare the only cross-collection relationships the engine
//! knows about: an equality between two object types' attributes. They are
//! recorded per version and keyed by object-type *name*, which is what
//! makes them copyable to a newly-activated version whose object-type set
//! overlaps the old one.

use metahub_core::error::{Error, Result};
use metahub_core::id::{ReferenceId, VersionId};

use crate::catalog::Catalog;
use crate::model::Reference;

impl Catalog {
    /// Lists a version's references.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist.
    pub async fn references(&self, version: VersionId) -> Result<Vec<Reference>> {
        let inner = self.inner.read().await;
        Ok(inner.version_record(version)?.references.clone())
    }

    /// Declares a reference between two object types of a version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist and
    /// [`Error::Validation`] when either endpoint names an object type the
    /// version does not have.
    pub async fn add_reference(
        &self,
        version: VersionId,
        from_object_type: &str,
        from_attribute: &str,
        to_object_type: &str,
        to_attribute: &str,
    ) -> Result<Reference> {
        let mut inner = self.inner.write().await;
        let record = inner.version_record_mut(version)?;
        for endpoint in [from_object_type, to_object_type] {
            if !record.object_types.iter().any(|ot| ot.name == endpoint) {
                return Err(Error::validation(format!(
                    "object type {endpoint:?} does not exist in version {version}"
                )));
            }
        }
        let reference = Reference {
            id: ReferenceId::generate(),
            version,
            from_object_type: from_object_type.to_owned(),
            from_attribute: from_attribute.to_owned(),
            to_object_type: to_object_type.to_owned(),
            to_attribute: to_attribute.to_owned(),
        };
        record.references.push(reference.clone());
        Ok(reference)
    }

    /// Deletes a reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the reference does not exist.
    pub async fn delete_reference(&self, reference: ReferenceId) -> Result<()> {
        let mut inner = self.inner.write().await;
        for record in inner.versions.values_mut() {
            if let Some(position) = record.references.iter().position(|r| r.id == reference) {
                record.references.remove(position);
                return Ok(());
            }
        }
        Err(Error::not_found("reference", reference.to_string()))
    }

    /// Copies references from one version to another where both endpoint
    /// object-type names exist (case-insensitively) in the target.
    ///
    /// Non-matching references are silently dropped: a shrunken schema is
    /// the expected outcome of source evolution, not an error. Returns the
    /// number of references copied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when either version does not exist.
    pub async fn copy_references(
        &self,
        source_version: VersionId,
        target_version: VersionId,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let source_references = inner.version_record(source_version)?.references.clone();
        let target = inner.version_record_mut(target_version)?;

        let mut copied = 0;
        for reference in source_references {
            let from = Self::object_type_name(target, &reference.from_object_type);
            let to = Self::object_type_name(target, &reference.to_object_type);
            let (Some(from), Some(to)) = (from, to) else {
                tracing::debug!(
                    from = %reference.from_object_type,
                    to = %reference.to_object_type,
                    "dropping reference without matching object types in target version"
                );
                continue;
            };
            target.references.push(Reference {
                id: ReferenceId::generate(),
                version: target_version,
                from_object_type: from,
                from_attribute: reference.from_attribute,
                to_object_type: to,
                to_attribute: reference.to_attribute,
            });
            copied += 1;
        }
        Ok(copied)
    }

    /// Resolves an object-type name in the target version,
    /// case-insensitively, returning the target's own spelling.
    fn object_type_name(
        record: &crate::catalog::VersionRecord,
        name: &str,
    ) -> Option<String> {
        record
            .object_types
            .iter()
            .find(|ot| ot.name.eq_ignore_ascii_case(name))
            .map(|ot| ot.name.clone())
    }
}
