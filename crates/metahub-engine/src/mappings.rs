//! Mapping order management.
//!
//! Mappings form the ordered curation pipeline of a version. Their order
//! numbers are the only mutable ordering state in the catalog and must
//! stay a dense 0..N-1 sequence: adding appends at the end, moving swaps
//! with a neighbour, deleting compacts everything behind the gap.

use metahub_core::error::{Error, Result};
use metahub_core::id::{MappingId, VersionId};

use crate::catalog::Catalog;
use crate::model::{Mapping, MappingRule};

/// Direction for [`Catalog::move_mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Towards order number 0.
    Up,
    /// Towards the end of the pipeline.
    Down,
}

impl Catalog {
    /// Lists a version's mappings in pipeline order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist.
    pub async fn mappings(&self, version: VersionId) -> Result<Vec<Mapping>> {
        let inner = self.inner.read().await;
        let mut mappings = inner.version_record(version)?.mappings.clone();
        mappings.sort_by_key(|m| m.order);
        Ok(mappings)
    }

    /// Appends a mapping to the end of a version's pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the version does not exist and
    /// [`Error::Validation`] when the target attribute is empty.
    pub async fn add_mapping(
        &self,
        version: VersionId,
        rule: MappingRule,
        to: &str,
    ) -> Result<Mapping> {
        if to.trim().is_empty() {
            return Err(Error::validation("mapping target must be non-empty"));
        }
        let mut inner = self.inner.write().await;
        let record = inner.version_record_mut(version)?;
        let mapping = Mapping {
            id: MappingId::generate(),
            version,
            order: record.mappings.len() as u64,
            rule,
            to: to.to_owned(),
        };
        record.mappings.push(mapping.clone());
        Ok(mapping)
    }

    /// Swaps a mapping with its neighbour in the given direction.
    ///
    /// Moving the first mapping up or the last mapping down is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the mapping does not exist.
    pub async fn move_mapping(&self, mapping: MappingId, direction: MoveDirection) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = Self::record_of_mapping(&mut inner, mapping)?;
        let Some(position) = record.mappings.iter().position(|m| m.id == mapping) else {
            return Err(Error::not_found("mapping", mapping.to_string()));
        };
        let order = record.mappings[position].order;
        let neighbour_order = match direction {
            MoveDirection::Up => {
                let Some(previous) = order.checked_sub(1) else {
                    return Ok(());
                };
                previous
            }
            MoveDirection::Down => order + 1,
        };
        let Some(neighbour) = record
            .mappings
            .iter()
            .position(|m| m.order == neighbour_order)
        else {
            return Ok(());
        };
        record.mappings[position].order = neighbour_order;
        record.mappings[neighbour].order = order;
        Ok(())
    }

    /// Deletes a mapping and compacts the remaining order numbers back to
    /// a dense 0..N-1 sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the mapping does not exist.
    pub async fn delete_mapping(&self, mapping: MappingId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = Self::record_of_mapping(&mut inner, mapping)?;
        let Some(position) = record.mappings.iter().position(|m| m.id == mapping) else {
            return Err(Error::not_found("mapping", mapping.to_string()));
        };
        let removed_order = record.mappings[position].order;
        record.mappings.remove(position);
        for m in &mut record.mappings {
            if m.order > removed_order {
                m.order -= 1;
            }
        }
        Ok(())
    }

    fn record_of_mapping<'a>(
        inner: &'a mut crate::catalog::CatalogInner,
        mapping: MappingId,
    ) -> Result<&'a mut crate::catalog::VersionRecord> {
        let version = inner
            .versions
            .values()
            .find(|record| record.mappings.iter().any(|m| m.id == mapping))
            .map(|record| record.version.id)
            .ok_or_else(|| Error::not_found("mapping", mapping.to_string()))?;
        inner.version_record_mut(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pipeline_of(catalog: &Catalog, version: VersionId) -> Vec<(u64, String)> {
        catalog
            .mappings(version)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.order, m.to))
            .collect()
    }

    async fn seed(catalog: &Catalog, names: &[&str]) -> (VersionId, Vec<MappingId>) {
        let hub = catalog.hub_or_create("ihec", "epigenomes").await;
        let version = catalog.begin_version(hub.id, "test").await.unwrap();
        let mut ids = Vec::new();
        for name in names {
            let mapping = catalog
                .add_mapping(
                    version.id,
                    MappingRule::Static { from: "a>b".into() },
                    name,
                )
                .await
                .unwrap();
            ids.push(mapping.id);
        }
        (version.id, ids)
    }

    #[tokio::test]
    async fn add_assigns_dense_orders_starting_at_zero() {
        let catalog = Catalog::new();
        let (version, _) = seed(&catalog, &["a", "b", "c"]).await;
        assert_eq!(
            pipeline_of(&catalog, version).await,
            vec![(0, "a".into()), (1, "b".into()), (2, "c".into())]
        );
    }

    #[tokio::test]
    async fn delete_compacts_order_numbers() {
        let catalog = Catalog::new();
        let (version, ids) = seed(&catalog, &["a", "b", "c", "d"]).await;
        // Delete order number 2 out of {0,1,2,3}.
        catalog.delete_mapping(ids[2]).await.unwrap();
        assert_eq!(
            pipeline_of(&catalog, version).await,
            vec![(0, "a".into()), (1, "b".into()), (2, "d".into())]
        );
    }

    #[tokio::test]
    async fn move_swaps_with_neighbour() {
        let catalog = Catalog::new();
        let (version, ids) = seed(&catalog, &["a", "b", "c"]).await;
        catalog
            .move_mapping(ids[2], MoveDirection::Up)
            .await
            .unwrap();
        assert_eq!(
            pipeline_of(&catalog, version).await,
            vec![(0, "a".into()), (1, "c".into()), (2, "b".into())]
        );
    }

    #[tokio::test]
    async fn move_past_either_end_is_a_no_op() {
        let catalog = Catalog::new();
        let (version, ids) = seed(&catalog, &["a", "b"]).await;
        catalog
            .move_mapping(ids[0], MoveDirection::Up)
            .await
            .unwrap();
        catalog
            .move_mapping(ids[1], MoveDirection::Down)
            .await
            .unwrap();
        assert_eq!(
            pipeline_of(&catalog, version).await,
            vec![(0, "a".into()), (1, "b".into())]
        );
    }

    #[tokio::test]
    async fn unknown_mapping_is_not_found() {
        let catalog = Catalog::new();
        seed(&catalog, &["a"]).await;
        let err = catalog.delete_mapping(MappingId::generate()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
