//! The public ANN index facade.
//!
//! [`AnnIndex`] ties the pieces together: vectors accumulate in the store,
//! one `build` call freezes them under a forest of random projection trees,
//! and every query after that is read-only. The built forest is published
//! through an `RwLock<Option<Arc<Forest>>>` so readers either see the whole
//! forest or none of it, never a partial one.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::distance::DistanceMetric;
use crate::error::{ArborError, Result};
use crate::forest::{Forest, ForestParams};
use crate::search::{self, Neighbor};
use crate::store::{VectorStore, ensure_vector};

/// An approximate nearest-neighbor index over fixed-dimension vectors.
///
/// Lifecycle: [`add_item`](AnnIndex::add_item) any number of times, then one
/// [`build`](AnnIndex::build), then [`query`](AnnIndex::query) /
/// [`query_by_id`](AnnIndex::query_by_id) from as many threads as needed.
#[derive(Debug)]
pub struct AnnIndex {
    metric: DistanceMetric,
    store: VectorStore,
    forest: RwLock<Option<Arc<Forest>>>,
}

impl AnnIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            metric,
            store: VectorStore::new(dimension),
            forest: RwLock::new(None),
        }
    }

    /// The fixed vector dimension.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// The metric used for splits and ranking.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the index holds no items.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether `build` has completed.
    pub fn is_built(&self) -> bool {
        self.forest.read().is_some()
    }

    /// Number of trees in the built forest, or zero before `build`.
    pub fn num_trees(&self) -> usize {
        self.forest
            .read()
            .as_ref()
            .map_or(0, |forest| forest.num_trees())
    }

    /// Add a vector under a fresh item id.
    ///
    /// Fails with [`ArborError::AlreadyBuilt`] once the index is frozen, and
    /// with the store's validation errors otherwise.
    pub fn add_item(&self, id: u64, vector: &[f32]) -> Result<()> {
        if self.is_built() {
            return Err(ArborError::AlreadyBuilt);
        }
        self.store.add(id, vector)
    }

    /// Build `num_trees` trees with the given leaf capacity and the default
    /// seed. One-shot: a second call fails with
    /// [`ArborError::AlreadyBuilt`].
    pub fn build(&self, num_trees: usize, leaf_capacity: usize) -> Result<()> {
        self.build_with_params(ForestParams {
            num_trees,
            leaf_capacity,
            ..ForestParams::default()
        })
    }

    /// Build the forest with explicit parameters (including the seed).
    pub fn build_with_params(&self, params: ForestParams) -> Result<()> {
        let mut slot = self.forest.write();
        if slot.is_some() {
            return Err(ArborError::AlreadyBuilt);
        }

        let inner = self.store.read();
        if inner.len() == 0 {
            return Err(ArborError::EmptyStore);
        }

        let forest = Forest::build(&inner, self.store.dimension(), self.metric, params);
        *slot = Some(Arc::new(forest));
        Ok(())
    }

    /// Return the `k` nearest stored items to an arbitrary query vector,
    /// ordered by ascending distance.
    ///
    /// `search_k` bounds how many candidate items the traversal examines and
    /// defaults to `k * num_trees`; raising it trades latency for recall.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<Neighbor>> {
        ensure_vector(self.store.dimension(), vector)?;
        let forest = self.current_forest()?;
        let inner = self.store.read();
        Ok(search::search(
            &inner,
            self.store.dimension(),
            &forest,
            self.metric,
            vector,
            k,
            search_k,
        ))
    }

    /// Return the `k` nearest items to the stored item `id`, excluding the
    /// item itself.
    pub fn query_by_id(&self, id: u64, k: usize, search_k: Option<usize>) -> Result<Vec<Neighbor>> {
        let vector = self.store.get(id)?;
        let forest = self.current_forest()?;
        let inner = self.store.read();

        // Over-fetch by one so dropping the queried item cannot shrink the
        // result below k.
        let mut hits = search::search(
            &inner,
            self.store.dimension(),
            &forest,
            self.metric,
            &vector,
            k.saturating_add(1),
            search_k,
        );
        hits.retain(|hit| hit.id != id);
        hits.truncate(k);
        Ok(hits)
    }

    /// Fetch a copy of the vector stored under `id`.
    pub fn get_item(&self, id: u64) -> Result<Vec<f32>> {
        self.store.get(id)
    }

    /// Exact distance between two stored items under the index metric.
    pub fn get_distance(&self, i: u64, j: u64) -> Result<f32> {
        let a = self.store.get(i)?;
        let b = self.store.get(j)?;
        Ok(self.metric.distance(&a, &b))
    }

    fn current_forest(&self) -> Result<Arc<Forest>> {
        self.forest.read().clone().ok_or(ArborError::NotBuilt)
    }

    pub(crate) fn store(&self) -> &VectorStore {
        &self.store
    }

    pub(crate) fn forest_snapshot(&self) -> Option<Arc<Forest>> {
        self.forest.read().clone()
    }

    pub(crate) fn from_parts(
        metric: DistanceMetric,
        store: VectorStore,
        forest: Option<Forest>,
    ) -> Self {
        Self {
            metric,
            store,
            forest: RwLock::new(forest.map(Arc::new)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_index() -> AnnIndex {
        let index = AnnIndex::new(2, DistanceMetric::Euclidean);
        index.add_item(0, &[0.0, 0.0]).unwrap();
        index.add_item(1, &[1.0, 0.0]).unwrap();
        index.add_item(2, &[0.0, 1.0]).unwrap();
        index
    }

    #[test]
    fn add_after_build_is_rejected() {
        let index = small_index();
        index.build(2, 1).unwrap();
        let err = index.add_item(3, &[5.0, 5.0]).unwrap_err();
        assert!(matches!(err, ArborError::AlreadyBuilt));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn build_is_one_shot() {
        let index = small_index();
        index.build(2, 1).unwrap();
        let err = index.build(2, 1).unwrap_err();
        assert!(matches!(err, ArborError::AlreadyBuilt));
    }

    #[test]
    fn query_before_build_fails() {
        let index = small_index();
        let err = index.query(&[0.0, 0.0], 1, None).unwrap_err();
        assert!(matches!(err, ArborError::NotBuilt));
    }

    #[test]
    fn empty_store_cannot_be_built() {
        let index = AnnIndex::new(2, DistanceMetric::Euclidean);
        let err = index.build(2, 1).unwrap_err();
        assert!(matches!(err, ArborError::EmptyStore));
        assert!(!index.is_built());
    }

    #[test]
    fn query_dimension_is_validated() {
        let index = small_index();
        index.build(2, 1).unwrap();
        let err = index.query(&[0.0, 0.0, 0.0], 1, None).unwrap_err();
        assert!(matches!(err, ArborError::DimensionMismatch { .. }));
    }

    #[test]
    fn query_by_id_excludes_the_item_itself() {
        let index = small_index();
        index.build(5, 1).unwrap();
        let hits = index.query_by_id(0, 2, Some(3)).unwrap();
        assert!(hits.iter().all(|hit| hit.id != 0));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn query_by_id_for_missing_item_fails() {
        let index = small_index();
        index.build(2, 1).unwrap();
        let err = index.query_by_id(99, 1, None).unwrap_err();
        assert!(matches!(err, ArborError::NotFound(99)));
    }

    #[test]
    fn get_distance_matches_the_metric() {
        let index = small_index();
        let d = index.get_distance(1, 2).unwrap();
        assert!((d - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn num_trees_reflects_build_state() {
        let index = small_index();
        assert_eq!(index.num_trees(), 0);
        index.build(4, 1).unwrap();
        assert_eq!(index.num_trees(), 4);
        assert!(index.is_built());
    }
}
