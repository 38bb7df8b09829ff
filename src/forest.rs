//! Forest construction.
//!
//! A forest is an ordered ensemble of independently seeded random projection
//! trees. Tree builds share nothing but read-only access to the store
//! snapshot, so they run on rayon worker threads, each filling its own slot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::store::StoreInner;
use crate::tree::RpTree;

/// Build-time parameters for a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees. More trees improve recall at the cost of build time
    /// and memory.
    #[serde(default = "default_num_trees")]
    pub num_trees: usize,

    /// Maximum number of items in a terminal node before further splitting.
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,

    /// Master seed; per-tree seeds are derived from it so that rebuilding
    /// with the same seed reproduces the forest exactly.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_num_trees() -> usize {
    10
}

fn default_leaf_capacity() -> usize {
    16
}

fn default_seed() -> u64 {
    42
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: default_num_trees(),
            leaf_capacity: default_leaf_capacity(),
            seed: default_seed(),
        }
    }
}

impl ForestParams {
    /// Clamp zero values to the smallest meaningful setting.
    fn normalized(mut self) -> Self {
        self.num_trees = self.num_trees.max(1);
        self.leaf_capacity = self.leaf_capacity.max(1);
        self
    }
}

/// An immutable ensemble of random projection trees.
///
/// Built once over a frozen store snapshot; read-only for all subsequent
/// queries and therefore safe to share across any number of reader threads.
#[derive(Debug)]
pub struct Forest {
    params: ForestParams,
    trees: Vec<RpTree>,
}

impl Forest {
    /// Build `params.num_trees` independent trees over every row of the
    /// store snapshot.
    pub(crate) fn build(
        store: &StoreInner,
        dimension: usize,
        metric: DistanceMetric,
        params: ForestParams,
    ) -> Self {
        let params = params.normalized();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.num_trees).map(|_| rng.random()).collect();

        let trees: Vec<RpTree> = seeds
            .into_par_iter()
            .map(|seed| RpTree::build(store, dimension, metric, params.leaf_capacity, seed))
            .collect();

        log::debug!(
            "built forest: {} trees over {} items (leaf_capacity={}, seed={})",
            trees.len(),
            store.len(),
            params.leaf_capacity,
            params.seed
        );

        Forest { params, trees }
    }

    /// Number of trees in the forest.
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// The normalized parameters the forest was built with.
    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub(crate) fn trees(&self) -> &[RpTree] {
        &self.trees
    }

    pub(crate) fn from_parts(params: ForestParams, trees: Vec<RpTree>) -> Self {
        Forest { params, trees }
    }
}
