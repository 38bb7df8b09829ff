//! Forest traversal and candidate ranking.
//!
//! Queries descend every tree from its root, always following the side of
//! each hyperplane the query falls on. The side not taken is remembered in a
//! priority queue keyed by how close the query is to the plane, so the most
//! promising unexplored branches across the whole forest are expanded first
//! until the candidate budget (`search_k`) is spent.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::forest::Forest;
use crate::store::StoreInner;
use crate::tree::TreeNode;

/// A single query hit: item id and exact distance under the query metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u64,
    pub distance: f32,
}

/// An unexplored branch, ranked by proximity of the query to the splitting
/// hyperplane. Roots start at `f32::INFINITY` so every tree is entered before
/// any backtracking happens.
struct BranchCandidate {
    priority: f32,
    tree: u32,
    node: u32,
}

impl PartialEq for BranchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BranchCandidate {}

impl PartialOrd for BranchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BranchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Priority first; tie-break on tree/node indices so traversal order
        // is fully deterministic.
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.tree.cmp(&other.tree))
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Collect up to `search_k` candidate rows from the forest, score them with
/// the exact metric, and return the `k` nearest as `(id, distance)` pairs in
/// ascending distance order (ties broken by id).
pub(crate) fn search(
    store: &StoreInner,
    dimension: usize,
    forest: &Forest,
    metric: DistanceMetric,
    query: &[f32],
    k: usize,
    search_k: Option<usize>,
) -> Vec<Neighbor> {
    let budget = search_k
        .unwrap_or_else(|| k.saturating_mul(forest.num_trees()))
        .max(k);

    let trees = forest.trees();
    let mut heap: BinaryHeap<BranchCandidate> = BinaryHeap::with_capacity(trees.len() * 2);
    for tree in 0..trees.len() as u32 {
        heap.push(BranchCandidate {
            priority: f32::INFINITY,
            tree,
            node: 0,
        });
    }

    // A budget beyond the store size is effectively exhaustive.
    let reachable = budget.min(store.len());
    let mut seen: AHashSet<u32> = AHashSet::with_capacity(reachable);
    let mut candidates: Vec<u32> = Vec::with_capacity(reachable);

    while candidates.len() < budget {
        let Some(branch) = heap.pop() else { break };
        let nodes = &trees[branch.tree as usize].nodes;
        let mut current = branch.node;

        // Greedy descent to a leaf; far sides go back on the heap.
        loop {
            match &nodes[current as usize] {
                TreeNode::Leaf { slots } => {
                    for &slot in slots {
                        if seen.insert(slot) {
                            candidates.push(slot);
                        }
                    }
                    break;
                }
                TreeNode::Split {
                    hyperplane,
                    left,
                    right,
                } => {
                    let margin = hyperplane.margin(query);
                    let (near, far) = if margin > 0.0 {
                        (*left, *right)
                    } else {
                        (*right, *left)
                    };
                    heap.push(BranchCandidate {
                        priority: -margin.abs(),
                        tree: branch.tree,
                        node: far,
                    });
                    current = near;
                }
            }
        }
    }

    let mut scored: Vec<Neighbor> = candidates
        .into_iter()
        .map(|slot| Neighbor {
            id: store.ids[slot as usize],
            distance: metric.distance(query, store.row(dimension, slot)),
        })
        .collect();

    // Partial selection before the final sort; k is typically much smaller
    // than the candidate set.
    if k < scored.len() {
        scored.select_nth_unstable_by(k, compare_neighbors);
        scored.truncate(k);
    }
    scored.sort_unstable_by(compare_neighbors);
    scored
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .partial_cmp(&b.distance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParams;
    use crate::store::VectorStore;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn built_forest(store: &VectorStore, metric: DistanceMetric) -> Forest {
        let inner = store.read();
        Forest::build(
            &inner,
            store.dimension(),
            metric,
            ForestParams {
                num_trees: 5,
                leaf_capacity: 1,
                seed: 42,
            },
        )
    }

    #[test]
    fn exhaustive_budget_matches_brute_force() {
        let store = VectorStore::new(2);
        let points = [
            (0u64, [0.0f32, 0.0]),
            (1, [1.0, 0.0]),
            (2, [0.0, 1.0]),
            (3, [10.0, 10.0]),
        ];
        for (id, vector) in &points {
            store.add(*id, vector).unwrap();
        }
        let metric = DistanceMetric::Euclidean;
        let forest = built_forest(&store, metric);

        let inner = store.read();
        let query = [0.1f32, 0.1];
        let hits = search(&inner, 2, &forest, metric, &query, 4, Some(4));

        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[3].id, 3);
        // Distances are exact.
        assert!((hits[0].distance - (0.02f32).sqrt()).abs() < 1e-6);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn result_length_is_bounded_by_k_and_store_size() {
        let store = VectorStore::new(2);
        store.add(0, &[0.0, 0.0]).unwrap();
        store.add(1, &[1.0, 1.0]).unwrap();
        let metric = DistanceMetric::Euclidean;
        let forest = built_forest(&store, metric);
        let inner = store.read();

        let hits = search(&inner, 2, &forest, metric, &[0.0, 0.0], 10, None);
        assert_eq!(hits.len(), 2);

        let hits = search(&inner, 2, &forest, metric, &[0.0, 0.0], 1, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 0);

        let hits = search(&inner, 2, &forest, metric, &[0.0, 0.0], 0, None);
        assert!(hits.is_empty());
    }

    #[test]
    fn repeated_queries_return_identical_results() {
        let mut rng = StdRng::seed_from_u64(9);
        let store = VectorStore::new(4);
        for id in 0..100 {
            let vector: Vec<f32> = (0..4).map(|_| rng.random_range(-1.0..1.0)).collect();
            store.add(id, &vector).unwrap();
        }
        let metric = DistanceMetric::Angular;
        let forest = built_forest(&store, metric);
        let inner = store.read();

        let query = [0.3f32, -0.2, 0.9, 0.1];
        let first = search(&inner, 4, &forest, metric, &query, 10, Some(30));
        let second = search(&inner, 4, &forest, metric, &query, 10, Some(30));
        assert_eq!(first, second);
    }

    #[test]
    fn branch_candidates_order_by_priority_then_indices() {
        let mut heap = BinaryHeap::new();
        heap.push(BranchCandidate {
            priority: -0.5,
            tree: 1,
            node: 3,
        });
        heap.push(BranchCandidate {
            priority: f32::INFINITY,
            tree: 0,
            node: 0,
        });
        heap.push(BranchCandidate {
            priority: -0.1,
            tree: 2,
            node: 8,
        });

        let order: Vec<u32> = std::iter::from_fn(|| heap.pop().map(|b| b.tree)).collect();
        assert_eq!(order, vec![0, 2, 1]);
    }
}
