//! A single random projection tree.
//!
//! Nodes live in a flat arena and reference each other by `u32` index, which
//! keeps the memory layout compact for forests spanning millions of nodes.
//! The node at index 0 is always the root.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::{DistanceMetric, Hyperplane};
use crate::store::StoreInner;

/// How many random pivot pairs are tried before falling back to a forced
/// median split.
const MAX_PIVOT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TreeNode {
    Split {
        hyperplane: Hyperplane,
        left: u32,
        right: u32,
    },
    Leaf {
        slots: Vec<u32>,
    },
}

/// A binary space-partitioning tree over store slots.
///
/// The tree holds no vector data of its own; leaves reference rows of the
/// shared store by slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RpTree {
    pub(crate) nodes: Vec<TreeNode>,
}

impl RpTree {
    /// Build a tree over every row of the store snapshot.
    ///
    /// Each tree gets its own seed so that trees within a forest are
    /// statistically independent.
    pub(crate) fn build(
        store: &StoreInner,
        dimension: usize,
        metric: DistanceMetric,
        leaf_capacity: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let slots: Vec<u32> = (0..store.len() as u32).collect();
        let mut nodes = Vec::new();
        build_node(
            store,
            dimension,
            metric,
            leaf_capacity.max(1),
            slots,
            &mut nodes,
            &mut rng,
        );
        RpTree { nodes }
    }

    #[cfg(test)]
    pub(crate) fn leaf_slot_sets(&self) -> Vec<Vec<u32>> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                TreeNode::Leaf { slots } => Some(slots.clone()),
                TreeNode::Split { .. } => None,
            })
            .collect()
    }
}

/// Recursively partition `slots`, returning the index of the created node.
fn build_node(
    store: &StoreInner,
    dimension: usize,
    metric: DistanceMetric,
    leaf_capacity: usize,
    slots: Vec<u32>,
    nodes: &mut Vec<TreeNode>,
    rng: &mut StdRng,
) -> u32 {
    if slots.len() <= leaf_capacity {
        let index = nodes.len() as u32;
        nodes.push(TreeNode::Leaf { slots });
        return index;
    }

    for _ in 0..MAX_PIVOT_ATTEMPTS {
        let a = slots[rng.random_range(0..slots.len())];
        let b = slots[rng.random_range(0..slots.len())];
        if a == b {
            continue;
        }
        let Some(plane) = metric.split(store.row(dimension, a), store.row(dimension, b)) else {
            continue;
        };

        let (left, right) = partition(store, dimension, &plane, &slots);
        if !acceptable_split(left.len(), right.len(), slots.len()) {
            continue;
        }
        return push_split(
            store,
            dimension,
            metric,
            leaf_capacity,
            plane,
            left,
            right,
            nodes,
            rng,
        );
    }

    // Random pivots kept producing lopsided partitions. Force a balanced
    // split at the median margin so depth stays bounded.
    match forced_split(store, dimension, metric, &slots) {
        Some((plane, left, right)) => push_split(
            store,
            dimension,
            metric,
            leaf_capacity,
            plane,
            left,
            right,
            nodes,
            rng,
        ),
        None => {
            // No hyperplane distinguishes these rows (duplicate vectors, or
            // parallel directions under the angular metric). Terminate with
            // an oversized leaf.
            let index = nodes.len() as u32;
            nodes.push(TreeNode::Leaf { slots });
            index
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn push_split(
    store: &StoreInner,
    dimension: usize,
    metric: DistanceMetric,
    leaf_capacity: usize,
    hyperplane: Hyperplane,
    left_slots: Vec<u32>,
    right_slots: Vec<u32>,
    nodes: &mut Vec<TreeNode>,
    rng: &mut StdRng,
) -> u32 {
    let index = nodes.len() as u32;
    // Children are patched in after recursion since their indices are not
    // known yet.
    nodes.push(TreeNode::Split {
        hyperplane,
        left: 0,
        right: 0,
    });
    let left = build_node(
        store,
        dimension,
        metric,
        leaf_capacity,
        left_slots,
        nodes,
        rng,
    );
    let right = build_node(
        store,
        dimension,
        metric,
        leaf_capacity,
        right_slots,
        nodes,
        rng,
    );
    if let TreeNode::Split {
        left: l, right: r, ..
    } = &mut nodes[index as usize]
    {
        *l = left;
        *r = right;
    }
    index
}

fn partition(
    store: &StoreInner,
    dimension: usize,
    plane: &Hyperplane,
    slots: &[u32],
) -> (Vec<u32>, Vec<u32>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for &slot in slots {
        if plane.margin(store.row(dimension, slot)) > 0.0 {
            left.push(slot);
        } else {
            right.push(slot);
        }
    }
    (left, right)
}

/// A random split is kept when each side holds at least 5% of the items
/// (and never less than one).
fn acceptable_split(left: usize, right: usize, total: usize) -> bool {
    let smaller = left.min(right);
    smaller >= 1 && smaller * 20 >= total
}

/// Build a guaranteed-balanced split: find any hyperplane that distinguishes
/// at least one pair of rows, rank all rows by margin, and cut at the median,
/// re-centering the stored offset on the cut. Returns `None` when every row
/// is indistinguishable under the metric.
fn forced_split(
    store: &StoreInner,
    dimension: usize,
    metric: DistanceMetric,
    slots: &[u32],
) -> Option<(Hyperplane, Vec<u32>, Vec<u32>)> {
    let mut plane = None;
    'outer: for &anchor in slots.iter().take(4) {
        for &slot in slots {
            if slot == anchor {
                continue;
            }
            if let Some(p) = metric.split(store.row(dimension, anchor), store.row(dimension, slot))
            {
                plane = Some(p);
                break 'outer;
            }
        }
    }
    let mut plane = plane?;

    let mut margins: Vec<(f32, u32)> = slots
        .iter()
        .map(|&slot| (plane.margin(store.row(dimension, slot)), slot))
        .collect();
    margins.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    let mid = margins.len() / 2;
    plane.offset += (margins[mid - 1].0 + margins[mid].0) / 2.0;

    let right = margins[..mid].iter().map(|&(_, slot)| slot).collect();
    let left = margins[mid..].iter().map(|&(_, slot)| slot).collect();
    Some((plane, left, right))
}
