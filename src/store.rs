//! In-memory vector storage.
//!
//! Vectors are held in one flat row-major slab so that tree construction and
//! candidate scoring touch contiguous memory. Item ids only exist at the API
//! boundary; internally every vector is addressed by its `u32` slot.

use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{ArborError, Result};

/// The frozen view of the store contents used by build and query paths.
#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    /// Item ids in insertion order; `ids[slot]` is the id of row `slot`.
    pub(crate) ids: Vec<u64>,
    /// Row-major vector data, `len() * dimension` floats.
    pub(crate) data: Vec<f32>,
    /// Reverse lookup from id to slot.
    pub(crate) by_id: AHashMap<u64, u32>,
}

impl StoreInner {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub(crate) fn row(&self, dimension: usize, slot: u32) -> &[f32] {
        let start = slot as usize * dimension;
        &self.data[start..start + dimension]
    }
}

/// Flat storage of all inserted vectors, keyed by item id.
///
/// The store is populated through [`add`](VectorStore::add) and conceptually
/// frozen once a forest build begins; there is no update or removal API.
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    inner: RwLock<StoreInner>,
}

impl VectorStore {
    /// Create an empty store for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// The fixed vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add a vector under a fresh id.
    ///
    /// Validation happens before any mutation, so a failed call leaves the
    /// store unchanged.
    pub fn add(&self, id: u64, vector: &[f32]) -> Result<()> {
        ensure_vector(self.dimension, vector)?;

        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&id) {
            return Err(ArborError::DuplicateId(id));
        }
        let slot = inner.ids.len() as u32;
        inner.ids.push(id);
        inner.data.extend_from_slice(vector);
        inner.by_id.insert(id, slot);
        Ok(())
    }

    /// Fetch a copy of the vector stored under `id`.
    pub fn get(&self, id: u64) -> Result<Vec<f32>> {
        let inner = self.inner.read();
        let slot = *inner.by_id.get(&id).ok_or(ArborError::NotFound(id))?;
        Ok(inner.row(self.dimension, slot).to_vec())
    }

    /// Whether an item with the given id exists.
    pub fn contains(&self, id: u64) -> bool {
        self.inner.read().by_id.contains_key(&id)
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read()
    }

    pub(crate) fn from_parts(dimension: usize, ids: Vec<u64>, data: Vec<f32>) -> Self {
        let by_id = ids
            .iter()
            .enumerate()
            .map(|(slot, &id)| (id, slot as u32))
            .collect();
        Self {
            dimension,
            inner: RwLock::new(StoreInner { ids, data, by_id }),
        }
    }
}

/// Boundary validation shared by `add` and the query entry points.
pub(crate) fn ensure_vector(dimension: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != dimension {
        return Err(ArborError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if !vector.iter().all(|x| x.is_finite()) {
        return Err(ArborError::invalid_argument(
            "vector contains non-finite values",
        ));
    }
    Ok(())
}
