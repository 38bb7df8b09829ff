//! # Arbor
//!
//! An approximate nearest-neighbor search library built on a forest of
//! random projection trees.
//!
//! ## Features
//!
//! - Insertion-then-build lifecycle: accumulate vectors, freeze them under a
//!   forest, then query from any number of threads
//! - Euclidean and angular distance metrics
//! - Best-first traversal across all trees with a tunable `search_k` budget
//! - Deterministic builds from an explicit seed
//! - Compact byte-level serialization of the whole index
//!
//! ## Example
//!
//! ```
//! use arbor::{AnnIndex, DistanceMetric};
//!
//! let index = AnnIndex::new(2, DistanceMetric::Euclidean);
//! index.add_item(0, &[0.0, 0.0])?;
//! index.add_item(1, &[1.0, 0.0])?;
//! index.add_item(2, &[0.0, 1.0])?;
//! index.build(5, 1)?;
//!
//! let hits = index.query(&[0.1, 0.1], 2, None)?;
//! assert_eq!(hits[0].id, 0);
//! # Ok::<(), arbor::ArborError>(())
//! ```

mod codec;
mod distance;
mod error;
mod forest;
mod index;
mod search;
mod store;
mod tree;

// Re-exports for the public API
pub use codec::{read_index, write_index};
pub use distance::{DistanceMetric, Hyperplane};
pub use error::{ArborError, Result};
pub use forest::{Forest, ForestParams};
pub use index::AnnIndex;
pub use search::Neighbor;
pub use store::VectorStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
