//! Serialized index layout.
//!
//! The codec writes the persisted-state layout to any `std::io::Write` and
//! reads it back from any `std::io::Read`; wrapping it in files, mmaps or
//! blobs is the caller's concern. All integers and floats are little-endian.
//!
//! Layout: magic `RPFI`, format version, dimension, metric tag, built flag,
//! the id→vector table, and (when built) the forest parameters followed by
//! every tree's node list.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::distance::{DistanceMetric, Hyperplane};
use crate::error::{ArborError, Result};
use crate::forest::{Forest, ForestParams};
use crate::index::AnnIndex;
use crate::store::VectorStore;
use crate::tree::{RpTree, TreeNode};

const MAGIC: u32 = 0x5250_4649; // "RPFI"
const FORMAT_VERSION: u32 = 1;

const NODE_TAG_LEAF: u8 = 0;
const NODE_TAG_SPLIT: u8 = 1;

const METRIC_TAG_EUCLIDEAN: u8 = 0;
const METRIC_TAG_ANGULAR: u8 = 1;

/// Serialize an index, built or not, to a writer.
pub fn write_index<W: Write>(index: &AnnIndex, writer: &mut W) -> Result<()> {
    let dimension = index.dimension();
    let inner = index.store().read();
    let forest = index.forest_snapshot();

    writer.write_u32::<LittleEndian>(MAGIC)?;
    writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    writer.write_u32::<LittleEndian>(dimension as u32)?;
    writer.write_u8(metric_tag(index.metric()))?;
    writer.write_u8(u8::from(forest.is_some()))?;

    writer.write_u64::<LittleEndian>(inner.len() as u64)?;
    for &id in &inner.ids {
        writer.write_u64::<LittleEndian>(id)?;
    }
    for &value in &inner.data {
        writer.write_f32::<LittleEndian>(value)?;
    }

    if let Some(forest) = forest {
        let params = forest.params();
        writer.write_u32::<LittleEndian>(params.num_trees as u32)?;
        writer.write_u32::<LittleEndian>(params.leaf_capacity as u32)?;
        writer.write_u64::<LittleEndian>(params.seed)?;

        writer.write_u32::<LittleEndian>(forest.trees().len() as u32)?;
        for tree in forest.trees() {
            write_tree(tree, writer)?;
        }
    }

    Ok(())
}

/// Deserialize an index previously written by [`write_index`].
///
/// A built index comes back queryable; an unbuilt one keeps accepting adds.
pub fn read_index<R: Read>(reader: &mut R) -> Result<AnnIndex> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != MAGIC {
        return Err(ArborError::invalid_format(format!(
            "bad magic {magic:#010x}"
        )));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(ArborError::invalid_format(format!(
            "unsupported format version {version}"
        )));
    }

    let dimension = reader.read_u32::<LittleEndian>()? as usize;
    let metric = metric_from_tag(reader.read_u8()?)?;
    let built = match reader.read_u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(ArborError::invalid_format(format!(
                "bad built flag {other}"
            )));
        }
    };

    let count = reader.read_u64::<LittleEndian>()? as usize;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(reader.read_u64::<LittleEndian>()?);
    }
    let mut data = Vec::with_capacity(count * dimension);
    for _ in 0..count * dimension {
        data.push(reader.read_f32::<LittleEndian>()?);
    }
    let store = VectorStore::from_parts(dimension, ids, data);

    let forest = if built {
        let params = ForestParams {
            num_trees: reader.read_u32::<LittleEndian>()? as usize,
            leaf_capacity: reader.read_u32::<LittleEndian>()? as usize,
            seed: reader.read_u64::<LittleEndian>()?,
        };
        let tree_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut trees = Vec::with_capacity(tree_count);
        for _ in 0..tree_count {
            trees.push(read_tree(reader, dimension, count)?);
        }
        Some(Forest::from_parts(params, trees))
    } else {
        None
    };

    Ok(AnnIndex::from_parts(metric, store, forest))
}

fn write_tree<W: Write>(tree: &RpTree, writer: &mut W) -> Result<()> {
    writer.write_u32::<LittleEndian>(tree.nodes.len() as u32)?;
    for node in &tree.nodes {
        match node {
            TreeNode::Leaf { slots } => {
                writer.write_u8(NODE_TAG_LEAF)?;
                writer.write_u32::<LittleEndian>(slots.len() as u32)?;
                for &slot in slots {
                    writer.write_u32::<LittleEndian>(slot)?;
                }
            }
            TreeNode::Split {
                hyperplane,
                left,
                right,
            } => {
                writer.write_u8(NODE_TAG_SPLIT)?;
                for &value in &hyperplane.normal {
                    writer.write_f32::<LittleEndian>(value)?;
                }
                writer.write_f32::<LittleEndian>(hyperplane.offset)?;
                writer.write_u32::<LittleEndian>(*left)?;
                writer.write_u32::<LittleEndian>(*right)?;
            }
        }
    }
    Ok(())
}

fn read_tree<R: Read>(reader: &mut R, dimension: usize, item_count: usize) -> Result<RpTree> {
    let node_count = reader.read_u32::<LittleEndian>()? as usize;
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let node = match reader.read_u8()? {
            NODE_TAG_LEAF => {
                let len = reader.read_u32::<LittleEndian>()? as usize;
                let mut slots = Vec::with_capacity(len);
                for _ in 0..len {
                    let slot = reader.read_u32::<LittleEndian>()?;
                    if slot as usize >= item_count {
                        return Err(ArborError::invalid_format(format!(
                            "leaf slot {slot} out of range"
                        )));
                    }
                    slots.push(slot);
                }
                TreeNode::Leaf { slots }
            }
            NODE_TAG_SPLIT => {
                let mut normal = Vec::with_capacity(dimension);
                for _ in 0..dimension {
                    normal.push(reader.read_f32::<LittleEndian>()?);
                }
                let offset = reader.read_f32::<LittleEndian>()?;
                let left = reader.read_u32::<LittleEndian>()?;
                let right = reader.read_u32::<LittleEndian>()?;
                if left as usize >= node_count || right as usize >= node_count {
                    return Err(ArborError::invalid_format(
                        "split child index out of range",
                    ));
                }
                TreeNode::Split {
                    hyperplane: Hyperplane { normal, offset },
                    left,
                    right,
                }
            }
            other => {
                return Err(ArborError::invalid_format(format!(
                    "unknown node tag {other}"
                )));
            }
        };
        nodes.push(node);
    }
    Ok(RpTree { nodes })
}

fn metric_tag(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Euclidean => METRIC_TAG_EUCLIDEAN,
        DistanceMetric::Angular => METRIC_TAG_ANGULAR,
    }
}

fn metric_from_tag(tag: u8) -> Result<DistanceMetric> {
    match tag {
        METRIC_TAG_EUCLIDEAN => Ok(DistanceMetric::Euclidean),
        METRIC_TAG_ANGULAR => Ok(DistanceMetric::Angular),
        other => Err(ArborError::invalid_format(format!(
            "unknown metric tag {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> AnnIndex {
        let index = AnnIndex::new(2, DistanceMetric::Euclidean);
        index.add_item(0, &[0.0, 0.0]).unwrap();
        index.add_item(1, &[1.0, 0.0]).unwrap();
        index.add_item(2, &[0.0, 1.0]).unwrap();
        index.add_item(3, &[10.0, 10.0]).unwrap();
        index
    }

    #[test]
    fn built_index_survives_a_round_trip() {
        let index = sample_index();
        index.build(5, 1).unwrap();

        let mut buffer = Vec::new();
        write_index(&index, &mut buffer).unwrap();
        let restored = read_index(&mut buffer.as_slice()).unwrap();

        assert!(restored.is_built());
        assert_eq!(restored.dimension(), 2);
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.metric(), DistanceMetric::Euclidean);

        let original = index.query(&[0.1, 0.1], 2, Some(4)).unwrap();
        let decoded = restored.query(&[0.1, 0.1], 2, Some(4)).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn unbuilt_index_still_accepts_adds_after_decoding() {
        let index = sample_index();
        let mut buffer = Vec::new();
        write_index(&index, &mut buffer).unwrap();

        let restored = read_index(&mut buffer.as_slice()).unwrap();
        assert!(!restored.is_built());
        restored.add_item(4, &[2.0, 2.0]).unwrap();
        restored.build(3, 1).unwrap();
        assert_eq!(restored.len(), 5);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buffer = Vec::new();
        write_index(&sample_index(), &mut buffer).unwrap();
        buffer[0] ^= 0xff;

        let err = read_index(&mut buffer.as_slice()).unwrap_err();
        assert!(matches!(err, ArborError::InvalidFormat(_)));
    }

    #[test]
    fn truncated_input_reports_io_error() {
        let index = sample_index();
        index.build(2, 1).unwrap();
        let mut buffer = Vec::new();
        write_index(&index, &mut buffer).unwrap();
        buffer.truncate(buffer.len() / 2);

        let err = read_index(&mut buffer.as_slice()).unwrap_err();
        assert!(matches!(err, ArborError::Io(_) | ArborError::InvalidFormat(_)));
    }
}
