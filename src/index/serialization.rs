//! On-disk encoding of B+ tree nodes and index metadata.
//!
//! Page 0 holds the metadata; node `n` lives on page `n + 1`. Keys are
//! fixed-width (the indexed column's byte length) with one trailing
//! null-flag byte, so NULL keys survive the round trip.

use crate::btree::{BPlusNode, EntryKey, IndexKey, InternalNode, LeafNode, NodeId};
use crate::file::PAGE_SIZE;
use crate::record::{AttrType, RecordId};

use super::error::{IndexError, IndexResult};

/// Magic number for index files: "BTRE" in ASCII
pub const MAGIC_NUMBER: u32 = 0x42545245;

/// Current index file version
pub const VERSION: u32 = 1;

const NONE_ID: u32 = u32::MAX;

/// Metadata stored in page 0
#[derive(Debug, Clone)]
pub struct IndexFileMetadata {
    pub order: usize,
    pub attr_type: AttrType,
    pub root_node_id: Option<NodeId>,
    pub first_leaf_id: Option<NodeId>,
    pub entry_count: usize,
    pub node_count: usize,
}

fn attr_type_tag(attr_type: &AttrType) -> u8 {
    match attr_type {
        AttrType::Int => 0,
        AttrType::Float => 1,
        AttrType::Chars(_) => 2,
        AttrType::Date => 3,
    }
}

fn attr_type_from_tag(tag: u8, len: usize) -> IndexResult<AttrType> {
    match tag {
        0 => Ok(AttrType::Int),
        1 => Ok(AttrType::Float),
        2 => Ok(AttrType::Chars(len)),
        3 => Ok(AttrType::Date),
        other => Err(IndexError::Serialization(format!(
            "unknown attribute type tag {}",
            other
        ))),
    }
}

fn opt_id_to_u32(id: Option<NodeId>) -> u32 {
    id.map(|v| v as u32).unwrap_or(NONE_ID)
}

fn u32_to_opt_id(v: u32) -> Option<NodeId> {
    (v != NONE_ID).then_some(v as NodeId)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub fn serialize_metadata(metadata: &IndexFileMetadata) -> Vec<u8> {
    let mut buf = vec![0u8; PAGE_SIZE];

    buf[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf[8..12].copy_from_slice(&(metadata.order as u32).to_le_bytes());
    buf[12] = attr_type_tag(&metadata.attr_type);
    buf[13..17].copy_from_slice(&(metadata.attr_type.len() as u32).to_le_bytes());
    buf[17..21].copy_from_slice(&opt_id_to_u32(metadata.root_node_id).to_le_bytes());
    buf[21..25].copy_from_slice(&opt_id_to_u32(metadata.first_leaf_id).to_le_bytes());
    buf[25..33].copy_from_slice(&(metadata.entry_count as u64).to_le_bytes());
    buf[33..37].copy_from_slice(&(metadata.node_count as u32).to_le_bytes());

    buf
}

pub fn deserialize_metadata(buf: &[u8]) -> IndexResult<IndexFileMetadata> {
    if buf.len() < PAGE_SIZE {
        return Err(IndexError::Serialization(
            "buffer too small for metadata".to_string(),
        ));
    }

    if read_u32(buf, 0) != MAGIC_NUMBER {
        return Err(IndexError::InvalidMagic);
    }

    let version = read_u32(buf, 4);
    if version != VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }

    let order = read_u32(buf, 8) as usize;
    let key_len = read_u32(buf, 13) as usize;
    let attr_type = attr_type_from_tag(buf[12], key_len)?;

    Ok(IndexFileMetadata {
        order,
        attr_type,
        root_node_id: u32_to_opt_id(read_u32(buf, 17)),
        first_leaf_id: u32_to_opt_id(read_u32(buf, 21)),
        entry_count: u64::from_le_bytes([
            buf[25], buf[26], buf[27], buf[28], buf[29], buf[30], buf[31], buf[32],
        ]) as usize,
        node_count: read_u32(buf, 33) as usize,
    })
}

/// Serialize one node into a full page buffer
pub fn serialize_node(node: &BPlusNode, attr_type: &AttrType) -> IndexResult<Vec<u8>> {
    let key_len = attr_type.len();
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut offset;

    match node {
        BPlusNode::Internal(internal) => {
            buf[0] = 0;
            buf[1..3].copy_from_slice(&(internal.len() as u16).to_le_bytes());
            offset = 3;

            // Internal separators carry the RID tie-break
            for entry in &internal.keys {
                offset = write_key(&mut buf, offset, &entry.key, key_len)?;
                offset = write_rid(&mut buf, offset, entry.rid)?;
            }
            for &child in &internal.children {
                buf[offset..offset + 4].copy_from_slice(&(child as u32).to_le_bytes());
                offset += 4;
            }
        }
        BPlusNode::Leaf(leaf) => {
            buf[0] = 1;
            buf[1..3].copy_from_slice(&(leaf.len() as u16).to_le_bytes());
            buf[3..7].copy_from_slice(&opt_id_to_u32(leaf.next).to_le_bytes());
            offset = 7;

            for key in &leaf.keys {
                offset = write_key(&mut buf, offset, key, key_len)?;
            }
            for &rid in &leaf.values {
                offset = write_rid(&mut buf, offset, rid)?;
            }
        }
    }

    if offset > PAGE_SIZE {
        return Err(IndexError::Serialization(format!(
            "node does not fit in a page: {} bytes",
            offset
        )));
    }

    Ok(buf)
}

fn write_key(buf: &mut [u8], offset: usize, key: &IndexKey, key_len: usize) -> IndexResult<usize> {
    let end = offset + key_len + 1;
    if end > buf.len() {
        return Err(IndexError::Serialization(
            "node does not fit in a page".to_string(),
        ));
    }
    buf[offset..offset + key_len].copy_from_slice(key.data());
    buf[offset + key_len] = key.is_null() as u8;
    Ok(end)
}

fn write_rid(buf: &mut [u8], offset: usize, rid: RecordId) -> IndexResult<usize> {
    let end = offset + 8;
    if end > buf.len() {
        return Err(IndexError::Serialization(
            "node does not fit in a page".to_string(),
        ));
    }
    buf[offset..offset + 4].copy_from_slice(&(rid.page_id as u32).to_le_bytes());
    buf[offset + 4..offset + 8].copy_from_slice(&(rid.slot_id as u32).to_le_bytes());
    Ok(end)
}

fn read_key(buf: &[u8], offset: usize, attr_type: AttrType) -> (IndexKey, usize) {
    let key_len = attr_type.len();
    let data = buf[offset..offset + key_len].to_vec();
    let null = buf[offset + key_len] != 0;
    (IndexKey::new(attr_type, data, null), offset + key_len + 1)
}

fn read_rid(buf: &[u8], offset: usize) -> (RecordId, usize) {
    let page_id = read_u32(buf, offset) as usize;
    let slot_id = read_u32(buf, offset + 4) as usize;
    (RecordId::new(page_id, slot_id), offset + 8)
}

/// Deserialize one node from a page buffer
pub fn deserialize_node(buf: &[u8], attr_type: AttrType) -> IndexResult<BPlusNode> {
    if buf.len() < PAGE_SIZE {
        return Err(IndexError::Serialization(
            "buffer too small for node".to_string(),
        ));
    }

    let count = u16::from_le_bytes([buf[1], buf[2]]) as usize;

    match buf[0] {
        0 => {
            let mut offset = 3;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                let (key, after_key) = read_key(buf, offset, attr_type);
                let (rid, after_rid) = read_rid(buf, after_key);
                keys.push(EntryKey::new(key, rid));
                offset = after_rid;
            }

            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                children.push(read_u32(buf, offset) as NodeId);
                offset += 4;
            }

            Ok(BPlusNode::Internal(InternalNode::new(keys, children)))
        }
        1 => {
            let next = u32_to_opt_id(read_u32(buf, 3));
            let mut offset = 7;

            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                let (key, next_offset) = read_key(buf, offset, attr_type);
                keys.push(key);
                offset = next_offset;
            }

            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let (rid, next_offset) = read_rid(buf, offset);
                values.push(rid);
                offset = next_offset;
            }

            let mut leaf = LeafNode::with_entries(keys, values);
            leaf.next = next;
            Ok(BPlusNode::Leaf(leaf))
        }
        other => Err(IndexError::Serialization(format!(
            "unknown node type {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn key(v: i32) -> IndexKey {
        IndexKey::from_value(&Value::Int(v), AttrType::Int)
    }

    #[test]
    fn test_metadata_round_trip() {
        let metadata = IndexFileMetadata {
            order: 400,
            attr_type: AttrType::Chars(12),
            root_node_id: Some(3),
            first_leaf_id: Some(0),
            entry_count: 123,
            node_count: 5,
        };

        let buf = serialize_metadata(&metadata);
        let restored = deserialize_metadata(&buf).unwrap();

        assert_eq!(restored.order, 400);
        assert_eq!(restored.attr_type, AttrType::Chars(12));
        assert_eq!(restored.root_node_id, Some(3));
        assert_eq!(restored.first_leaf_id, Some(0));
        assert_eq!(restored.entry_count, 123);
        assert_eq!(restored.node_count, 5);
    }

    #[test]
    fn test_metadata_none_ids() {
        let metadata = IndexFileMetadata {
            order: 8,
            attr_type: AttrType::Int,
            root_node_id: None,
            first_leaf_id: None,
            entry_count: 0,
            node_count: 0,
        };

        let restored = deserialize_metadata(&serialize_metadata(&metadata)).unwrap();
        assert_eq!(restored.root_node_id, None);
        assert_eq!(restored.first_leaf_id, None);
    }

    #[test]
    fn test_bad_magic() {
        let buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            deserialize_metadata(&buf),
            Err(IndexError::InvalidMagic)
        ));
    }

    #[test]
    fn test_leaf_round_trip() {
        let mut leaf = LeafNode::new();
        leaf.insert(key(1), RecordId::new(0, 1));
        leaf.insert(key(2), RecordId::new(0, 2));
        leaf.insert(
            IndexKey::from_value(&Value::Null, AttrType::Int),
            RecordId::new(1, 0),
        );
        leaf.next = Some(7);

        let buf = serialize_node(&BPlusNode::Leaf(leaf.clone()), &AttrType::Int).unwrap();
        let restored = deserialize_node(&buf, AttrType::Int).unwrap();

        let restored_leaf = restored.as_leaf().unwrap();
        assert_eq!(restored_leaf.keys, leaf.keys);
        assert_eq!(restored_leaf.values, leaf.values);
        assert_eq!(restored_leaf.next, Some(7));
        assert!(restored_leaf.keys[2].is_null());
    }

    #[test]
    fn test_internal_round_trip() {
        let internal = InternalNode::new(
            vec![
                EntryKey::new(key(10), RecordId::new(3, 1)),
                EntryKey::new(key(20), RecordId::new(7, 9)),
            ],
            vec![1, 2],
        );

        let buf = serialize_node(&BPlusNode::Internal(internal.clone()), &AttrType::Int).unwrap();
        let restored = deserialize_node(&buf, AttrType::Int).unwrap();

        let restored_internal = restored.as_internal().unwrap();
        assert_eq!(restored_internal.keys, internal.keys);
        assert_eq!(restored_internal.children, internal.children);
    }
}
