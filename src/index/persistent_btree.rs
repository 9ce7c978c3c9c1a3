//! Disk-resident B+ tree: the in-memory core plus page-backed persistence.

use std::collections::HashSet;

use crate::btree::{BPlusNode, BPlusTree, IndexKey, NodeId};
use crate::file::{BufferManager, FileHandle, PAGE_SIZE};
use crate::record::{AttrType, RecordId};

use super::error::{IndexError, IndexResult};
use super::serialization::{
    IndexFileMetadata, deserialize_metadata, deserialize_node, serialize_metadata, serialize_node,
};

/// Pick a tree order such that any serialized node fits a page.
/// The internal entry is the widest: key bytes + null flag + RID
/// tie-break + child pointer. The 16-byte slack covers node headers.
pub fn order_for_key(attr_type: &AttrType) -> usize {
    let entry = attr_type.len() + 1 + 8 + 4;
    ((PAGE_SIZE - 16) / entry).clamp(4, crate::btree::DEFAULT_ORDER)
}

/// B+ tree backed by disk pages: page 0 is metadata, node `n` lives on
/// page `n + 1`.
pub struct PersistentBPlusTree {
    tree: BPlusTree,
    attr_type: AttrType,
    file_handle: FileHandle,
    /// Nodes that changed since the last flush
    dirty_nodes: HashSet<NodeId>,
    metadata_dirty: bool,
}

impl PersistentBPlusTree {
    /// Create a new index file with an empty tree
    pub fn create(
        buffer_mgr: &mut BufferManager,
        path: &str,
        attr_type: AttrType,
    ) -> IndexResult<Self> {
        buffer_mgr.create_file(path)?;
        let file_handle = buffer_mgr.open_file(path)?;

        let order = order_for_key(&attr_type);
        let tree = BPlusTree::new(order)?;

        let metadata = IndexFileMetadata {
            order,
            attr_type,
            root_node_id: None,
            first_leaf_id: None,
            entry_count: 0,
            node_count: 0,
        };

        let metadata_bytes = serialize_metadata(&metadata);
        let page = buffer_mgr.get_page_mut(file_handle, 0)?;
        page.copy_from_slice(&metadata_bytes);

        Ok(Self {
            tree,
            attr_type,
            file_handle,
            dirty_nodes: HashSet::new(),
            metadata_dirty: false,
        })
    }

    /// Open an existing index file, loading the whole tree into memory
    pub fn open(buffer_mgr: &mut BufferManager, path: &str) -> IndexResult<Self> {
        let file_handle = buffer_mgr.open_file(path)?;

        let metadata_bytes = buffer_mgr.get_page(file_handle, 0)?;
        let metadata = deserialize_metadata(metadata_bytes)?;

        let mut nodes: Vec<Option<BPlusNode>> = Vec::with_capacity(metadata.node_count);
        if let Some(root_id) = metadata.root_node_id {
            Self::load_tree_nodes(buffer_mgr, file_handle, metadata.attr_type, root_id, &mut nodes)?;
        }

        let tree = BPlusTree::restore(
            metadata.order,
            nodes,
            metadata.root_node_id,
            metadata.first_leaf_id,
            metadata.entry_count,
        )?;

        Ok(Self {
            tree,
            attr_type: metadata.attr_type,
            file_handle,
            dirty_nodes: HashSet::new(),
            metadata_dirty: false,
        })
    }

    fn load_tree_nodes(
        buffer_mgr: &mut BufferManager,
        file_handle: FileHandle,
        attr_type: AttrType,
        node_id: NodeId,
        nodes: &mut Vec<Option<BPlusNode>>,
    ) -> IndexResult<()> {
        while nodes.len() <= node_id {
            nodes.push(None);
        }

        let page_bytes = buffer_mgr.get_page(file_handle, node_id + 1)?;
        let node = deserialize_node(page_bytes, attr_type)?;

        if let BPlusNode::Internal(ref internal) = node {
            let children = internal.children.clone();
            nodes[node_id] = Some(node);
            for child_id in children {
                if child_id < nodes.len() && nodes[child_id].is_some() {
                    continue;
                }
                Self::load_tree_nodes(buffer_mgr, file_handle, attr_type, child_id, nodes)?;
            }
        } else {
            nodes[node_id] = Some(node);
        }

        Ok(())
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    pub fn file_handle(&self) -> FileHandle {
        self.file_handle
    }

    /// Access to the in-memory tree (for scanners)
    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn insert(&mut self, key: IndexKey, rid: RecordId) -> IndexResult<()> {
        self.tree.insert(key, rid)?;
        self.metadata_dirty = true;
        self.mark_all_nodes_dirty();
        Ok(())
    }

    /// Remove one (key, RID) entry. Err(EntryNotFound) when absent.
    pub fn delete_entry(&mut self, key: &IndexKey, rid: RecordId) -> IndexResult<()> {
        if !self.tree.delete_entry(key, rid)? {
            return Err(IndexError::EntryNotFound);
        }

        self.metadata_dirty = true;
        self.mark_all_nodes_dirty();
        Ok(())
    }

    pub fn search(&self, key: &IndexKey) -> Option<RecordId> {
        self.tree.search(key)
    }

    pub fn search_all(&self, key: &IndexKey) -> Vec<RecordId> {
        self.tree.search_all(key)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Flush metadata and every dirty node page, then sync the file
    pub fn flush(&mut self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        if self.metadata_dirty {
            let metadata = IndexFileMetadata {
                order: self.tree.order(),
                attr_type: self.attr_type,
                root_node_id: self.tree.root_node_id(),
                first_leaf_id: self.tree.first_leaf_id(),
                entry_count: self.tree.len(),
                node_count: self.tree.node_count(),
            };

            let metadata_bytes = serialize_metadata(&metadata);
            let page = buffer_mgr.get_page_mut(self.file_handle, 0)?;
            page.copy_from_slice(&metadata_bytes);
            self.metadata_dirty = false;
        }

        let dirty: Vec<NodeId> = self.dirty_nodes.drain().collect();
        for node_id in dirty {
            if let Some(node) = self.tree.get_node(node_id) {
                let node_bytes = serialize_node(node, &self.attr_type)?;
                let page = buffer_mgr.get_page_mut(self.file_handle, node_id + 1)?;
                page.copy_from_slice(&node_bytes);
            }
        }

        buffer_mgr.flush_file(self.file_handle)?;
        Ok(())
    }

    /// Flush and close the underlying file
    pub fn close(mut self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        self.flush(buffer_mgr)?;
        buffer_mgr.close_file(self.file_handle)?;
        Ok(())
    }

    // Structural operations can touch ancestors and siblings anywhere in
    // the tree, so every live node is rewritten on the next flush.
    // TODO(index): track the touched path instead once the tree reports it.
    fn mark_all_nodes_dirty(&mut self) {
        self.dirty_nodes.extend(self.tree.live_node_ids());
    }
}
