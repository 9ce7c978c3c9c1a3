//! One secondary index of a table: key extraction plus the persistent tree.

use crate::btree::IndexKey;
use crate::catalog::{FieldMeta, IndexMeta};
use crate::condition::CompOp;
use crate::file::BufferManager;
use crate::record::{RecordId, Value};

use super::error::IndexResult;
use super::persistent_btree::PersistentBPlusTree;
use super::scanner::IndexScanner;

/// B+ tree index over a single typed column.
///
/// The index keeps its own copy of the column's `FieldMeta` (plus the
/// position of the null flag inside the record) so it can lift the key
/// bytes straight out of raw record payloads.
pub struct BplusTreeIndex {
    index_meta: IndexMeta,
    field_meta: FieldMeta,
    null_flag_offset: usize,
    btree: PersistentBPlusTree,
}

impl BplusTreeIndex {
    pub fn create(
        buffer_mgr: &mut BufferManager,
        path: &str,
        index_meta: IndexMeta,
        field_meta: FieldMeta,
        null_flag_offset: usize,
    ) -> IndexResult<Self> {
        let btree = PersistentBPlusTree::create(buffer_mgr, path, field_meta.attr_type)?;

        Ok(Self {
            index_meta,
            field_meta,
            null_flag_offset,
            btree,
        })
    }

    pub fn open(
        buffer_mgr: &mut BufferManager,
        path: &str,
        index_meta: IndexMeta,
        field_meta: FieldMeta,
        null_flag_offset: usize,
    ) -> IndexResult<Self> {
        let btree = PersistentBPlusTree::open(buffer_mgr, path)?;

        Ok(Self {
            index_meta,
            field_meta,
            null_flag_offset,
            btree,
        })
    }

    pub fn index_meta(&self) -> &IndexMeta {
        &self.index_meta
    }

    pub fn field_meta(&self) -> &FieldMeta {
        &self.field_meta
    }

    pub fn len(&self) -> usize {
        self.btree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.btree.is_empty()
    }

    /// Lift the index key out of a raw record payload
    pub fn key_from_record(&self, record: &[u8]) -> IndexKey {
        let offset = self.field_meta.offset;
        let data = record[offset..offset + self.field_meta.len].to_vec();
        let null = record.get(self.null_flag_offset).copied().unwrap_or(0) != 0;
        IndexKey::new(self.field_meta.attr_type, data, null)
    }

    /// Insert the entry for a record
    pub fn insert_entry(&mut self, record: &[u8], rid: RecordId) -> IndexResult<()> {
        let key = self.key_from_record(record);
        self.btree.insert(key, rid)
    }

    /// Remove the entry for a record. Err(EntryNotFound) when the pair is
    /// not present.
    pub fn delete_entry(&mut self, record: &[u8], rid: RecordId) -> IndexResult<()> {
        let key = self.key_from_record(record);
        self.btree.delete_entry(&key, rid)
    }

    /// Scanner over entries satisfying `key <op> value`
    pub fn create_scanner(&self, op: CompOp, value: &Value) -> IndexScanner<'_> {
        let bound = IndexKey::from_value(value, self.field_meta.attr_type);
        IndexScanner::new(self.btree.tree(), op, bound)
    }

    /// Flush the index pages and sync the file
    pub fn sync(&mut self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        self.btree.flush(buffer_mgr)
    }

    /// Flush and close the index file
    pub fn close(self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        self.btree.close(buffer_mgr)
    }
}
