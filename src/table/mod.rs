//! The table coordinator: schema enforcement, record materialisation,
//! index maintenance and transaction hooks.

mod error;

pub use error::{TableError, TableResult};

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::catalog::{
    ColumnSpec, FieldMeta, IndexMeta, TableMeta, index_data_file, table_data_file, table_meta_file,
};
use crate::condition::{CompOp, CompositeConditionFilter, CondSide, ConditionFilter,
    DefaultConditionFilter};
use crate::file::BufferManager;
use crate::parser::ast::{Condition, Operand};
use crate::record::{Record, RecordFileHandler, RecordId, Value};
use crate::trx::{Trx, is_visible_to};

/// A membership test that cannot be expressed as a binary condition
/// filter; checked per row after the filter passes.
pub struct InCheck {
    field_name: String,
    values: Vec<Value>,
}

pub struct Table {
    base_dir: PathBuf,
    meta: TableMeta,
    buffer_manager: Arc<Mutex<BufferManager>>,
    record_file: RecordFileHandler,
    indexes: Vec<crate::index::BplusTreeIndex>,
}

impl Table {
    /// Create the table: exclusive metadata file first (so a concurrent
    /// creation loses cleanly), then the heap file.
    pub fn create(
        buffer_manager: Arc<Mutex<BufferManager>>,
        base_dir: &Path,
        name: &str,
        columns: &[ColumnSpec],
    ) -> TableResult<Self> {
        if name.trim().is_empty() {
            return Err(TableError::InvalidArgument("table name is empty".into()));
        }
        if columns.is_empty() {
            return Err(TableError::InvalidArgument(format!(
                "table {} declared without columns",
                name
            )));
        }
        info!(table = name, "creating table");

        let meta = TableMeta::new(name, columns);
        let meta_path = table_meta_file(base_dir, name);

        fs::create_dir_all(base_dir)?;
        let mut meta_file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&meta_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TableError::SchemaTableExist(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let blob = serde_json::to_string_pretty(&meta)
            .map_err(|e| TableError::Generic(format!("cannot serialize table meta: {}", e)))?;
        meta_file.write_all(blob.as_bytes())?;

        let data_path = table_data_file(base_dir, name);
        let record_file = {
            let mut bm = buffer_manager.lock().unwrap();
            RecordFileHandler::create(
                &mut bm,
                data_path.to_str().unwrap_or_default(),
                meta.stored_size(),
            )?
        };

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            meta,
            buffer_manager,
            record_file,
            indexes: Vec::new(),
        })
    }

    /// Open an existing table: metadata, heap, then every index listed in
    /// the metadata.
    pub fn open(
        buffer_manager: Arc<Mutex<BufferManager>>,
        base_dir: &Path,
        name: &str,
    ) -> TableResult<Self> {
        let meta_path = table_meta_file(base_dir, name);
        let meta = TableMeta::load(&meta_path)?;

        let data_path = table_data_file(base_dir, name);
        let record_file = {
            let mut bm = buffer_manager.lock().unwrap();
            RecordFileHandler::open(
                &mut bm,
                data_path.to_str().unwrap_or_default(),
                meta.stored_size(),
            )?
        };

        let mut indexes = Vec::with_capacity(meta.indexes.len());
        for index_meta in &meta.indexes {
            let (field, user_idx) = match (
                meta.field(&index_meta.field),
                meta.user_field_index(&index_meta.field),
            ) {
                (Some(f), Some(i)) => (f.clone(), i),
                _ => {
                    error!(
                        table = name,
                        index = %index_meta.name,
                        field = %index_meta.field,
                        "index meta references a field that does not exist"
                    );
                    return Err(TableError::Generic(format!(
                        "index {} references unknown field {}",
                        index_meta.name, index_meta.field
                    )));
                }
            };

            let index_path = index_data_file(base_dir, name, &index_meta.name);
            let mut bm = buffer_manager.lock().unwrap();
            let index = crate::index::BplusTreeIndex::open(
                &mut bm,
                index_path.to_str().unwrap_or_default(),
                index_meta.clone(),
                field,
                meta.null_flag_offset(user_idx),
            )?;
            indexes.push(index);
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            meta,
            buffer_manager,
            record_file,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    // ========== Legality and record materialisation ==========

    /// Per-column legality: nullability, type match, CHARS length
    fn is_legal(value: &Value, field: &FieldMeta) -> TableResult<()> {
        if value.is_null() {
            if !field.nullable {
                return Err(TableError::SchemaFieldNameIllegal(field.name.clone()));
            }
            return Ok(());
        }

        if !value.matches_type(&field.attr_type) {
            return Err(TableError::SchemaFieldTypeMismatch(field.name.clone()));
        }

        if let (Value::Chars(s), crate::record::AttrType::Chars(max_len)) =
            (value, &field.attr_type)
            && s.len() > *max_len
        {
            // Length overflow reports the same code the original used
            return Err(TableError::SchemaFieldMissing(field.name.clone()));
        }

        Ok(())
    }

    /// Build the stored byte image of a row: zeroed system header, field
    /// payloads at their offsets, one null-flag byte per user field.
    pub fn make_record(&self, values: &[Value]) -> TableResult<Vec<u8>> {
        if values.len() != self.meta.user_field_num() {
            return Err(TableError::SchemaFieldMissing(format!(
                "expected {} values, got {}",
                self.meta.user_field_num(),
                values.len()
            )));
        }

        for (value, field) in values.iter().zip(self.meta.user_fields()) {
            Self::is_legal(value, field)?;
        }

        let mut data = vec![0u8; self.meta.stored_size()];
        for (i, (value, field)) in values.iter().zip(self.meta.user_fields()).enumerate() {
            let bytes = value.serialize(&field.attr_type)?;
            data[field.offset..field.offset + field.len].copy_from_slice(&bytes);
            data[self.meta.null_flag_offset(i)] = value.is_null() as u8;
        }

        Ok(data)
    }

    /// Decode the user column values of a record
    pub fn read_values(&self, data: &[u8]) -> Vec<Value> {
        self.meta
            .user_fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let is_null = data
                    .get(self.meta.null_flag_offset(i))
                    .copied()
                    .unwrap_or(0)
                    != 0;
                data.get(field.offset..field.offset + field.len)
                    .and_then(|bytes| Value::deserialize(bytes, &field.attr_type, is_null).ok())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    /// Decode one user column of a record
    pub fn field_value(&self, data: &[u8], field_name: &str) -> TableResult<Value> {
        let user_idx = self
            .meta
            .user_field_index(field_name)
            .ok_or_else(|| TableError::SchemaFieldNotExist(field_name.to_string()))?;
        let field = &self.meta.user_fields()[user_idx];

        let is_null = data
            .get(self.meta.null_flag_offset(user_idx))
            .copied()
            .unwrap_or(0)
            != 0;
        Ok(data
            .get(field.offset..field.offset + field.len)
            .and_then(|bytes| Value::deserialize(bytes, &field.attr_type, is_null).ok())
            .unwrap_or(Value::Null))
    }

    // ========== Condition handling ==========

    /// UPDATE and DELETE reject conditions qualified with another table
    pub fn validate_condition_tables(&self, conditions: &[Condition]) -> TableResult<()> {
        for condition in conditions {
            for col in condition.column_refs() {
                if let Some(table) = &col.table
                    && table != self.name()
                {
                    return Err(TableError::SchemaTableNameIllegal(table.clone()));
                }
            }
        }
        Ok(())
    }

    fn cond_side_for_column(&self, col: &crate::parser::ast::ColumnRef) -> TableResult<CondSide> {
        CondSide::attr(&self.meta, &col.column)
            .ok_or_else(|| TableError::SchemaFieldNotExist(col.column.clone()))
    }

    fn operand_to_side(&self, operand: &Operand) -> TableResult<CondSide> {
        match operand {
            Operand::Literal(lit) => Ok(CondSide::Value(lit.to_value())),
            Operand::Column(col) => self.cond_side_for_column(col),
        }
    }

    /// Lower AST conditions to a byte-level filter plus the IN checks that
    /// a binary filter cannot express
    pub fn build_filter(
        &self,
        conditions: &[Condition],
    ) -> TableResult<(Option<ConditionFilter>, Vec<InCheck>)> {
        let mut filters = Vec::new();
        let mut in_checks = Vec::new();

        for condition in conditions {
            match condition {
                Condition::Compare(left, op, right) => {
                    filters.push(DefaultConditionFilter::new(
                        self.operand_to_side(left)?,
                        *op,
                        self.operand_to_side(right)?,
                    ));
                }
                Condition::IsNull(col) => {
                    filters.push(DefaultConditionFilter::new(
                        self.cond_side_for_column(col)?,
                        CompOp::IsNull,
                        CondSide::Value(Value::Null),
                    ));
                }
                Condition::IsNotNull(col) => {
                    filters.push(DefaultConditionFilter::new(
                        self.cond_side_for_column(col)?,
                        CompOp::IsNotNull,
                        CondSide::Value(Value::Null),
                    ));
                }
                Condition::In(col, literals) => {
                    // Field existence is still checked eagerly
                    self.cond_side_for_column(col)?;
                    in_checks.push(InCheck {
                        field_name: col.column.clone(),
                        values: literals.iter().map(|l| l.to_value()).collect(),
                    });
                }
            }
        }

        let filter = if filters.is_empty() {
            None
        } else {
            Some(ConditionFilter::Composite(CompositeConditionFilter::new(
                filters,
            )))
        };
        Ok((filter, in_checks))
    }

    /// Row-level IN evaluation: NULL on either side never matches
    pub fn record_matches_in(&self, data: &[u8], in_checks: &[InCheck]) -> bool {
        in_checks.iter().all(|check| {
            let value = match self.field_value(data, &check.field_name) {
                Ok(v) => v,
                Err(_) => return false,
            };
            check
                .values
                .iter()
                .any(|candidate| value.compare(candidate) == Some(std::cmp::Ordering::Equal))
        })
    }

    // ========== Insert ==========

    /// Insert a row: heap first, then every index, with compensation when
    /// an index insert fails midway.
    pub fn insert_record(&mut self, trx: &mut Trx, values: &[Value]) -> TableResult<RecordId> {
        let mut data = self.make_record(values)?;
        trx.init_trx_info(&mut data);

        let rid = {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.insert_record(&mut bm, &data)?
        };
        trx.log_insert(&self.meta.name, rid);

        for i in 0..self.indexes.len() {
            if let Err(e) = self.indexes[i].insert_entry(&data, rid) {
                warn!(
                    table = %self.meta.name,
                    index = %self.indexes[i].index_meta().name,
                    rid = %rid,
                    "index insert failed, compensating"
                );
                for prev in &mut self.indexes[..i] {
                    if let Err(e2) = prev.delete_entry(&data, rid) {
                        error!(
                            table = %self.meta.name,
                            index = %prev.index_meta().name,
                            error = %e2,
                            "compensation_failed: cannot remove index entry after failed insert"
                        );
                    }
                }
                let mut bm = self.buffer_manager.lock().unwrap();
                if let Err(e2) = self.record_file.delete_record(&mut bm, rid) {
                    error!(
                        table = %self.meta.name,
                        rid = %rid,
                        error = %e2,
                        "compensation_failed: cannot remove heap record after failed insert"
                    );
                }
                trx.pop_last_op();
                return Err(e.into());
            }
        }

        Ok(rid)
    }

    // ========== Scan ==========

    /// Scan records matching `filter`, applying transaction visibility,
    /// stopping after `limit` matches. Chooses an index scan when some
    /// conjunct binds an indexed column to a constant.
    pub fn scan_record(
        &mut self,
        trx: Option<&Trx>,
        filter: Option<&ConditionFilter>,
        limit: Option<usize>,
        mut callback: impl FnMut(&Record) -> TableResult<()>,
    ) -> TableResult<usize> {
        if limit == Some(0) {
            return Ok(0);
        }
        let trx_id = trx.map(|t| t.trx_id());

        if let Some((index_pos, op, value)) = self.find_index_for_scan(filter) {
            let rids = self.indexes[index_pos].create_scanner(op, &value).collect_rids();

            let mut count = 0;
            for rid in rids {
                let record = {
                    let mut bm = self.buffer_manager.lock().unwrap();
                    self.record_file.get_record(&mut bm, rid)?
                };

                if !is_visible_to(trx_id, &record.data) {
                    continue;
                }
                if let Some(f) = filter
                    && !f.filter(&record.data)
                {
                    continue;
                }

                callback(&record)?;
                count += 1;
                if Some(count) == limit {
                    break;
                }
            }
            return Ok(count);
        }

        let mut count = 0;
        let scanner = self.record_file.open_scan(Arc::clone(&self.buffer_manager));
        for record in scanner {
            let record = record?;

            if !is_visible_to(trx_id, &record.data) {
                continue;
            }
            if let Some(f) = filter
                && !f.filter(&record.data)
            {
                continue;
            }

            callback(&record)?;
            count += 1;
            if Some(count) == limit {
                break;
            }
        }

        Ok(count)
    }

    /// Pick an index scan when a conjunct binds an indexed column to a
    /// constant with a supported operator
    fn find_index_for_scan(
        &self,
        filter: Option<&ConditionFilter>,
    ) -> Option<(usize, CompOp, Value)> {
        let filter = filter?;

        for simple in filter.simple_filters() {
            let (attr_offset, op, value) = match (simple.left(), simple.op(), simple.right()) {
                (_, CompOp::IsNull | CompOp::IsNotNull, _) => continue,
                (CondSide::Attr { offset, .. }, op, CondSide::Value(v)) => (*offset, op, v),
                (CondSide::Value(v), op, CondSide::Attr { offset, .. }) => {
                    (*offset, op.flipped(), v)
                }
                _ => continue,
            };

            let Some(field) = self
                .meta
                .fields()
                .iter()
                .find(|f| f.visible && f.offset == attr_offset)
            else {
                continue;
            };

            if let Some(pos) = self
                .indexes
                .iter()
                .position(|ix| ix.field_meta().name == field.name)
            {
                return Some((pos, op, value.clone()));
            }
        }

        None
    }

    // ========== Update ==========

    /// Update one column of every record matching the conditions. Each
    /// change is journaled through the transaction so rollback restores the
    /// old payload and index entries.
    pub fn update_record(
        &mut self,
        trx: &mut Trx,
        attr: &str,
        value: &Value,
        conditions: &[Condition],
    ) -> TableResult<usize> {
        self.validate_condition_tables(conditions)?;

        let user_idx = self
            .meta
            .user_field_index(attr)
            .ok_or_else(|| TableError::SchemaFieldNotExist(attr.to_string()))?;
        let field = self.meta.user_fields()[user_idx].clone();
        Self::is_legal(value, &field)?;

        let (filter, in_checks) = self.build_filter(conditions)?;

        let mut matches: Vec<Record> = Vec::new();
        self.scan_record(Some(trx), filter.as_ref(), None, |record| {
            matches.push(record.clone());
            Ok(())
        })?;

        let mut updated = 0;
        for record in matches {
            if !self.record_matches_in(&record.data, &in_checks) {
                continue;
            }
            self.update_one(trx, &record, &field, user_idx, value)?;
            updated += 1;
        }

        Ok(updated)
    }

    fn update_one(
        &mut self,
        trx: &mut Trx,
        record: &Record,
        field: &FieldMeta,
        user_idx: usize,
        value: &Value,
    ) -> TableResult<()> {
        let rid = record.rid;
        let old_data = record.data.clone();

        let mut new_data = old_data.clone();
        let bytes = value.serialize(&field.attr_type)?;
        new_data[field.offset..field.offset + field.len].copy_from_slice(&bytes);
        new_data[self.meta.null_flag_offset(user_idx)] = value.is_null() as u8;
        trx.init_trx_info(&mut new_data);

        // Only the index over the updated column needs maintenance
        let index_pos = self
            .indexes
            .iter()
            .position(|ix| ix.field_meta().name == field.name);

        if let Some(pos) = index_pos {
            self.indexes[pos].delete_entry(&old_data, rid)?;
        }

        let written = {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.update_record(&mut bm, rid, &new_data)
        };
        if let Err(e) = written {
            if let Some(pos) = index_pos
                && self.indexes[pos].insert_entry(&old_data, rid).is_err()
            {
                error!(
                    table = %self.meta.name,
                    rid = %rid,
                    "compensation_failed: cannot restore index entry after failed update"
                );
            }
            return Err(e.into());
        }

        if let Some(pos) = index_pos
            && let Err(e) = self.indexes[pos].insert_entry(&new_data, rid)
        {
            // Put the old payload and entry back
            let restore = {
                let mut bm = self.buffer_manager.lock().unwrap();
                self.record_file.update_record(&mut bm, rid, &old_data)
            };
            let reinsert = self.indexes[pos].insert_entry(&old_data, rid);
            if restore.is_err() || reinsert.is_err() {
                error!(
                    table = %self.meta.name,
                    rid = %rid,
                    "compensation_failed: cannot restore record after failed index insert"
                );
            }
            return Err(e.into());
        }

        trx.log_update(&self.meta.name, rid, old_data, new_data);
        Ok(())
    }

    // ========== Delete ==========

    /// Stamp every matching record as pending delete. Index entries stay
    /// until commit so rollback is a header change.
    pub fn delete_record(&mut self, trx: &mut Trx, conditions: &[Condition]) -> TableResult<usize> {
        self.validate_condition_tables(conditions)?;
        let (filter, in_checks) = self.build_filter(conditions)?;

        let mut matches: Vec<Record> = Vec::new();
        self.scan_record(Some(trx), filter.as_ref(), None, |record| {
            matches.push(record.clone());
            Ok(())
        })?;

        let mut deleted = 0;
        for record in matches {
            if !self.record_matches_in(&record.data, &in_checks) {
                continue;
            }

            let mut data = record.data;
            trx.stamp_delete(&mut data);
            {
                let mut bm = self.buffer_manager.lock().unwrap();
                self.record_file.update_record(&mut bm, record.rid, &data)?;
            }
            trx.log_delete(&self.meta.name, record.rid);
            deleted += 1;
        }

        Ok(deleted)
    }

    // ========== Index DDL ==========

    /// Create an index over one column and backfill it from the heap.
    /// The metadata file is replaced atomically via a `.tmp` rename.
    pub fn create_index(
        &mut self,
        trx: &Trx,
        index_name: &str,
        attr: &str,
    ) -> TableResult<()> {
        if index_name.trim().is_empty() || attr.trim().is_empty() {
            return Err(TableError::InvalidArgument(
                "index and column names must not be empty".into(),
            ));
        }

        if self.meta.index(index_name).is_some() || self.meta.find_index_by_field(attr).is_some() {
            return Err(TableError::SchemaIndexExist(index_name.to_string()));
        }

        let (field, user_idx) = match (self.meta.field(attr), self.meta.user_field_index(attr)) {
            (Some(f), Some(i)) if f.visible => (f.clone(), i),
            _ => return Err(TableError::SchemaFieldMissing(attr.to_string())),
        };

        let index_meta = IndexMeta {
            name: index_name.to_string(),
            field: attr.to_string(),
        };
        let index_path = index_data_file(&self.base_dir, &self.meta.name, index_name);
        let index_path_str = index_path.to_str().unwrap_or_default().to_string();

        let mut index = {
            let mut bm = self.buffer_manager.lock().unwrap();
            crate::index::BplusTreeIndex::create(
                &mut bm,
                &index_path_str,
                index_meta.clone(),
                field,
                self.meta.null_flag_offset(user_idx),
            )?
        };

        // Backfill from every record visible to the creating transaction
        let backfill = self.scan_record(Some(trx), None, None, |record| {
            index.insert_entry(&record.data, record.rid).map_err(Into::into)
        });
        if let Err(e) = backfill {
            let _ = fs::remove_file(&index_path);
            error!(
                table = %self.meta.name,
                index = index_name,
                error = %e,
                "failed to backfill index, removed its file"
            );
            return Err(e);
        }

        let mut new_meta = self.meta.clone();
        new_meta.add_index(index_meta);
        self.swap_meta(new_meta)?;

        {
            let mut bm = self.buffer_manager.lock().unwrap();
            index.sync(&mut bm)?;
        }
        self.indexes.push(index);

        info!(table = %self.meta.name, index = index_name, "index created");
        Ok(())
    }

    /// Drop one index: metadata entry, open handle, file
    pub fn drop_index(&mut self, index_name: &str) -> TableResult<()> {
        if self.meta.index(index_name).is_none() {
            return Err(TableError::Index(crate::index::IndexError::IndexNotFound(
                index_name.to_string(),
            )));
        }

        let mut new_meta = self.meta.clone();
        new_meta.remove_index(index_name);
        self.swap_meta(new_meta)?;

        if let Some(pos) = self
            .indexes
            .iter()
            .position(|ix| ix.index_meta().name == index_name)
        {
            let index = self.indexes.remove(pos);
            let mut bm = self.buffer_manager.lock().unwrap();
            index.close(&mut bm)?;
        }

        let index_path = index_data_file(&self.base_dir, &self.meta.name, index_name);
        fs::remove_file(index_path)?;
        Ok(())
    }

    /// Write new metadata next to the live file, then rename over it
    fn swap_meta(&mut self, new_meta: TableMeta) -> TableResult<()> {
        let meta_path = table_meta_file(&self.base_dir, &self.meta.name);
        let tmp_path = meta_path.with_extension("table.tmp");

        new_meta.save(&tmp_path)?;
        fs::rename(&tmp_path, &meta_path)?;

        self.meta = new_meta;
        Ok(())
    }

    // ========== Transaction hooks ==========

    /// Commit an insert: clear the record's ownership
    pub fn commit_insert(&mut self, rid: RecordId) -> TableResult<()> {
        let mut bm = self.buffer_manager.lock().unwrap();
        let mut record = self.record_file.get_record(&mut bm, rid)?;
        crate::trx::write_trx_header(&mut record.data, 0, false);
        self.record_file.update_record(&mut bm, rid, &record.data)?;
        Ok(())
    }

    /// Roll back an insert: remove its index entries, then the record
    pub fn rollback_insert(&mut self, rid: RecordId) -> TableResult<()> {
        let record = {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.get_record(&mut bm, rid)?
        };

        self.delete_entry_of_indexes(&record.data, rid, false)?;

        let mut bm = self.buffer_manager.lock().unwrap();
        self.record_file.delete_record(&mut bm, rid)?;
        Ok(())
    }

    /// Commit a delete: remove index entries, then the heap record
    pub fn commit_delete(&mut self, rid: RecordId) -> TableResult<()> {
        let record = {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.get_record(&mut bm, rid)?
        };

        if let Err(e) = self.delete_entry_of_indexes(&record.data, rid, false) {
            error!(
                table = %self.meta.name,
                rid = %rid,
                error = %e,
                "compensation_failed: cannot remove index entries while committing delete"
            );
        }

        let mut bm = self.buffer_manager.lock().unwrap();
        self.record_file.delete_record(&mut bm, rid)?;
        Ok(())
    }

    /// Roll back a delete: clear the pending-delete header in place
    pub fn rollback_delete(&mut self, rid: RecordId) -> TableResult<()> {
        let mut bm = self.buffer_manager.lock().unwrap();
        let mut record = self.record_file.get_record(&mut bm, rid)?;
        crate::trx::write_trx_header(&mut record.data, 0, false);
        self.record_file.update_record(&mut bm, rid, &record.data)?;
        Ok(())
    }

    /// Commit an update: the payload is already in place, clear ownership
    pub fn commit_update(&mut self, rid: RecordId) -> TableResult<()> {
        self.commit_insert(rid)
    }

    /// Roll back an update: restore the old payload and index entries
    pub fn rollback_update(&mut self, rid: RecordId, old_data: &[u8]) -> TableResult<()> {
        let current = {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.get_record(&mut bm, rid)?
        };

        self.delete_entry_of_indexes(&current.data, rid, true)?;

        {
            let mut bm = self.buffer_manager.lock().unwrap();
            self.record_file.update_record(&mut bm, rid, old_data)?;
        }

        self.insert_entry_of_indexes(old_data, rid)?;
        Ok(())
    }

    fn insert_entry_of_indexes(&mut self, data: &[u8], rid: RecordId) -> TableResult<()> {
        for index in &mut self.indexes {
            index.insert_entry(data, rid)?;
        }
        Ok(())
    }

    fn delete_entry_of_indexes(
        &mut self,
        data: &[u8],
        rid: RecordId,
        ignore_missing: bool,
    ) -> TableResult<()> {
        for index in &mut self.indexes {
            match index.delete_entry(data, rid) {
                Ok(()) => {}
                Err(crate::index::IndexError::EntryNotFound) if ignore_missing => {}
                Err(crate::index::IndexError::EntryNotFound) => {
                    return Err(TableError::RecordInvalidKey);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    // ========== Maintenance ==========

    /// Flush the heap and every index to disk
    pub fn sync(&mut self) -> TableResult<()> {
        let mut bm = self.buffer_manager.lock().unwrap();
        bm.flush_file(self.record_file.file_handle())?;

        for index in &mut self.indexes {
            index.sync(&mut bm)?;
        }

        info!(table = %self.meta.name, "sync complete");
        Ok(())
    }

    /// Close the table and remove every file belonging to it
    pub fn destroy(mut self) -> TableResult<()> {
        let name = self.meta.name.clone();
        let index_names: Vec<String> =
            self.meta.indexes.iter().map(|i| i.name.clone()).collect();

        {
            let mut bm = self.buffer_manager.lock().unwrap();
            for index in self.indexes.drain(..) {
                index.close(&mut bm)?;
            }

            bm.close_file(self.record_file.file_handle())?;
        }

        fs::remove_file(table_data_file(&self.base_dir, &name))?;
        fs::remove_file(table_meta_file(&self.base_dir, &name))?;
        for index_name in index_names {
            let _ = fs::remove_file(index_data_file(&self.base_dir, &name, &index_name));
        }

        info!(table = %name, "table dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
