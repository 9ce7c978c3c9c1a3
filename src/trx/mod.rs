//! MVCC transactions.
//!
//! Every record starts with a 4-byte header: the owning transaction id in
//! the low 31 bits and a deleted flag in the high bit. An owner of 0 means
//! committed. Each transaction keeps an ordered operation log that commit
//! replays forward (applying physical effects) and rollback unwinds in
//! reverse.

use std::collections::HashMap;

use tracing::error;

use crate::record::RecordId;
use crate::table::{Table, TableError, TableResult};

/// High bit of the record header marks a pending delete
pub const DELETED_FLAG: u32 = 0x8000_0000;

/// Low 31 bits of the record header carry the owning transaction id
pub const TRX_ID_MASK: u32 = !DELETED_FLAG;

/// Read (owner, deleted) out of a record's header bytes
pub fn read_trx_header(record: &[u8]) -> (u32, bool) {
    let header = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    (header & TRX_ID_MASK, header & DELETED_FLAG != 0)
}

/// Write (owner, deleted) into a record's header bytes
pub fn write_trx_header(record: &mut [u8], owner: u32, deleted: bool) {
    let mut header = owner & TRX_ID_MASK;
    if deleted {
        header |= DELETED_FLAG;
    }
    record[0..4].copy_from_slice(&header.to_le_bytes());
}

/// Visibility rule shared by transactional and bare scans: a record is
/// visible iff it is not deleted and owned by nobody (committed) or by the
/// observing transaction itself.
pub fn is_visible_to(trx_id: Option<u32>, record: &[u8]) -> bool {
    let (owner, deleted) = read_trx_header(record);
    !deleted && (owner == 0 || Some(owner) == trx_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Delete,
    Update,
}

/// One logged mutation. Update entries carry the old and new payloads so
/// rollback can restore bytes and index entries.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub table: String,
    pub rid: RecordId,
    pub old_data: Option<Vec<u8>>,
    pub new_data: Option<Vec<u8>>,
}

/// A single transaction: an id and its operation log
pub struct Trx {
    trx_id: u32,
    operations: Vec<Operation>,
}

impl Trx {
    pub fn new(trx_id: u32) -> Self {
        Self {
            trx_id,
            operations: Vec::new(),
        }
    }

    pub fn trx_id(&self) -> u32 {
        self.trx_id
    }

    /// Number of logged operations; used as a statement mark so a failed
    /// statement can be unwound without touching earlier statements
    pub fn op_count(&self) -> usize {
        self.operations.len()
    }

    /// Stamp a fresh record as owned by this transaction
    pub fn init_trx_info(&self, record: &mut [u8]) {
        write_trx_header(record, self.trx_id, false);
    }

    /// Stamp a record as pending delete by this transaction
    pub fn stamp_delete(&self, record: &mut [u8]) {
        write_trx_header(record, self.trx_id, true);
    }

    pub fn is_visible(&self, record: &[u8]) -> bool {
        is_visible_to(Some(self.trx_id), record)
    }

    pub fn log_insert(&mut self, table: &str, rid: RecordId) {
        self.operations.push(Operation {
            kind: OpKind::Insert,
            table: table.to_string(),
            rid,
            old_data: None,
            new_data: None,
        });
    }

    pub fn log_delete(&mut self, table: &str, rid: RecordId) {
        self.operations.push(Operation {
            kind: OpKind::Delete,
            table: table.to_string(),
            rid,
            old_data: None,
            new_data: None,
        });
    }

    pub fn log_update(&mut self, table: &str, rid: RecordId, old_data: Vec<u8>, new_data: Vec<u8>) {
        self.operations.push(Operation {
            kind: OpKind::Update,
            table: table.to_string(),
            rid,
            old_data: Some(old_data),
            new_data: Some(new_data),
        });
    }

    /// Drop the most recent log entry (used when the physical step after
    /// logging fails and has been compensated)
    pub fn pop_last_op(&mut self) {
        self.operations.pop();
    }

    /// Apply every logged operation's physical effect in order, then clear
    /// the log. An error is surfaced immediately; the remaining entries are
    /// discarded (on-disk state may be inconsistent at that point).
    pub fn commit(&mut self, tables: &mut HashMap<String, Table>) -> TableResult<()> {
        let operations = std::mem::take(&mut self.operations);

        for op in operations {
            let table = tables
                .get_mut(&op.table)
                .ok_or_else(|| TableError::Generic(format!("table {} vanished", op.table)))?;

            match op.kind {
                OpKind::Insert => table.commit_insert(op.rid)?,
                OpKind::Delete => table.commit_delete(op.rid)?,
                OpKind::Update => table.commit_update(op.rid)?,
            }
        }

        Ok(())
    }

    /// Unwind the whole log in reverse
    pub fn rollback(&mut self, tables: &mut HashMap<String, Table>) -> TableResult<()> {
        self.rollback_to(0, tables)
    }

    /// Unwind log entries past `mark` in reverse, keeping earlier entries.
    /// Rollback keeps going past individual failures so one bad entry does
    /// not pin the rest of the statement's effects; the first error is
    /// reported after the sweep.
    pub fn rollback_to(
        &mut self,
        mark: usize,
        tables: &mut HashMap<String, Table>,
    ) -> TableResult<()> {
        let tail = self.operations.split_off(mark.min(self.operations.len()));
        let mut first_error = None;

        for op in tail.into_iter().rev() {
            let Some(table) = tables.get_mut(&op.table) else {
                error!(table = %op.table, "compensation_failed: table vanished during rollback");
                continue;
            };

            let result = match op.kind {
                OpKind::Insert => table.rollback_insert(op.rid),
                OpKind::Delete => table.rollback_delete(op.rid),
                OpKind::Update => match op.old_data {
                    Some(ref old) => table.rollback_update(op.rid, old),
                    None => Err(TableError::Generic(
                        "update log entry without old payload".to_string(),
                    )),
                },
            };

            if let Err(e) = result {
                error!(
                    table = %op.table,
                    rid = %op.rid,
                    error = %e,
                    "compensation_failed: rollback step failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
