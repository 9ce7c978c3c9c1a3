//! Table metadata: column layout, index list, JSON persistence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::record::AttrType;

/// Number of system fields at the front of every record
pub const SYS_FIELD_NUM: usize = 1;

/// Name of the system field carrying the transaction header
pub const TRX_FIELD_NAME: &str = "__trx";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Field {0} not found")]
    FieldNotFound(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Column metadata. Offsets are assigned once at table creation and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub attr_type: AttrType,
    pub offset: usize,
    pub len: usize,
    pub nullable: bool,
    /// System fields are invisible to projection and DESC
    pub visible: bool,
}

/// Single-column index metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub field: String,
}

/// Column description used when creating a table
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub attr_type: AttrType,
    pub nullable: bool,
}

/// Table metadata persisted as a JSON blob in `<basedir>/<name>.table`.
///
/// Record layout:
/// ```text
/// [ sys fields | user field 1 | ... | user field N | N null-flag bytes ]
/// ```
/// `record_size` covers the sys and user fields; the stored record is
/// `record_size + user_field_num` bytes because one null-flag byte per user
/// field trails the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub fields: Vec<FieldMeta>,
    pub record_size: usize,
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    pub fn new(name: &str, columns: &[ColumnSpec]) -> Self {
        let mut fields = Vec::with_capacity(SYS_FIELD_NUM + columns.len());

        // The transaction header occupies the first four bytes
        fields.push(FieldMeta {
            name: TRX_FIELD_NAME.to_string(),
            attr_type: AttrType::Int,
            offset: 0,
            len: 4,
            nullable: false,
            visible: false,
        });

        let mut offset = 4;
        for col in columns {
            let len = col.attr_type.len();
            fields.push(FieldMeta {
                name: col.name.clone(),
                attr_type: col.attr_type,
                offset,
                len,
                nullable: col.nullable,
                visible: true,
            });
            offset += len;
        }

        Self {
            name: name.to_string(),
            fields,
            record_size: offset,
            indexes: Vec::new(),
        }
    }

    /// All fields including the system header
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// User-declared fields only
    pub fn user_fields(&self) -> &[FieldMeta] {
        &self.fields[SYS_FIELD_NUM..]
    }

    pub fn user_field_num(&self) -> usize {
        self.fields.len() - SYS_FIELD_NUM
    }

    /// Bytes actually stored per record: payload plus one null-flag byte
    /// per user field
    pub fn stored_size(&self) -> usize {
        self.record_size + self.user_field_num()
    }

    /// Offset of the null-flag byte for the user field at `user_idx`
    pub fn null_flag_offset(&self, user_idx: usize) -> usize {
        self.record_size + user_idx
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of a user field by name, relative to user_fields()
    pub fn user_field_index(&self, name: &str) -> Option<usize> {
        self.user_fields().iter().position(|f| f.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn find_index_by_field(&self, field: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.field == field)
    }

    pub fn add_index(&mut self, index: IndexMeta) {
        self.indexes.push(index);
    }

    pub fn remove_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        self.indexes.len() != before
    }

    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Path of the metadata file for a table
pub fn table_meta_file(base_dir: &Path, table_name: &str) -> std::path::PathBuf {
    base_dir.join(format!("{}.table", table_name))
}

/// Path of the heap file for a table
pub fn table_data_file(base_dir: &Path, table_name: &str) -> std::path::PathBuf {
    base_dir.join(format!("{}.data", table_name))
}

/// Path of an index file
pub fn index_data_file(base_dir: &Path, table_name: &str, index_name: &str) -> std::path::PathBuf {
    base_dir.join(format!("{}-{}.index", table_name, index_name))
}
