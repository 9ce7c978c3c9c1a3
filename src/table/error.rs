use thiserror::Error;

use crate::catalog::CatalogError;
use crate::file::FileError;
use crate::index::IndexError;
use crate::record::RecordError;

/// Schema- and storage-level failures surfaced to the executor. The
/// variants mirror the result codes reported to the client.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Table {0} already exists")]
    SchemaTableExist(String),

    #[error("Table name {0} does not match the target table")]
    SchemaTableNameIllegal(String),

    #[error("Index already exists: {0}")]
    SchemaIndexExist(String),

    #[error("Field missing or value malformed: {0}")]
    SchemaFieldMissing(String),

    #[error("Field {0} does not allow null values")]
    SchemaFieldNameIllegal(String),

    #[error("Field type mismatch: {0}")]
    SchemaFieldTypeMismatch(String),

    #[error("Field {0} does not exist")]
    SchemaFieldNotExist(String),

    #[error("Invalid index key")]
    RecordInvalidKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("{0}")]
    Generic(String),
}

pub type TableResult<T> = Result<T, TableError>;
