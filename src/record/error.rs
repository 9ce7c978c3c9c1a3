use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File error: {0}")]
    File(#[from] crate::file::FileError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid slot {1} in page {0}")]
    InvalidSlot(usize, usize),

    #[error("Invalid date value: {0}")]
    InvalidDate(i32),
}

pub type RecordResult<T> = Result<T, RecordError>;
