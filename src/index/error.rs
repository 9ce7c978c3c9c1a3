use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File error: {0}")]
    File(#[from] crate::file::FileError),

    #[error("B+ tree error: {0}")]
    Tree(#[from] crate::btree::BPlusTreeError),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid magic number in index file")]
    InvalidMagic,

    #[error("Unsupported index file version: {0}")]
    UnsupportedVersion(u32),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Index entry not found")]
    EntryNotFound,
}

pub type IndexResult<T> = Result<T, IndexError>;
