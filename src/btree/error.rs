use thiserror::Error;

#[derive(Debug, Error)]
pub enum BPlusTreeError {
    #[error("Invalid tree order: {0} (must be >= 3)")]
    InvalidOrder(usize),

    #[error("Node not found: {0}")]
    NodeNotFound(usize),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

pub type BPlusTreeResult<T> = Result<T, BPlusTreeError>;
