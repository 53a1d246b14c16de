//! Error taxonomy for the directory core
//!
//! - `StoreError`: I/O or decoding failure inside a storage backend
//! - `DirectoryError`: what a caller of the directory service can observe
//!
//! "Not found" on read paths is not an error: reads return an empty value so a
//! node that was never seen looks the same as one with no data.

use std::fmt;
use thiserror::Error;

use crate::models::NodeKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Why a registration was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    AtCapacity { kind: NodeKind, ceiling: usize },
    DuplicateAddress { host: String },
    VersionMismatch { required: String, found: String },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::AtCapacity { kind, ceiling } => {
                write!(f, "{} capacity of {} nodes reached", kind, ceiling)
            }
            ConflictReason::DuplicateAddress { host } => {
                write!(f, "node with the same address already exists: {}", host)
            }
            ConflictReason::VersionMismatch { required, found } => {
                write!(f, "running {} instead of required version {}", found, required)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl DirectoryError {
    pub fn conflict(reason: ConflictReason) -> Self {
        DirectoryError::Conflict(reason)
    }
}
