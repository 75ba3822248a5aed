//! Error types for QuillKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using QuillError
pub type Result<T> = std::result::Result<T, QuillError>;

/// Unified error type for QuillKV operations
#[derive(Debug, Error)]
pub enum QuillError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    /// The entry at `lsn` reached the log file but could not be fsynced
    #[error("WAL sync failed after LSN {lsn} was written: {reason}")]
    WalSync { lsn: u64, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Bucket Errors
    // -------------------------------------------------------------------------
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    // -------------------------------------------------------------------------
    // Sorted Set Errors
    // -------------------------------------------------------------------------
    /// The sorted set stored under the key does not exist
    #[error("Key not found")]
    KeyNotFound,

    /// The key exists but the value is not a member of its sorted set
    #[error("Member not found")]
    MemberNotFound,

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid score: NaN is not an ordered score")]
    InvalidScore,

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("Transaction is read-only")]
    TxNotWritable,
}
