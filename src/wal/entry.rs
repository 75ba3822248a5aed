//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::bucket::DataStructure;
use crate::error::{QuillError, Result};

/// Frame header: LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single entry may carry (64 MB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// A single entry in the WAL: every operation of one committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Transaction that produced the operations
    pub tx_id: u64,

    /// Mutations, in the order they were applied
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Mutations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Declare a bucket
    NewBucket { kind: DataStructure, name: String },

    /// Drop a bucket and everything in it
    DeleteBucket { kind: DataStructure, name: String },

    /// Add a member or move it to a new score
    ZAdd {
        bucket: String,
        key: Bytes,
        score: f64,
        value: Bytes,
    },

    /// Remove one member
    ZRem {
        bucket: String,
        key: Bytes,
        value: Bytes,
    },

    /// Remove the highest-scored member
    ZPopMax { bucket: String, key: Bytes },

    /// Remove the lowest-scored member
    ZPopMin { bucket: String, key: Bytes },

    /// Remove a window of ranks
    ZRemRangeByRank {
        bucket: String,
        key: Bytes,
        start: i64,
        end: i64,
    },
}

impl Operation {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::NewBucket { .. } => "new_bucket",
            Operation::DeleteBucket { .. } => "delete_bucket",
            Operation::ZAdd { .. } => "zadd",
            Operation::ZRem { .. } => "zrem",
            Operation::ZPopMax { .. } => "zpop_max",
            Operation::ZPopMin { .. } => "zpop_min",
            Operation::ZRemRangeByRank { .. } => "zrem_range_by_rank",
        }
    }
}

/// Outcome of decoding one frame from a byte buffer
#[derive(Debug)]
pub(crate) enum Frame {
    /// A valid entry and the number of bytes it occupied
    Entry(WalEntry, usize),

    /// The buffer ends before the frame does
    Incomplete,

    /// The frame is complete but fails validation
    Corrupt(String),
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, tx_id: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            tx_id,
            operations,
            timestamp,
        }
    }

    /// Encode as `[lsn][crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload =
            bincode::serialize(self).map_err(|e| QuillError::Serialization(e.to_string()))?;

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(QuillError::WalWrite(format!(
                "Entry too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let crc = crc32fast::hash(&payload);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    /// Decode one complete frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        match Self::decode_frame(bytes) {
            Frame::Entry(entry, _) => Ok(entry),
            Frame::Incomplete => Err(QuillError::WalCorruption(format!(
                "Incomplete entry: {} bytes",
                bytes.len()
            ))),
            Frame::Corrupt(reason) => Err(QuillError::WalCorruption(reason)),
        }
    }

    /// Decode the frame at the start of `bytes`
    pub(crate) fn decode_frame(bytes: &[u8]) -> Frame {
        if bytes.len() < HEADER_SIZE {
            return Frame::Incomplete;
        }

        let lsn = u64::from_le_bytes(le_array(&bytes[0..8]));
        let stored_crc = u32::from_le_bytes(le_array(&bytes[8..12]));
        let payload_len = u32::from_le_bytes(le_array(&bytes[12..16])) as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Frame::Corrupt(format!(
                "Payload length {} exceeds max {} at LSN {}",
                payload_len, MAX_PAYLOAD_SIZE, lsn
            ));
        }

        let total_len = HEADER_SIZE + payload_len;
        if bytes.len() < total_len {
            return Frame::Incomplete;
        }

        let payload = &bytes[HEADER_SIZE..total_len];
        let computed_crc = crc32fast::hash(payload);
        if computed_crc != stored_crc {
            return Frame::Corrupt(format!(
                "CRC mismatch at LSN {}: stored {:#010x}, computed {:#010x}",
                lsn, stored_crc, computed_crc
            ));
        }

        let entry: WalEntry = match bincode::deserialize(payload) {
            Ok(entry) => entry,
            Err(e) => return Frame::Corrupt(format!("Undecodable payload at LSN {}: {}", lsn, e)),
        };

        if entry.lsn != lsn {
            return Frame::Corrupt(format!(
                "Header LSN {} does not match payload LSN {}",
                lsn, entry.lsn
            ));
        }

        Frame::Entry(entry, total_len)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    buf
}
