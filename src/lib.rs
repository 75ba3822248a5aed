//! # QuillKV
//!
//! An embedded, transactional key-value store for sorted sets with:
//! - Buckets of sorted sets keyed by byte strings
//! - Rank and score queries backed by an indexed skip list
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with partial write handling
//! - Single-writer/multi-reader transactions with undo-based rollback
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Db                                  │
//! │              begin / update / view / close                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Tx                                  │
//! │      read: shared lock      write: exclusive lock + undo     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ commit
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │    State    │
//!   │  (Append)   │          │ (in place)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  SortedSet  │
//!                           │ (skip list) │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use quillkv::{DataStructure, Db};
//!
//! # fn main() -> quillkv::Result<()> {
//! let db = Db::open_path("./quill_data")?;
//!
//! db.update(|tx| {
//!     if !tx.bucket_exists(DataStructure::SortedSet, "scores") {
//!         tx.new_bucket(DataStructure::SortedSet, "scores")?;
//!     }
//!     tx.zadd("scores", b"board", 42.0, b"alice")?;
//!     Ok(())
//! })?;
//!
//! let rank = db.view(|tx| tx.zrank("scores", b"board", b"alice"))?;
//! assert_eq!(rank, 1);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod zset;
pub mod bucket;
pub mod wal;
pub mod tx;
pub mod db;

mod state;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QuillError, Result};
pub use config::{Config, WalSyncStrategy};
pub use db::Db;
pub use tx::Tx;
pub use bucket::{BucketIter, DataStructure};
pub use zset::{Node, RangeOpts, SortedSet};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of QuillKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
