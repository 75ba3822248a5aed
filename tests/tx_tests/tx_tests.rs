//! Tests for transactions
//!
//! These tests verify:
//! - Sorted-set operations through write and read transactions
//! - Missing bucket / key / member reporting
//! - Read-only transactions reject mutations
//! - Rollback (explicit, on error and on drop) and reader isolation
//! - Commit cost independent of set size
//! - Bucket declaration and glob iteration

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use quillkv::config::WalSyncStrategy;
use quillkv::{Config, DataStructure, Db, Node, QuillError, RangeOpts};
use tempfile::TempDir;

const ZSET: DataStructure = DataStructure::SortedSet;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_db() -> (TempDir, Db) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::open(Config::builder().data_dir(temp_dir.path()).build()).unwrap();
    (temp_dir, db)
}

/// Db with bucket `b` holding key1 = {val1: 1, val2: 2, val3: 3}
fn setup_scenario() -> (TempDir, Db) {
    let (temp, db) = setup_db();
    db.update(|tx| {
        tx.new_bucket(ZSET, "b")?;
        tx.zadd("b", b"key1", 1.0, b"val1")?;
        tx.zadd("b", b"key1", 2.0, b"val2")?;
        tx.zadd("b", b"key1", 3.0, b"val3")?;
        Ok(())
    })
    .unwrap();
    (temp, db)
}

// =============================================================================
// Sorted Set Scenario
// =============================================================================

#[test]
fn test_rank_scenario() {
    let (_temp, db) = setup_scenario();

    db.view(|tx| {
        assert_eq!(
            tx.zrange_by_rank("b", b"key1", 1, 3)?,
            vec![
                Node::new(1.0, "val1"),
                Node::new(2.0, "val2"),
                Node::new(3.0, "val3"),
            ]
        );
        assert_eq!(tx.zrank("b", b"key1", b"val2")?, 2);
        assert_eq!(tx.zrev_rank("b", b"key1", b"val2")?, 2);
        assert_eq!(tx.zrev_rank("b", b"key1", b"val3")?, 1);
        Ok(())
    })
    .unwrap();

    let removed = db
        .update(|tx| tx.zrem_range_by_rank("b", b"key1", 1, 2))
        .unwrap();
    assert_eq!(removed, 2);

    db.view(|tx| {
        assert_eq!(tx.zrange_by_rank("b", b"key1", 1, -1)?, vec![Node::new(3.0, "val3")]);
        assert_eq!(tx.zcard("b", b"key1")?, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_zadd_returns_whether_new_and_updates_score() {
    let (_temp, db) = setup_scenario();

    db.update(|tx| {
        assert!(!tx.zadd("b", b"key1", 10.0, b"val1")?);
        assert!(tx.zadd("b", b"key1", 0.5, b"val0")?);
        Ok(())
    })
    .unwrap();

    db.view(|tx| {
        assert_eq!(tx.zscore("b", b"key1", b"val1")?, 10.0);
        assert_eq!(tx.zcard("b", b"key1")?, 4);
        assert_eq!(tx.zpeek_max("b", b"key1")?, Node::new(10.0, "val1"));
        assert_eq!(tx.zpeek_min("b", b"key1")?, Node::new(0.5, "val0"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_pops_and_peeks() {
    let (_temp, db) = setup_scenario();

    db.update(|tx| {
        assert_eq!(tx.zpop_max("b", b"key1")?, Node::new(3.0, "val3"));
        assert_eq!(tx.zpeek_max("b", b"key1")?, Node::new(2.0, "val2"));
        assert_eq!(tx.zpop_min("b", b"key1")?, Node::new(1.0, "val1"));
        Ok(())
    })
    .unwrap();

    let remaining = db.view(|tx| tx.zmembers("b", b"key1")).unwrap();
    assert_eq!(remaining, vec![Node::new(2.0, "val2")]);
}

#[test]
fn test_score_queries() {
    let (_temp, db) = setup_scenario();

    db.view(|tx| {
        let nodes = tx.zrange_by_score("b", b"key1", 1.5, 3.0, RangeOpts::default())?;
        assert_eq!(nodes, vec![Node::new(2.0, "val2"), Node::new(3.0, "val3")]);

        let opts = RangeOpts::new().exclude_start(true).exclude_end(true);
        assert_eq!(tx.zcount("b", b"key1", 1.0, 3.0, opts)?, 1);
        assert_eq!(tx.zcount("b", b"key1", 1.0, 3.0, RangeOpts::new().limit(2))?, 2);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_popping_last_member_removes_key() {
    let (_temp, db) = setup_db();

    db.update(|tx| {
        tx.new_bucket(ZSET, "b")?;
        tx.zadd("b", b"solo", 1.0, b"only")?;
        tx.zpop_min("b", b"solo")?;
        Ok(())
    })
    .unwrap();

    db.view(|tx| {
        assert_eq!(tx.zcard("b", b"solo")?, 0);
        assert!(tx.zkeys("b", "*")?.is_empty());
        assert!(matches!(tx.zpeek_min("b", b"solo"), Err(QuillError::KeyNotFound)));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_zkeys_pattern() {
    let (_temp, db) = setup_db();

    db.update(|tx| {
        tx.new_bucket(ZSET, "b")?;
        for key in ["user:1", "user:2", "team:1"] {
            tx.zadd("b", key.as_bytes(), 1.0, b"v")?;
        }
        Ok(())
    })
    .unwrap();

    let keys = db.view(|tx| tx.zkeys("b", "user:*")).unwrap();
    assert_eq!(keys, vec!["user:1".as_bytes(), "user:2".as_bytes()]);
}

// =============================================================================
// Missing Data and Invalid Input
// =============================================================================

#[test]
fn test_missing_bucket() {
    let (_temp, db) = setup_db();

    let err = db.view(|tx| tx.zcard("nope", b"k")).unwrap_err();
    assert!(matches!(err, QuillError::BucketNotFound(name) if name == "nope"));

    let err = db.update(|tx| tx.zadd("nope", b"k", 1.0, b"v")).unwrap_err();
    assert!(matches!(err, QuillError::BucketNotFound(_)));
}

#[test]
fn test_missing_key_and_member() {
    let (_temp, db) = setup_scenario();

    db.view(|tx| {
        assert_eq!(tx.zcard("b", b"nokey")?, 0);
        assert!(matches!(tx.zscore("b", b"nokey", b"v"), Err(QuillError::KeyNotFound)));
        assert!(matches!(tx.zrank("b", b"nokey", b"v"), Err(QuillError::KeyNotFound)));
        assert!(matches!(
            tx.zrange_by_rank("b", b"nokey", 1, -1),
            Err(QuillError::KeyNotFound)
        ));
        assert!(matches!(tx.zscore("b", b"key1", b"nobody"), Err(QuillError::MemberNotFound)));
        assert!(matches!(tx.zrev_rank("b", b"key1", b"nobody"), Err(QuillError::MemberNotFound)));
        Ok(())
    })
    .unwrap();

    db.update(|tx| {
        assert!(!tx.zrem("b", b"key1", b"nobody")?);
        assert!(!tx.zrem("b", b"nokey", b"v")?);
        assert_eq!(tx.zrem_range_by_rank("b", b"nokey", 1, 2)?, 0);
        assert!(matches!(tx.zpop_max("b", b"nokey"), Err(QuillError::KeyNotFound)));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_invalid_ranges_and_scores() {
    let (_temp, db) = setup_scenario();

    db.view(|tx| {
        assert!(matches!(
            tx.zrange_by_score("b", b"key1", 3.0, 1.0, RangeOpts::default()),
            Err(QuillError::InvalidRange(_))
        ));
        assert!(matches!(
            tx.zcount("b", b"key1", f64::NAN, 1.0, RangeOpts::default()),
            Err(QuillError::InvalidRange(_))
        ));
        // Crossed rank windows are simply empty
        assert!(tx.zrange_by_rank("b", b"key1", 3, 1)?.is_empty());
        Ok(())
    })
    .unwrap();

    let err = db.update(|tx| tx.zrem_range_by_rank("b", b"key1", 3, 1)).unwrap_err();
    assert!(matches!(err, QuillError::InvalidRange(_)));

    let err = db.update(|tx| tx.zadd("b", b"key1", f64::NAN, b"nan")).unwrap_err();
    assert!(matches!(err, QuillError::InvalidScore));

    // Nothing from the failed transactions stuck
    assert_eq!(db.view(|tx| tx.zcard("b", b"key1")).unwrap(), 3);
}

// =============================================================================
// Transaction Semantics
// =============================================================================

#[test]
fn test_read_tx_rejects_mutations() {
    let (_temp, db) = setup_scenario();

    let mut tx = db.begin(false);
    assert!(!tx.is_writable());

    assert!(matches!(tx.zadd("b", b"key1", 1.0, b"x"), Err(QuillError::TxNotWritable)));
    assert!(matches!(tx.zpop_min("b", b"key1"), Err(QuillError::TxNotWritable)));
    assert!(matches!(tx.new_bucket(ZSET, "c"), Err(QuillError::TxNotWritable)));
    tx.rollback();
}

#[test]
fn test_rollback_discards_changes() {
    let (_temp, db) = setup_scenario();

    let mut tx = db.begin(true);
    assert!(tx.is_writable());
    tx.zadd("b", b"key1", 9.0, b"val9").unwrap();
    tx.new_bucket(ZSET, "other").unwrap();
    // The transaction sees its own writes
    assert_eq!(tx.zcard("b", b"key1").unwrap(), 4);
    tx.rollback();

    db.view(|tx| {
        assert_eq!(tx.zcard("b", b"key1")?, 3);
        assert!(!tx.bucket_exists(ZSET, "other"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_update_error_rolls_back() {
    let (_temp, db) = setup_scenario();

    let result: quillkv::Result<()> = db.update(|tx| {
        tx.zadd("b", b"key1", 4.0, b"val4")?;
        tx.zscore("b", b"key1", b"missing")?;
        Ok(())
    });

    assert!(matches!(result, Err(QuillError::MemberNotFound)));
    assert_eq!(db.view(|tx| tx.zcard("b", b"key1")).unwrap(), 3);
}

#[test]
fn test_reader_sees_stable_state_while_writer_waits() {
    let (_temp, db) = setup_scenario();
    let db = Arc::new(db);

    let reader = db.begin(false);

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            db.update(|tx| {
                tx.zadd("b", b"key1", 4.0, b"val4")?;
                tx.zpop_min("b", b"key1")?;
                Ok(())
            })
            .unwrap();
        })
    };

    // The writer cannot start while the reader is open
    thread::sleep(Duration::from_millis(50));
    assert_eq!(reader.zcard("b", b"key1").unwrap(), 3);
    assert_eq!(reader.zrank("b", b"key1", b"val1").unwrap(), 1);
    assert!(!writer.is_finished());
    reader.rollback();

    writer.join().unwrap();

    // Begun after: sees the commit
    db.view(|tx| {
        assert_eq!(tx.zcard("b", b"key1")?, 3);
        assert_eq!(tx.zrank("b", b"key1", b"val4")?, 3);
        assert!(matches!(tx.zscore("b", b"key1", b"val1"), Err(QuillError::MemberNotFound)));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_dropped_write_tx_is_rolled_back() {
    let (_temp, db) = setup_scenario();

    {
        let mut tx = db.begin(true);
        tx.zadd("b", b"key1", 0.5, b"val0").unwrap();
        tx.zrem_range_by_rank("b", b"key1", 2, -1).unwrap();
        tx.delete_bucket(ZSET, "b").unwrap();
    }

    db.view(|tx| {
        assert_eq!(
            tx.zmembers("b", b"key1")?,
            vec![
                Node::new(1.0, "val1"),
                Node::new(2.0, "val2"),
                Node::new(3.0, "val3"),
            ]
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_transaction_ids_increase() {
    let (_temp, db) = setup_db();

    let first = db.begin(false);
    let second = db.begin(false);
    assert!(second.id() > first.id());
}

#[test]
fn test_concurrent_writers_serialize() {
    let (_temp, db) = setup_db();
    db.update(|tx| tx.new_bucket(ZSET, "b")).unwrap();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..25 {
                    let value = format!("t{}-{}", t, i);
                    db.update(|tx| tx.zadd("b", b"k", i as f64, value.as_bytes()))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.view(|tx| tx.zcard("b", b"k")).unwrap(), 100);
}

/// Best per-commit time over a few rounds of single-member transactions
fn single_member_commit_time(members: usize) -> Duration {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: usize::MAX })
        .build();
    let db = Db::open(config).unwrap();

    db.update(|tx| {
        tx.new_bucket(ZSET, "b")?;
        for i in 0..members {
            tx.zadd("b", b"k", i as f64, format!("m{}", i).as_bytes())?;
        }
        Ok(())
    })
    .unwrap();

    (0..5)
        .map(|round| {
            let start = Instant::now();
            for i in 0..20 {
                let value = format!("r{}-{}", round, i);
                db.update(|tx| tx.zadd("b", b"k", -1.0, value.as_bytes())).unwrap();
                db.update(|tx| tx.zrem("b", b"k", value.as_bytes())).unwrap();
            }
            start.elapsed() / 40
        })
        .min()
        .unwrap()
}

#[test]
fn test_commit_cost_does_not_grow_with_set_size() {
    let small = single_member_commit_time(1_000);
    let large = single_member_commit_time(100_000);

    // A cost linear in the set size would show up as a ~100x ratio
    assert!(
        large < small * 20,
        "per-commit time grew from {:?} to {:?}",
        small,
        large
    );
}

// =============================================================================
// Buckets
// =============================================================================

#[test]
fn test_bucket_lifecycle() {
    let (_temp, db) = setup_db();

    db.update(|tx| tx.new_bucket(ZSET, "b")).unwrap();

    let err = db.update(|tx| tx.new_bucket(ZSET, "b")).unwrap_err();
    assert!(matches!(err, QuillError::BucketAlreadyExists(_)));

    db.update(|tx| {
        tx.zadd("b", b"k", 1.0, b"v")?;
        tx.delete_bucket(ZSET, "b")
    })
    .unwrap();

    db.view(|tx| {
        assert!(!tx.bucket_exists(ZSET, "b"));
        assert!(matches!(tx.zcard("b", b"k"), Err(QuillError::BucketNotFound(_))));
        Ok(())
    })
    .unwrap();

    let err = db.update(|tx| tx.delete_bucket(ZSET, "b")).unwrap_err();
    assert!(matches!(err, QuillError::BucketNotFound(_)));
}

#[test]
fn test_iterate_buckets_filters_by_pattern() {
    let (_temp, db) = setup_db();

    db.update(|tx| {
        for name in ["myZSet2", "myZSet1", "other", "myZSet10"] {
            tx.new_bucket(ZSET, name)?;
        }
        Ok(())
    })
    .unwrap();

    db.view(|tx| {
        let all: Vec<&str> = tx.iterate_buckets(ZSET, "*").collect();
        assert_eq!(all, vec!["myZSet1", "myZSet10", "myZSet2", "other"]);

        let single: Vec<&str> = tx.iterate_buckets(ZSET, "myZSet?").collect();
        assert_eq!(single, vec!["myZSet1", "myZSet2"]);

        assert_eq!(tx.iterate_buckets(ZSET, "nothing*").count(), 0);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_iterate_buckets_stops_early_and_restarts() {
    let (_temp, db) = setup_db();

    db.update(|tx| {
        for i in 0..10 {
            tx.new_bucket(ZSET, &format!("bucket{}", i))?;
        }
        Ok(())
    })
    .unwrap();

    let tx = db.begin(false);

    let mut iter = tx.iterate_buckets(ZSET, "bucket*");
    let restart = iter.clone();
    let first_two: Vec<&str> = iter.by_ref().take(2).collect();
    assert_eq!(first_two, vec!["bucket0", "bucket1"]);
    assert_eq!(iter.next(), Some("bucket2"));

    assert_eq!(restart.count(), 10);
}
