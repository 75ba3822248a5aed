//! QuillKV CLI
//!
//! Command-line interface for inspecting and editing a QuillKV data
//! directory. Each invocation opens the database, runs one command in a
//! single transaction and closes it again.

use clap::{Parser, Subcommand};
use quillkv::{Config, DataStructure, Db, Node, RangeOpts, Tx};
use tracing_subscriber::{fmt, EnvFilter};

/// QuillKV CLI
#[derive(Parser, Debug)]
#[command(name = "quill-cli")]
#[command(about = "CLI for the QuillKV sorted-set store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./quill_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Declare a sorted-set bucket
    NewBucket { bucket: String },

    /// Delete a bucket and all of its keys
    DelBucket { bucket: String },

    /// List sorted-set buckets matching a glob
    Buckets {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Add a member or update its score
    Zadd {
        bucket: String,
        key: String,
        #[arg(allow_negative_numbers = true)]
        score: f64,
        value: String,
    },

    /// Remove a member
    Zrem {
        bucket: String,
        key: String,
        value: String,
    },

    /// Number of members
    Zcard { bucket: String, key: String },

    /// Score of a member
    Zscore {
        bucket: String,
        key: String,
        value: String,
    },

    /// Ascending rank of a member (1 = lowest score)
    Zrank {
        bucket: String,
        key: String,
        value: String,
    },

    /// Descending rank of a member (1 = highest score)
    Zrevrank {
        bucket: String,
        key: String,
        value: String,
    },

    /// Members by rank window; negative ranks count from the tail
    Zrange {
        bucket: String,
        key: String,
        #[arg(allow_negative_numbers = true)]
        start: i64,
        #[arg(allow_negative_numbers = true)]
        end: i64,
    },

    /// Members by score window
    Zrangebyscore {
        bucket: String,
        key: String,
        #[arg(allow_negative_numbers = true)]
        min: f64,
        #[arg(allow_negative_numbers = true)]
        max: f64,
        #[command(flatten)]
        opts: ScoreOpts,
    },

    /// Count members in a score window
    Zcount {
        bucket: String,
        key: String,
        #[arg(allow_negative_numbers = true)]
        min: f64,
        #[arg(allow_negative_numbers = true)]
        max: f64,
        #[command(flatten)]
        opts: ScoreOpts,
    },

    /// Remove and print the highest-scored member
    Zpopmax { bucket: String, key: String },

    /// Remove and print the lowest-scored member
    Zpopmin { bucket: String, key: String },

    /// Remove members by rank window
    Zremrangebyrank {
        bucket: String,
        key: String,
        #[arg(allow_negative_numbers = true)]
        start: i64,
        #[arg(allow_negative_numbers = true)]
        end: i64,
    },

    /// List keys of a bucket matching a glob
    Zkeys {
        bucket: String,
        #[arg(default_value = "*")]
        pattern: String,
    },
}

#[derive(clap::Args, Debug)]
struct ScoreOpts {
    /// Maximum number of members (0 = unlimited)
    #[arg(long, default_value = "0")]
    limit: usize,

    /// Exclude members scored exactly `min`
    #[arg(long)]
    exclude_min: bool,

    /// Exclude members scored exactly `max`
    #[arg(long)]
    exclude_max: bool,
}

impl From<&ScoreOpts> for RangeOpts {
    fn from(opts: &ScoreOpts) -> Self {
        RangeOpts::new()
            .limit(opts.limit)
            .exclude_start(opts.exclude_min)
            .exclude_end(opts.exclude_max)
    }
}

impl Commands {
    fn is_write(&self) -> bool {
        matches!(
            self,
            Commands::NewBucket { .. }
                | Commands::DelBucket { .. }
                | Commands::Zadd { .. }
                | Commands::Zrem { .. }
                | Commands::Zpopmax { .. }
                | Commands::Zpopmin { .. }
                | Commands::Zremrangebyrank { .. }
        )
    }
}

fn main() {
    // Initialize tracing/logging (stdout is reserved for command output)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,quillkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder().data_dir(&args.data_dir).build();

    let db = match Db::open(config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let result = if args.command.is_write() {
        db.update(|tx| run(tx, &args.command))
    } else {
        db.view(|tx| run(tx, &args.command))
    };

    let lines = match result {
        Ok(lines) => lines,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db.close() {
        tracing::error!("Failed to close database: {}", e);
        std::process::exit(1);
    }

    for line in lines {
        println!("{line}");
    }
}

/// Execute one command, returning the lines to print
fn run(tx: &mut Tx<'_>, command: &Commands) -> quillkv::Result<Vec<String>> {
    const KIND: DataStructure = DataStructure::SortedSet;

    let out = match command {
        Commands::NewBucket { bucket } => {
            tx.new_bucket(KIND, bucket)?;
            vec!["OK".to_string()]
        }
        Commands::DelBucket { bucket } => {
            tx.delete_bucket(KIND, bucket)?;
            vec!["OK".to_string()]
        }
        Commands::Buckets { pattern } => tx
            .iterate_buckets(KIND, pattern)
            .map(str::to_string)
            .collect(),
        Commands::Zadd {
            bucket,
            key,
            score,
            value,
        } => {
            let added = tx.zadd(bucket, key.as_bytes(), *score, value.as_bytes())?;
            vec![u8::from(added).to_string()]
        }
        Commands::Zrem { bucket, key, value } => {
            let removed = tx.zrem(bucket, key.as_bytes(), value.as_bytes())?;
            vec![u8::from(removed).to_string()]
        }
        Commands::Zcard { bucket, key } => vec![tx.zcard(bucket, key.as_bytes())?.to_string()],
        Commands::Zscore { bucket, key, value } => {
            vec![tx.zscore(bucket, key.as_bytes(), value.as_bytes())?.to_string()]
        }
        Commands::Zrank { bucket, key, value } => {
            vec![tx.zrank(bucket, key.as_bytes(), value.as_bytes())?.to_string()]
        }
        Commands::Zrevrank { bucket, key, value } => {
            vec![tx.zrev_rank(bucket, key.as_bytes(), value.as_bytes())?.to_string()]
        }
        Commands::Zrange {
            bucket,
            key,
            start,
            end,
        } => format_nodes(&tx.zrange_by_rank(bucket, key.as_bytes(), *start, *end)?),
        Commands::Zrangebyscore {
            bucket,
            key,
            min,
            max,
            opts,
        } => format_nodes(&tx.zrange_by_score(bucket, key.as_bytes(), *min, *max, opts.into())?),
        Commands::Zcount {
            bucket,
            key,
            min,
            max,
            opts,
        } => vec![tx
            .zcount(bucket, key.as_bytes(), *min, *max, opts.into())?
            .to_string()],
        Commands::Zpopmax { bucket, key } => format_nodes(&[tx.zpop_max(bucket, key.as_bytes())?]),
        Commands::Zpopmin { bucket, key } => format_nodes(&[tx.zpop_min(bucket, key.as_bytes())?]),
        Commands::Zremrangebyrank {
            bucket,
            key,
            start,
            end,
        } => vec![tx
            .zrem_range_by_rank(bucket, key.as_bytes(), *start, *end)?
            .to_string()],
        Commands::Zkeys { bucket, pattern } => tx
            .zkeys(bucket, pattern)?
            .iter()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .collect(),
    };

    Ok(out)
}

fn format_nodes(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| format!("{}\t{}", node.score, String::from_utf8_lossy(&node.value)))
        .collect()
}
