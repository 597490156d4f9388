//! Parallel edge classification, one isolated worker per shard.
//!
//! A worker streams its shard file, drops every edge with an endpoint outside
//! the Load vertex set, and splits the survivors between shard-local Load and
//! Update edge files with its own derived generator. Workers share nothing
//! but read-only membership lookups, so they run on a rayon pool with no
//! locking. The fan-in collects every result before returning, and any
//! worker error fails the whole stage.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::FieldNames;
use crate::error::{Result, SplitError};
use crate::membership::Membership;
use crate::record::{Category, Record, VertexKey};
use crate::rng::{self, Stream};
use crate::sharder::ShardFile;
use crate::writer::{read_lines, ArrayWriter};

/// Per-run classification parameters shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyParams<'a> {
    pub fields: &'a FieldNames,
    pub edge_update_ratio: f64,
    pub base_seed: u64,
}

/// Outputs and counts of one shard worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardOutput {
    pub index: usize,
    pub load_path: PathBuf,
    pub update_path: PathBuf,
    pub read: u64,
    pub dropped: u64,
    pub load: u64,
    pub update: u64,
}

pub fn load_output_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("edges_load_shard_{index}.json"))
}

pub fn update_output_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("edges_update_shard_{index}.json"))
}

/// Classify a single shard.
pub fn classify_shard<M: Membership + ?Sized>(
    shard: &ShardFile,
    membership: &M,
    params: ClassifyParams<'_>,
    out_dir: &Path,
) -> Result<ShardOutput> {
    let start = Instant::now();
    let mut rng = rng::derive(params.base_seed, Stream::EdgeShard(shard.index));

    let load_path = load_output_path(out_dir, shard.index);
    let update_path = update_output_path(out_dir, shard.index);
    let mut load_out = ArrayWriter::create(&load_path)?;
    let mut update_out = ArrayWriter::create(&update_path)?;

    let mut read = 0u64;
    let mut dropped = 0u64;
    for edge in read_lines(&shard.path)? {
        let edge = edge?;
        read += 1;

        if !endpoints_loaded(&edge, params.fields, membership) {
            dropped += 1;
            continue;
        }

        if rng.random::<f64>() < params.edge_update_ratio {
            update_out.push(&edge)?;
        } else {
            load_out.push(&edge)?;
        }
    }

    let load = load_out.finish()?;
    let update = update_out.finish()?;
    debug!(
        shard = shard.index,
        read,
        dropped,
        load,
        update,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "shard classified"
    );

    Ok(ShardOutput {
        index: shard.index,
        load_path,
        update_path,
        read,
        dropped,
        load,
        update,
    })
}

/// Both endpoints present and in the Load set; a missing endpoint is not.
fn endpoints_loaded<M: Membership + ?Sized>(edge: &Record, fields: &FieldNames, membership: &M) -> bool {
    let loaded = |field: &str| {
        edge.key(field)
            .is_some_and(|key: VertexKey| membership.contains(key, Category::Load))
    };
    loaded(&fields.out_v) && loaded(&fields.in_v)
}

/// Fan out over all shards on `workers` threads, then fan in.
///
/// Returns outputs in shard order. The first failing shard (by index) is
/// reported; nothing is returned for merging unless every worker succeeded.
pub fn classify_shards<M: Membership + ?Sized>(
    shards: &[ShardFile],
    membership: &M,
    params: ClassifyParams<'_>,
    out_dir: &Path,
    workers: usize,
) -> Result<Vec<ShardOutput>> {
    let run = |shard: &ShardFile| {
        classify_shard(shard, membership, params, out_dir).map_err(|e| SplitError::ShardWorker {
            shard: shard.index,
            source: Box::new(e),
        })
    };

    let results: Vec<Result<ShardOutput>> = if workers <= 1 || shards.len() <= 1 {
        shards.iter().map(run).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("shard-worker-{i}"))
            .build()
            .map_err(|e| SplitError::Pool(format!("rayon pool: {e}")))?;
        pool.install(|| shards.par_iter().map(run).collect())
    };

    results.into_iter().collect()
}
