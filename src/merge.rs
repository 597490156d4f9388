//! Concatenate per-shard edge arrays into one final artifact.
//!
//! Each input is streamed (never loaded whole) and re-emitted through an
//! `ArrayWriter`, so the result is a valid array however many shards were
//! empty, with no stray separators.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::reader::read_array;
use crate::writer::ArrayWriter;

/// Merge `inputs` in order into `dst`. Returns the record count.
pub fn merge_array_files<P: AsRef<Path>>(inputs: &[P], dst: &Path) -> Result<u64> {
    let mut out = ArrayWriter::create(dst)?;
    for input in inputs {
        let before = out.count();
        for record in read_array(input)? {
            out.push(&record?)?;
        }
        debug!(
            input = %input.as_ref().display(),
            records = out.count() - before,
            "merged shard output"
        );
    }
    out.finish()
}

/// Load-edge and Update-edge shard outputs to merge, in shard order.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub load_inputs: Vec<PathBuf>,
    pub update_inputs: Vec<PathBuf>,
}

impl MergePlan {
    /// Run both merges. Returns (load count, update count).
    pub fn run(&self, load_dst: &Path, update_dst: &Path) -> Result<(u64, u64)> {
        let load = merge_array_files(&self.load_inputs, load_dst)?;
        let update = merge_array_files(&self.update_inputs, update_dst)?;
        Ok((load, update))
    }
}
