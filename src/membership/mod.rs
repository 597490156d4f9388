//! Durable vertex membership store.
//!
//! Records which category (Load or Update) every vertex id was assigned to.
//! The store has two lifetimes, enforced by type:
//!
//! - `MembershipWriter`: single writer during the vertex pass. Inserts go to
//!   an in-memory buffer that spills sorted runs to disk when full, so the
//!   vertex set never has to fit in memory.
//! - `MembershipIndex`: produced by `MembershipWriter::freeze()`. Immutable,
//!   memory-mapped, `Send + Sync`; shared by reference across shard workers
//!   with no locking.
//!
//! # Storage Layout
//!
//! ```text
//! <workspace>/membership/
//! +-- membership.json       # MembershipManifest (written last on freeze)
//! +-- load.idx              # sorted Load keys + bloom filter
//! +-- update.idx            # sorted Update keys + bloom filter
//! +-- run_000001_load.keys  # spilled runs, removed by freeze()
//! ```

pub mod bloom;
pub mod buffer;
pub mod keyfile;

#[cfg(test)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SplitError};
use crate::record::{Category, VertexKey};

pub use buffer::WriteBuffer;
pub use keyfile::KeyFile;

const MANIFEST_FILE: &str = "membership.json";

/// Read-side contract used by the edge classifier.
pub trait Membership: Sync {
    fn contains(&self, key: VertexKey, category: Category) -> bool;
}

/// Outcome of an insert-or-ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key was already assigned; the first assignment stands.
    Existing(Category),
}

// ── Manifest ───────────────────────────────────────────────────────

/// Written once by `freeze()`. Its presence marks the store as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipManifest {
    pub load_count: u64,
    pub update_count: u64,
}

impl MembershipManifest {
    pub fn count(&self, category: Category) -> u64 {
        match category {
            Category::Load => self.load_count,
            Category::Update => self.update_count,
        }
    }
}

fn index_path(dir: &Path, category: Category) -> PathBuf {
    dir.join(format!("{}.idx", category.as_str()))
}

// ── Writer ─────────────────────────────────────────────────────────

pub struct MembershipWriter {
    dir: PathBuf,
    buffer: WriteBuffer,
    buffer_limit: usize,
    runs: Vec<KeyFile>,
    next_run: u32,
    counts: [u64; 2],
}

impl MembershipWriter {
    /// Create an empty store in `dir` (created if missing).
    pub fn create(dir: &Path, buffer_limit: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| SplitError::io_at(dir, e))?;
        if dir.join(MANIFEST_FILE).exists() {
            return Err(SplitError::Membership(format!(
                "{} already holds a frozen store",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            buffer: WriteBuffer::new(),
            buffer_limit: buffer_limit.max(1),
            runs: Vec::new(),
            next_run: 1,
            counts: [0; 2],
        })
    }

    /// Insert-or-ignore: a key keeps its first category forever.
    pub fn insert(&mut self, key: VertexKey, category: Category) -> Result<InsertOutcome> {
        if let Some(existing) = self.lookup(key) {
            return Ok(InsertOutcome::Existing(existing));
        }
        self.buffer.insert(key, category);
        self.counts[category.tag() as usize] += 1;
        if self.buffer.len() >= self.buffer_limit {
            self.flush()?;
        }
        Ok(InsertOutcome::Inserted)
    }

    /// Category already assigned to `key`, if any.
    pub fn lookup(&self, key: VertexKey) -> Option<Category> {
        self.buffer.get(key).or_else(|| {
            self.runs
                .iter()
                .find(|run| run.contains(key))
                .map(|run| run.category())
        })
    }

    pub fn count(&self, category: Category) -> u64 {
        self.counts[category.tag() as usize]
    }

    /// Number of spilled runs so far.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Spill the buffer as one sorted run per non-empty category.
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let seq = self.next_run;
        self.next_run += 1;

        for (category, keys) in self.buffer.drain_sorted() {
            if keys.is_empty() {
                continue;
            }
            let path = self.dir.join(format!("run_{:06}_{}.keys", seq, category.as_str()));
            keyfile::write_key_file(&path, category, keys.len() as u64, keys.iter().copied())?;
            debug!(run = seq, %category, keys = keys.len(), "spilled membership run");
            self.runs.push(KeyFile::open(&path)?);
        }
        Ok(())
    }

    /// Seal the store: merge runs into one index per category and reopen it
    /// read-only. No further mutation is possible afterwards.
    pub fn freeze(mut self) -> Result<MembershipIndex> {
        self.flush()?;

        for category in Category::ALL {
            let runs: Vec<&KeyFile> = self
                .runs
                .iter()
                .filter(|run| run.category() == category)
                .collect();
            let path = index_path(&self.dir, category);
            keyfile::write_key_file(
                &path,
                category,
                self.count(category),
                keyfile::merge_sorted(&runs),
            )?;
        }

        let run_paths: Vec<PathBuf> = self.runs.drain(..).map(|run| run.path().to_path_buf()).collect();
        for path in run_paths {
            std::fs::remove_file(&path).map_err(|e| SplitError::io_at(&path, e))?;
        }

        let manifest = MembershipManifest {
            load_count: self.count(Category::Load),
            update_count: self.count(Category::Update),
        };
        let manifest_path = self.dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| SplitError::io_at(&manifest_path, e))?;

        MembershipIndex::open(&self.dir)
    }
}

// ── Frozen Index ───────────────────────────────────────────────────

/// Read-only membership index. Safe to share across threads and processes.
#[derive(Debug)]
pub struct MembershipIndex {
    manifest: MembershipManifest,
    load: KeyFile,
    update: KeyFile,
}

impl MembershipIndex {
    /// Open a store sealed by `MembershipWriter::freeze()`.
    pub fn open(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(SplitError::Membership(format!(
                "{} is not a frozen membership store",
                dir.display()
            )));
        }
        let manifest: MembershipManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;

        let load = KeyFile::open(&index_path(dir, Category::Load))?;
        let update = KeyFile::open(&index_path(dir, Category::Update))?;
        for file in [&load, &update] {
            let expected = manifest.count(file.category());
            if file.len() as u64 != expected {
                return Err(SplitError::InvalidFormat(format!(
                    "{}: {} keys, manifest says {}",
                    file.path().display(),
                    file.len(),
                    expected
                )));
            }
        }

        Ok(Self {
            manifest,
            load,
            update,
        })
    }

    pub fn count(&self, category: Category) -> u64 {
        self.manifest.count(category)
    }
}

impl Membership for MembershipIndex {
    fn contains(&self, key: VertexKey, category: Category) -> bool {
        match category {
            Category::Load => self.load.contains(key),
            Category::Update => self.update.contains(key),
        }
    }
}

/// Fully replicated in-memory set, used as a lookup model in tests.
#[cfg(test)]
impl Membership for HashMap<VertexKey, Category> {
    fn contains(&self, key: VertexKey, category: Category) -> bool {
        self.get(&key) == Some(&category)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
