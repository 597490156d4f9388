//! End-to-end split pipeline.
//!
//! ```text
//! INIT -> VERTEX_PASS -> EDGE_PARTITION -> SHARD_CLASSIFY -> MERGE -> DONE
//! ```
//!
//! Every arrow is a barrier. The membership store is written only during
//! VERTEX_PASS and frozen before EDGE_PARTITION starts; SHARD_CLASSIFY is the
//! only parallel phase. Final artifacts are staged as `<path>.partial` and
//! renamed into place after MERGE, so a failed run leaves no outputs. The
//! run workspace (shard files, membership store) is removed when the run
//! ends, successfully or not, unless `keep_tmp` is set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::classify::{classify_shards, ClassifyParams, ShardOutput};
use crate::config::SplitConfig;
use crate::error::{Result, SplitError};
use crate::membership::MembershipWriter;
use crate::merge::MergePlan;
use crate::reader::{GraphReader, Section};
use crate::record::Category;
use crate::resource::TuningProfile;
use crate::rng::{self, Stream};
use crate::sharder::{EdgeSharder, ShardRouter};
use crate::vertex::{VertexSplitter, VertexStats};
use crate::writer::ArrayWriter;

const WORKSPACE_PREFIX: &str = "split_graph_";
const PARTIAL_SUFFIX: &str = ".partial";

// ── Phase ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    VertexPass,
    EdgePartition,
    ShardClassify,
    Merge,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "INIT",
            Phase::VertexPass => "VERTEX_PASS",
            Phase::EdgePartition => "EDGE_PARTITION",
            Phase::ShardClassify => "SHARD_CLASSIFY",
            Phase::Merge => "MERGE",
            Phase::Done => "DONE",
        })
    }
}

/// Tracks the current phase and its timing. Phases only move forward.
struct PhaseClock {
    phase: Phase,
    run_start: Instant,
    phase_start: Instant,
}

impl PhaseClock {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            phase: Phase::Init,
            run_start: now,
            phase_start: now,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {next} after {}", self.phase);
        info!(
            from = %self.phase,
            to = %next,
            phase_ms = self.phase_start.elapsed().as_millis() as u64,
            "phase complete"
        );
        self.phase = next;
        self.phase_start = Instant::now();
    }
}

// ── Outputs ────────────────────────────────────────────────────────

/// The four final artifacts of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub load_vertices: PathBuf,
    pub update_vertices: PathBuf,
    pub load_edges: PathBuf,
    pub update_edges: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            load_vertices: PathBuf::from(format!("{prefix}_load_vertices.json")),
            update_vertices: PathBuf::from(format!("{prefix}_update_vertices.json")),
            load_edges: PathBuf::from(format!("{prefix}_load_edges.json")),
            update_edges: PathBuf::from(format!("{prefix}_update_edges.json")),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.load_vertices,
            &self.update_vertices,
            &self.load_edges,
            &self.update_edges,
        ]
    }

    fn vertices(&self, category: Category) -> &Path {
        match category {
            Category::Load => &self.load_vertices,
            Category::Update => &self.update_vertices,
        }
    }

    fn edges(&self, category: Category) -> &Path {
        match category {
            Category::Load => &self.load_edges,
            Category::Update => &self.update_edges,
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Staged outputs: removed on drop unless committed.
struct StagedOutputs {
    finals: OutputPaths,
    committed: bool,
}

impl StagedOutputs {
    fn new(finals: OutputPaths) -> Self {
        Self {
            finals,
            committed: false,
        }
    }

    fn staged(&self, path: &Path) -> PathBuf {
        partial_path(path)
    }

    /// Fail early if any destination can never receive its artifact.
    fn check_destinations(&self) -> Result<()> {
        for path in self.finals.all() {
            if path.is_dir() {
                return Err(SplitError::InvalidConfig(format!(
                    "output path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Rename all four staged files into place. If any rename fails, the
    /// artifacts already moved are removed again.
    fn commit(mut self) -> Result<OutputPaths> {
        let mut renamed: Vec<&Path> = Vec::with_capacity(4);
        for path in self.finals.all() {
            let staged = partial_path(path);
            if let Err(e) = std::fs::rename(&staged, path) {
                for done in renamed {
                    if let Err(e) = std::fs::remove_file(done) {
                        warn!(path = %done.display(), "failed to roll back output: {}", e);
                    }
                }
                return Err(SplitError::io_at(&staged, e));
            }
            renamed.push(path);
        }
        self.committed = true;
        Ok(self.finals.clone())
    }
}

impl Drop for StagedOutputs {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in self.finals.all() {
            let staged = partial_path(path);
            if staged.exists() {
                if let Err(e) = std::fs::remove_file(&staged) {
                    warn!(path = %staged.display(), "failed to remove staged output: {}", e);
                }
            }
        }
    }
}

// ── Workspace ──────────────────────────────────────────────────────

/// Per-run temp directory holding shard files and the membership store.
pub struct Workspace {
    dir: Option<TempDir>,
    keep: bool,
}

impl Workspace {
    /// Create `split_graph_*` under `parent` (or the system temp dir).
    pub fn create(parent: Option<&Path>, keep: bool) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| SplitError::io_at(parent, e))?;
                builder.tempdir_in(parent).map_err(|e| SplitError::io_at(parent, e))?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir: Some(dir), keep })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    pub fn membership_dir(&self) -> PathBuf {
        self.path().join("membership")
    }

    pub fn shards_dir(&self) -> PathBuf {
        self.path().join("shards")
    }

    /// End of run: delete, or keep and return the path.
    fn close(mut self) -> Option<PathBuf> {
        let dir = self.dir.take()?;
        if self.keep {
            return Some(dir.keep());
        }
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(path = %path.display(), "failed to remove workspace: {}", e);
        }
        None
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Failure path: TempDir removes itself unless we are keeping it.
        if let Some(dir) = self.dir.take() {
            if self.keep {
                let kept = dir.keep();
                info!(path = %kept.display(), "workspace preserved");
            }
        }
    }
}

// ── Report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeStats {
    pub read: u64,
    pub per_shard: Vec<u64>,
    pub dropped: u64,
    pub load: u64,
    pub update: u64,
}

impl EdgeStats {
    fn from_outputs(outputs: &[ShardOutput]) -> Self {
        Self {
            read: outputs.iter().map(|o| o.read).sum(),
            per_shard: outputs.iter().map(|o| o.read).collect(),
            dropped: outputs.iter().map(|o| o.dropped).sum(),
            load: outputs.iter().map(|o| o.load).sum(),
            update: outputs.iter().map(|o| o.update).sum(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub seed: u64,
    pub shards: usize,
    pub workers: usize,
    pub vertices: VertexStats,
    pub edges: EdgeStats,
    pub outputs: OutputPaths,
    /// Set when the workspace was kept.
    pub workspace: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl SplitReport {
    /// (path, record count) for each artifact, in output order.
    pub fn artifact_counts(&self) -> [(&Path, u64); 4] {
        [
            (&self.outputs.load_vertices, self.vertices.load),
            (&self.outputs.update_vertices, self.vertices.update),
            (&self.outputs.load_edges, self.edges.load),
            (&self.outputs.update_edges, self.edges.update),
        ]
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

pub struct Pipeline {
    config: SplitConfig,
}

impl Pipeline {
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Run all phases. Either all four artifacts exist afterwards, or none.
    pub fn run(&self) -> Result<SplitReport> {
        let result = self.run_phases();
        if let Err(e) = &result {
            error!("split failed: {}", e);
        }
        result
    }

    fn run_phases(&self) -> Result<SplitReport> {
        let cfg = &self.config;
        let mut clock = PhaseClock::start();

        // ── INIT ──
        let reader = GraphReader::open(&cfg.input)?;
        let staged = StagedOutputs::new(OutputPaths::from_prefix(&cfg.out_prefix));
        staged.check_destinations()?;
        let profile = TuningProfile::detect();
        let workers = cfg.workers.unwrap_or_else(|| profile.workers_for(cfg.shards));
        let buffer_limit = cfg.membership_buffer.unwrap_or(profile.membership_buffer_entries);
        let seed = rng::base_seed(cfg.seed);

        let workspace = Workspace::create(cfg.tmp_dir.as_deref(), cfg.keep_tmp)?;
        cfg.write_to(workspace.path())?;
        std::fs::create_dir_all(workspace.shards_dir())?;
        info!(
            input = %cfg.input.display(),
            workspace = %workspace.path().display(),
            shards = cfg.shards,
            workers,
            "starting split"
        );
        debug!(seed, buffer_limit, "run parameters");

        // ── VERTEX_PASS ──
        clock.advance(Phase::VertexPass);
        let mut store = MembershipWriter::create(&workspace.membership_dir(), buffer_limit)?;
        let mut load_out = ArrayWriter::create(staged.staged(staged.finals.vertices(Category::Load)))?;
        let mut update_out = ArrayWriter::create(staged.staged(staged.finals.vertices(Category::Update)))?;
        let vertex_stats = VertexSplitter::new(
            &cfg.fields.id,
            cfg.split_ratio,
            rng::derive(seed, Stream::Vertices),
        )
        .run(
            reader.records(Section::Vertices)?,
            &mut store,
            &mut load_out,
            &mut update_out,
        )?;
        load_out.finish()?;
        update_out.finish()?;
        let membership = store.freeze()?;
        info!(
            load = vertex_stats.load,
            update = vertex_stats.update,
            duplicates = vertex_stats.duplicates,
            "vertices split"
        );

        // ── EDGE_PARTITION ──
        clock.advance(Phase::EdgePartition);
        let shard_files = EdgeSharder::new(ShardRouter::new(cfg.shards), &cfg.fields, workspace.shards_dir())
            .run(reader.records(Section::Edges)?)?;
        info!(
            edges = shard_files.iter().map(|s| s.edges).sum::<u64>(),
            shards = shard_files.len(),
            "edges partitioned"
        );

        // ── SHARD_CLASSIFY ──
        clock.advance(Phase::ShardClassify);
        let params = ClassifyParams {
            fields: &cfg.fields,
            edge_update_ratio: cfg.edge_update_ratio,
            base_seed: seed,
        };
        let outputs = classify_shards(&shard_files, &membership, params, &workspace.shards_dir(), workers)?;
        let edge_stats = EdgeStats::from_outputs(&outputs);
        info!(
            load = edge_stats.load,
            update = edge_stats.update,
            dropped = edge_stats.dropped,
            "edges classified"
        );

        // ── MERGE ──
        clock.advance(Phase::Merge);
        let plan = MergePlan {
            load_inputs: outputs.iter().map(|o| o.load_path.clone()).collect(),
            update_inputs: outputs.iter().map(|o| o.update_path.clone()).collect(),
        };
        plan.run(
            &staged.staged(staged.finals.edges(Category::Load)),
            &staged.staged(staged.finals.edges(Category::Update)),
        )?;

        // ── DONE ──
        drop(membership);
        let outputs = staged.commit()?;
        clock.advance(Phase::Done);
        let workspace = workspace.close();

        Ok(SplitReport {
            seed,
            shards: cfg.shards,
            workers,
            vertices: vertex_stats,
            edges: edge_stats,
            outputs,
            workspace,
            elapsed_ms: clock.run_start.elapsed().as_millis() as u64,
        })
    }
}
