//! split-graph - partition a property-graph document into Load and Update sets
//!
//! Usage:
//!   split-graph --input graph.json [--out-prefix dataset] [--split 0.8]
//!               [--edge-update-ratio 0.2] [--shards N] [--seed S]
//!               [--tmp DIR] [--keep-tmp]
//!
//! Writes `<prefix>_load_vertices.json`, `<prefix>_update_vertices.json`,
//! `<prefix>_load_edges.json` and `<prefix>_update_edges.json`. Logs go to
//! stderr (`RUST_LOG`, default `info`); the per-file summary goes to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use graph_split::config::{DEFAULT_EDGE_UPDATE_RATIO, DEFAULT_OUT_PREFIX, DEFAULT_SPLIT_RATIO};
use graph_split::{FieldNames, Pipeline, SplitConfig, SplitError, SplitReport};

/// Exit code for malformed input documents.
const EXIT_BAD_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "split-graph",
    version,
    about = "Split a graph dataset into load and update subsets"
)]
struct Args {
    /// Source graph document ({"vertices": [...], "edges": [...]})
    #[arg(short, long)]
    input: PathBuf,

    /// Prefix for the four output files
    #[arg(short, long, default_value = DEFAULT_OUT_PREFIX)]
    out_prefix: String,

    /// Fraction of vertices assigned to Load
    #[arg(short, long = "split", default_value_t = DEFAULT_SPLIT_RATIO)]
    split: f64,

    /// Fraction of referentially valid edges assigned to Update
    #[arg(short, long, default_value_t = DEFAULT_EDGE_UPDATE_RATIO)]
    edge_update_ratio: f64,

    /// Number of edge shards (default: max(4, CPU count))
    #[arg(long)]
    shards: Option<usize>,

    /// Parallel shard workers (default: min(shards, CPU count))
    #[arg(long)]
    workers: Option<usize>,

    /// Deterministic RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Parent directory for shard files and the membership store
    #[arg(long = "tmp")]
    tmp: Option<PathBuf>,

    /// Keep intermediate artifacts after the run
    #[arg(long)]
    keep_tmp: bool,

    /// Vertex identifier field
    #[arg(long, default_value = "_id")]
    id_field: String,

    /// Edge source endpoint field
    #[arg(long, default_value = "_outV")]
    out_field: String,

    /// Edge target endpoint field
    #[arg(long, default_value = "_inV")]
    in_field: String,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> SplitConfig {
        let mut config = SplitConfig::new(self.input);
        config.out_prefix = self.out_prefix;
        config.split_ratio = self.split;
        config.edge_update_ratio = self.edge_update_ratio;
        if let Some(shards) = self.shards {
            config.shards = shards;
        }
        config.workers = self.workers;
        config.seed = self.seed;
        config.tmp_dir = self.tmp;
        config.keep_tmp = self.keep_tmp;
        config.fields = FieldNames {
            id: self.id_field,
            out_v: self.out_field,
            in_v: self.in_field,
        };
        config
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_report(report: &SplitReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))
}

fn run(args: Args) -> anyhow::Result<()> {
    let report_path = args.report.clone();
    let pipeline = Pipeline::new(args.into_config()).context("invalid arguments")?;
    let input = pipeline.config().input.clone();

    let report = pipeline
        .run()
        .with_context(|| format!("splitting {}", input.display()))?;

    for (path, count) in report.artifact_counts() {
        println!("  {}: {} items", path.display(), count);
    }
    if let Some(dir) = &report.workspace {
        println!("  intermediate files kept in {}", dir.display());
    }
    if let Some(path) = report_path {
        write_report(&report, &path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let bad_input = e
                .downcast_ref::<SplitError>()
                .is_some_and(SplitError::is_input_error);
            if bad_input {
                ExitCode::from(EXIT_BAD_INPUT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
