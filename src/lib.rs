//! graph-split: streaming Load/Update partitioner for property-graph datasets.
//!
//! Splits a `{ "vertices": [...], "edges": [...] }` document into four JSON
//! arrays: Load vertices, Update vertices, Load edges and Update edges. Every
//! output edge has both endpoints in the Load vertex set.
//!
//! Inputs far larger than RAM are handled by streaming both sections, keeping
//! vertex membership in an on-disk sorted key store, and classifying edges
//! in hash-partitioned shards on a worker pool.
//!
//! ```no_run
//! use graph_split::{Pipeline, SplitConfig};
//!
//! let mut config = SplitConfig::new("graph.json");
//! config.out_prefix = "out/ldbc".to_string();
//! config.seed = Some(42);
//! let report = Pipeline::new(config)?.run()?;
//! println!("{} load vertices", report.vertices.load);
//! # Ok::<(), graph_split::SplitError>(())
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod membership;
pub mod merge;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod resource;
pub mod rng;
pub mod sharder;
pub mod vertex;
pub mod writer;

pub use config::{FieldNames, SplitConfig};
pub use error::{Result, SplitError};
pub use membership::{Membership, MembershipIndex, MembershipWriter};
pub use pipeline::{EdgeStats, OutputPaths, Phase, Pipeline, SplitReport};
pub use record::{Category, Record, VertexKey};
pub use vertex::VertexStats;
