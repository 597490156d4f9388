//! Deterministic edge sharding.
//!
//! Maps each edge to a shard by hashing its endpoint pair with blake3:
//! `blake3(out_text ":" in_text)`, first 8 bytes as u64 LE, modulo the shard
//! count. Order-sensitive (`a->b` and `b->a` may land apart) and without any
//! locality guarantee; identical input, shard count and hash always yield
//! identical shard files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::FieldNames;
use crate::error::{Result, SplitError};
use crate::reader::Section;
use crate::record::Record;
use crate::writer::LineWriter;

/// Deterministic router: endpoint pair -> shard index.
#[derive(Debug, Clone, Copy)]
pub struct ShardRouter {
    shard_count: usize,
}

impl ShardRouter {
    /// # Panics
    ///
    /// Panics if `shard_count` is 0.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "shard_count must be > 0");
        Self { shard_count }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Shard for an edge whose endpoints have canonical texts `out_v`, `in_v`.
    pub fn shard_for(&self, out_v: &str, in_v: &str) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(out_v.as_bytes());
        hasher.update(b":");
        hasher.update(in_v.as_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[0..8]);
        (u64::from_le_bytes(head) % self.shard_count as u64) as usize
    }
}

/// One intermediate shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardFile {
    pub index: usize,
    pub path: PathBuf,
    pub edges: u64,
}

pub fn shard_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("edge_shard_{index}.ndjson"))
}

/// Single streaming pass over the edges with one open file per shard.
pub struct EdgeSharder<'a> {
    router: ShardRouter,
    fields: &'a FieldNames,
    dir: PathBuf,
}

impl<'a> EdgeSharder<'a> {
    pub fn new(router: ShardRouter, fields: &'a FieldNames, dir: impl Into<PathBuf>) -> Self {
        Self {
            router,
            fields,
            dir: dir.into(),
        }
    }

    pub fn run<I>(&self, edges: I) -> Result<Vec<ShardFile>>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut writers = (0..self.router.shard_count())
            .map(|i| LineWriter::create(shard_path(&self.dir, i)))
            .collect::<Result<Vec<_>>>()?;

        let mut total = 0u64;
        for (index, edge) in edges.into_iter().enumerate() {
            let edge = edge?;
            let out_v = endpoint(&edge, &self.fields.out_v, index)?;
            let in_v = endpoint(&edge, &self.fields.in_v, index)?;
            let shard = self.router.shard_for(&out_v, &in_v);
            writers[shard].push(&edge)?;

            total += 1;
            if total % 1_000_000 == 0 {
                info!(edges = total, "edge partition progress");
            }
        }

        writers
            .into_iter()
            .enumerate()
            .map(|(index, writer)| {
                let (path, edges) = writer.finish()?;
                Ok(ShardFile { index, path, edges })
            })
            .collect()
    }
}

fn endpoint<'r>(edge: &'r Record, field: &str, index: usize) -> Result<std::borrow::Cow<'r, str>> {
    edge.id_text(field).ok_or_else(|| SplitError::MissingField {
        section: Section::Edges.key(),
        index: index as u64,
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::read_lines;
    use serde_json::json;
    use tempfile::TempDir;

    fn edge(out_v: serde_json::Value, in_v: serde_json::Value) -> Result<Record> {
        Ok([("_outV", out_v), ("_inV", in_v), ("_label", json!("knows"))]
            .into_iter()
            .collect())
    }

    #[test]
    fn test_shard_for_deterministic_and_in_range() {
        let router = ShardRouter::new(8);
        let a = router.shard_for("1", "2");
        assert_eq!(a, router.shard_for("1", "2"));
        assert!(a < 8);
    }

    #[test]
    fn test_separator_disambiguates() {
        // "1" + "23" and "12" + "3" concatenate to the same text.
        let router = ShardRouter::new(1 << 20);
        assert_ne!(router.shard_for("1", "23"), router.shard_for("12", "3"));
    }

    #[test]
    fn test_single_shard_all_same() {
        let router = ShardRouter::new(1);
        assert_eq!(router.shard_for("a", "b"), 0);
        assert_eq!(router.shard_for("c", "d"), 0);
    }

    #[test]
    #[should_panic(expected = "shard_count must be > 0")]
    fn test_zero_shards_panics() {
        ShardRouter::new(0);
    }

    #[test]
    fn test_partition_is_exhaustive_and_reproducible() {
        let dir = TempDir::new().unwrap();
        let fields = FieldNames::default();
        let input = || (0..500).map(|i| edge(json!(i), json!((i * 7) % 500)));

        let first_dir = dir.path().join("a");
        let second_dir = dir.path().join("b");
        std::fs::create_dir_all(&first_dir).unwrap();
        std::fs::create_dir_all(&second_dir).unwrap();

        let router = ShardRouter::new(5);
        let first = EdgeSharder::new(router, &fields, &first_dir).run(input()).unwrap();
        let second = EdgeSharder::new(router, &fields, &second_dir).run(input()).unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(first.iter().map(|s| s.edges).sum::<u64>(), 500);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.edges, b.edges);
            assert_eq!(std::fs::read(&a.path).unwrap(), std::fs::read(&b.path).unwrap());
        }

        for shard in &first {
            for rec in read_lines(&shard.path).unwrap() {
                let rec = rec.unwrap();
                let out_v = rec.id_text("_outV").unwrap();
                let in_v = rec.id_text("_inV").unwrap();
                assert_eq!(router.shard_for(&out_v, &in_v), shard.index);
            }
        }
    }

    #[test]
    fn test_missing_endpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let fields = FieldNames::default();
        let input = vec![
            edge(json!(1), json!(2)),
            Ok([("_outV", json!(1))].into_iter().collect()),
        ];
        let err = EdgeSharder::new(ShardRouter::new(2), &fields, dir.path())
            .run(input)
            .unwrap_err();
        assert!(matches!(err, SplitError::MissingField { index: 1, .. }));
    }
}
