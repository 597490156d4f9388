//! Vertex pass: assign every vertex to Load or Update.
//!
//! One uniform draw per vertex record, in input order: below `split_ratio`
//! is Load, otherwise Update. The record goes to the matching output and its
//! key into the membership store. A vertex id seen before keeps its first
//! category and the later record is dropped from both outputs.

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SplitError};
use crate::membership::{InsertOutcome, MembershipWriter};
use crate::reader::Section;
use crate::record::{Category, Record};
use crate::writer::ArrayWriter;

/// Counts from one vertex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VertexStats {
    pub read: u64,
    pub load: u64,
    pub update: u64,
    pub duplicates: u64,
}

pub struct VertexSplitter<'a> {
    id_field: &'a str,
    split_ratio: f64,
    rng: StdRng,
}

impl<'a> VertexSplitter<'a> {
    pub fn new(id_field: &'a str, split_ratio: f64, rng: StdRng) -> Self {
        Self {
            id_field,
            split_ratio,
            rng,
        }
    }

    /// Consume the vertex stream once. Output writers are left open; the
    /// caller finishes them after the store is frozen.
    pub fn run<I>(
        mut self,
        vertices: I,
        store: &mut MembershipWriter,
        load_out: &mut ArrayWriter,
        update_out: &mut ArrayWriter,
    ) -> Result<VertexStats>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut stats = VertexStats::default();

        for (index, vertex) in vertices.into_iter().enumerate() {
            let vertex = vertex?;
            stats.read += 1;

            let key = vertex.key(self.id_field).ok_or_else(|| SplitError::MissingField {
                section: Section::Vertices.key(),
                index: index as u64,
                field: self.id_field.to_string(),
            })?;

            let category = if self.rng.random::<f64>() < self.split_ratio {
                Category::Load
            } else {
                Category::Update
            };

            match store.insert(key, category)? {
                InsertOutcome::Inserted => match category {
                    Category::Load => {
                        load_out.push(&vertex)?;
                        stats.load += 1;
                    }
                    Category::Update => {
                        update_out.push(&vertex)?;
                        stats.update += 1;
                    }
                },
                InsertOutcome::Existing(first) => {
                    debug!(index, id = %key, %first, "duplicate vertex id ignored");
                    stats.duplicates += 1;
                }
            }

            if stats.read % 1_000_000 == 0 {
                info!(vertices = stats.read, "vertex pass progress");
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::Membership;
    use crate::rng::{derive, Stream};
    use serde_json::json;
    use tempfile::TempDir;

    fn vertex(id: serde_json::Value) -> Result<Record> {
        Ok([("_id", id), ("label", json!("person"))].into_iter().collect())
    }

    struct Harness {
        dir: TempDir,
        store: MembershipWriter,
        load: ArrayWriter,
        update: ArrayWriter,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = MembershipWriter::create(&dir.path().join("m"), 32).unwrap();
        let load = ArrayWriter::create(dir.path().join("load.json")).unwrap();
        let update = ArrayWriter::create(dir.path().join("update.json")).unwrap();
        Harness { dir, store, load, update }
    }

    #[test]
    fn test_split_one_puts_everything_in_load() {
        let mut h = harness();
        let splitter = VertexSplitter::new("_id", 1.0, derive(1, Stream::Vertices));
        let stats = splitter
            .run(
                vec![vertex(json!(1)), vertex(json!(2)), vertex(json!(3))],
                &mut h.store,
                &mut h.load,
                &mut h.update,
            )
            .unwrap();

        assert_eq!(stats, VertexStats { read: 3, load: 3, update: 0, duplicates: 0 });
        assert_eq!(h.load.finish().unwrap(), 3);
        assert_eq!(h.update.finish().unwrap(), 0);
        let text = std::fs::read_to_string(h.dir.path().join("update.json")).unwrap();
        assert_eq!(text, "[]\n");
    }

    #[test]
    fn test_split_zero_puts_everything_in_update() {
        let mut h = harness();
        let splitter = VertexSplitter::new("_id", 0.0, derive(1, Stream::Vertices));
        let input: Vec<_> = (0..20).map(|i| vertex(json!(i))).collect();
        let stats = splitter.run(input, &mut h.store, &mut h.load, &mut h.update).unwrap();
        assert_eq!(stats.update, 20);
        assert_eq!(stats.load, 0);
    }

    #[test]
    fn test_duplicates_keep_first_assignment() {
        let mut h = harness();
        let splitter = VertexSplitter::new("_id", 0.5, derive(3, Stream::Vertices));
        let mut input: Vec<_> = (0..200).map(|i| vertex(json!(i))).collect();
        input.extend((0..200).map(|i| vertex(json!(i.to_string()))));

        let stats = splitter.run(input, &mut h.store, &mut h.load, &mut h.update).unwrap();
        assert_eq!(stats.read, 400);
        assert_eq!(stats.duplicates, 200);
        assert_eq!(stats.load + stats.update, 200);

        let index = h.store.freeze().unwrap();
        assert_eq!(index.count(Category::Load), stats.load);
        assert_eq!(index.count(Category::Update), stats.update);
        for i in 0..200 {
            let k = crate::record::VertexKey::of(&json!(i)).unwrap();
            assert!(index.contains(k, Category::Load) ^ index.contains(k, Category::Update));
        }
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let mut h = harness();
        let splitter = VertexSplitter::new("_id", 0.5, derive(3, Stream::Vertices));
        let input = vec![
            vertex(json!(1)),
            Ok([("name", json!("no id"))].into_iter().collect()),
        ];
        let err = splitter.run(input, &mut h.store, &mut h.load, &mut h.update).unwrap_err();
        match err {
            SplitError::MissingField { section, index, field } => {
                assert_eq!(section, "vertices");
                assert_eq!(index, 1);
                assert_eq!(field, "_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_upstream_error_propagates() {
        let mut h = harness();
        let splitter = VertexSplitter::new("_id", 0.5, derive(3, Stream::Vertices));
        let input = vec![vertex(json!(1)), Err(SplitError::InvalidFormat("boom".into()))];
        assert!(splitter.run(input, &mut h.store, &mut h.load, &mut h.update).is_err());
    }
}
