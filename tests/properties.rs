//! Property tests: routing determinism and membership partition invariants.

use std::collections::{HashMap, HashSet};

use graph_split::membership::{InsertOutcome, Membership, MembershipWriter};
use graph_split::rng::{derive, Stream};
use graph_split::sharder::ShardRouter;
use graph_split::vertex::VertexSplitter;
use graph_split::writer::ArrayWriter;
use graph_split::{Category, Record, VertexKey};
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn category(load: bool) -> Category {
    if load {
        Category::Load
    } else {
        Category::Update
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn routing_is_deterministic_and_in_range(
        out_v in "[a-z0-9]{1,12}",
        in_v in "[a-z0-9]{1,12}",
        shards in 1usize..64,
    ) {
        let router = ShardRouter::new(shards);
        let shard = router.shard_for(&out_v, &in_v);
        prop_assert!(shard < shards);
        prop_assert_eq!(shard, ShardRouter::new(shards).shard_for(&out_v, &in_v));
    }

    #[test]
    fn membership_matches_first_wins_model(
        ops in prop::collection::vec((0u32..300, any::<bool>()), 1..600),
        buffer in 1usize..64,
    ) {
        let dir = TempDir::new().unwrap();
        let mut writer = MembershipWriter::create(&dir.path().join("m"), buffer).unwrap();
        let mut model: HashMap<VertexKey, Category> = HashMap::new();

        for (id, load) in ops {
            let key = VertexKey::from_text(&id.to_string());
            let outcome = writer.insert(key, category(load)).unwrap();
            match model.get(&key) {
                Some(&first) => prop_assert_eq!(outcome, InsertOutcome::Existing(first)),
                None => {
                    prop_assert_eq!(outcome, InsertOutcome::Inserted);
                    model.insert(key, category(load));
                }
            }
        }

        let index = writer.freeze().unwrap();
        for id in 0u32..300 {
            let key = VertexKey::from_text(&id.to_string());
            for cat in Category::ALL {
                prop_assert_eq!(index.contains(key, cat), model.get(&key) == Some(&cat));
            }
        }
    }

    #[test]
    fn vertex_split_partitions_distinct_ids(
        ids in prop::collection::vec(0u32..500, 0..400),
        split in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let dir = TempDir::new().unwrap();
        let mut store = MembershipWriter::create(&dir.path().join("m"), 50).unwrap();
        let mut load = ArrayWriter::create(dir.path().join("load.json")).unwrap();
        let mut update = ArrayWriter::create(dir.path().join("update.json")).unwrap();

        let input: Vec<_> = ids
            .iter()
            .map(|&id| Ok([("_id", json!(id))].into_iter().collect::<Record>()))
            .collect();
        let stats = VertexSplitter::new("_id", split, derive(seed, Stream::Vertices))
            .run(input, &mut store, &mut load, &mut update)
            .unwrap();
        load.finish().unwrap();
        update.finish().unwrap();
        let index = store.freeze().unwrap();

        let distinct: HashSet<u32> = ids.iter().copied().collect();
        prop_assert_eq!(stats.load + stats.update, distinct.len() as u64);
        prop_assert_eq!(stats.duplicates as usize, ids.len() - distinct.len());
        for id in distinct {
            let key = VertexKey::from_text(&id.to_string());
            prop_assert!(index.contains(key, Category::Load) ^ index.contains(key, Category::Update));
        }
    }
}
