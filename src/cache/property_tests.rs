//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the codec round trip and the engine's
//! read-after-write behavior against a model.

use std::collections::HashMap;

use proptest::prelude::*;
use tempfile::TempDir;

use crate::cache::{
    CacheEngine, CacheEntry, DocumentLayout, Entries, EntryCodec, WriteOutcome,
};
use crate::config::CacheOptions;

// == Test Configuration ==
const TEST_MAX_BYTES: usize = 1024 * 1024;

// == Strategies ==
/// Generates valid cache keys (non-empty)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}".prop_map(|s| s)
}

/// Generates arbitrary unicode values, control characters included
fn any_value_strategy() -> impl Strategy<Value = String> {
    any::<String>()
}

fn entry_strategy() -> impl Strategy<Value = CacheEntry> {
    (
        any_value_strategy(),
        proptest::option::of(any_value_strategy()),
        proptest::option::of(0i64..4_000_000_000i64),
    )
        .prop_map(|(value, extra, expires)| CacheEntry {
            value,
            extra,
            expires_at: expires.and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
        })
}

fn entries_strategy() -> impl Strategy<Value = Entries> {
    prop::collection::vec((any::<String>(), entry_strategy()), 0..20)
        .prop_map(|pairs| pairs.into_iter().collect())
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Remove { key: String },
    Clear,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "k[0-4]";
    prop_oneof![
        4 => (key, "[a-z]{0,8}").prop_map(|(key, value)| CacheOp::Set { key, value }),
        2 => key.prop_map(|key| CacheOp::Remove { key }),
        1 => Just(CacheOp::Clear),
    ]
}

fn test_engine(dir: &TempDir) -> CacheEngine {
    let mut options = CacheOptions::new(dir.path());
    options.second_part_of_cache_file_name = "PropertyTests".to_string();
    options.max_bytes_in_json_cache_file = TEST_MAX_BYTES;
    CacheEngine::new(&options, DocumentLayout::Plain).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // decode(encode(x)) == x for both layouts
    #[test]
    fn prop_codec_round_trip(entries in entries_strategy()) {
        for layout in [DocumentLayout::Plain, DocumentLayout::WithExtras] {
            let codec = EntryCodec::new(layout);
            let bytes = codec.encode(&entries).unwrap();
            let decoded = codec.decode(&bytes).unwrap();
            prop_assert_eq!(&decoded, &entries);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    // Set(k, v) then Get(k) returns v
    #[test]
    fn prop_set_then_get(key in valid_key_strategy(), value in any_value_strategy()) {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);

        engine.set_entry(&key, CacheEntry::new(value.clone())).unwrap();

        let read = engine.get_entry(&key).unwrap().map(|entry| entry.value);
        prop_assert_eq!(read, Some(value));
    }

    // Overwrite keeps one entry holding the last value
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in any_value_strategy(),
        value2 in any_value_strategy()
    ) {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);

        engine.set_entry(&key, CacheEntry::new(value1)).unwrap();
        engine.set_entry(&key, CacheEntry::new(value2.clone())).unwrap();

        let all = engine.get_all_values().unwrap();
        prop_assert_eq!(all.len(), 1);
        prop_assert_eq!(&all[&key], &value2);
    }

    // Removing an absent key changes nothing
    #[test]
    fn prop_remove_absent_is_noop(
        present in prop::collection::hash_map(valid_key_strategy(), "[a-z]{1,8}", 0..8),
        absent in "absent_[a-z]{1,8}"
    ) {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        for (key, value) in &present {
            engine.set_entry(key, CacheEntry::new(value.clone())).unwrap();
        }
        let before = engine.get_all_values().unwrap();

        prop_assert_eq!(engine.remove(&absent).unwrap(), WriteOutcome::Unchanged);
        prop_assert_eq!(engine.get_all_values().unwrap(), before);
    }

    // Any sequence of operations matches a HashMap model, and a second
    // instance reading the same file agrees with the writer.
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..30)) {
        let dir = TempDir::new().unwrap();
        let writer = test_engine(&dir);
        let reader = test_engine(&dir);
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    writer.set_entry(&key, CacheEntry::new(value.clone())).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Remove { key } => {
                    writer.remove(&key).unwrap();
                    model.remove(&key);
                }
                CacheOp::Clear => {
                    writer.clear_all().unwrap();
                    model.clear();
                }
            }
            prop_assert_eq!(&writer.get_all_values().unwrap(), &model);
        }

        prop_assert_eq!(&reader.get_all_values().unwrap(), &model);
    }

    // ClearAll always leaves nothing behind
    #[test]
    fn prop_clear_all_empties(
        present in prop::collection::hash_map(valid_key_strategy(), "[a-z]{1,8}", 0..8)
    ) {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        for (key, value) in &present {
            engine.set_entry(key, CacheEntry::new(value.clone())).unwrap();
        }

        engine.clear_all().unwrap();
        prop_assert!(engine.get_all_values().unwrap().is_empty());
    }
}
