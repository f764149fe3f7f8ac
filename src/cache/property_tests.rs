//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the capacity, expiry and eviction-order guarantees.

use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::cache::{DataCache, LruStore, SweepCache, SweepStore, TimedCache};
use crate::tasks::Scheduler;

// == Test Configuration ==
const TEST_HOLD_TIME: Duration = Duration::from_secs(300);

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,16}".prop_map(|s| s)
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Add { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Add { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn unique(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any sequence of operations, hits and misses match what callers observed.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = SweepStore::new(20, TEST_HOLD_TIME);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Add { key, value } => store.add(key, value),
                CacheOp::Get { key } => match store.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Delete { key } => {
                    store.delete(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, store.len(), "Total entries mismatch");
    }

    // Size never exceeds max_records once `add` returns, for either strategy.
    #[test]
    fn prop_capacity_enforcement(
        ops in prop::collection::vec(cache_op_strategy(), 1..200),
        max_records in 1usize..20,
    ) {
        let mut sweep = SweepStore::new(max_records, TEST_HOLD_TIME);
        let mut lru = LruStore::new(max_records);

        for op in ops {
            match op {
                CacheOp::Add { key, value } => {
                    sweep.add(key.clone(), value.clone());
                    lru.add(key, value);
                    prop_assert!(sweep.len() <= max_records, "sweep size {} > {}", sweep.len(), max_records);
                    prop_assert!(lru.len() <= max_records, "lru size {} > {}", lru.len(), max_records);
                }
                CacheOp::Get { key } => {
                    sweep.get(&key);
                    lru.get(&key);
                }
                CacheOp::Delete { key } => {
                    sweep.delete(&key);
                    lru.delete(&key);
                }
            }
        }
    }

    // Overwrite returns the newest value and keeps a single entry.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let mut store = LruStore::new(10);

        store.add(key.clone(), value1);
        store.add(key.clone(), value2.clone());

        prop_assert_eq!(store.get(&key), Some(value2));
        prop_assert_eq!(store.len(), 1);
    }

    // The LRU store behaves exactly like a naive recency list.
    #[test]
    fn prop_lru_matches_reference_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..150),
        max_records in 1usize..8,
    ) {
        let mut store = LruStore::new(max_records);
        // front = most recently used
        let mut model: VecDeque<(String, String)> = VecDeque::new();

        for op in ops {
            match op {
                CacheOp::Add { key, value } => {
                    store.add(key.clone(), value.clone());
                    model.retain(|(k, _)| k != &key);
                    model.push_front((key, value));
                    if model.len() > max_records {
                        model.pop_back();
                    }
                }
                CacheOp::Get { key } => {
                    let expected = model.iter().position(|(k, _)| k == &key).map(|pos| {
                        let entry = model.remove(pos).unwrap_or_default();
                        let value = entry.1.clone();
                        model.push_front(entry);
                        value
                    });
                    prop_assert_eq!(store.get(&key), expected);
                }
                CacheOp::Delete { key } => {
                    model.retain(|(k, _)| k != &key);
                    store.delete(&key);
                }
            }
            prop_assert_eq!(store.len(), model.len());
        }
    }

    // Touching the would-be victim moves eviction to the next oldest key.
    #[test]
    fn prop_lru_access_tracking(
        keys in prop::collection::vec(valid_key_strategy(), 3..8),
        new_key in valid_key_strategy(),
        new_value in valid_value_strategy()
    ) {
        let unique_keys = unique(keys);
        prop_assume!(unique_keys.len() >= 3);
        prop_assume!(!unique_keys.contains(&new_key));

        let mut store = LruStore::new(unique_keys.len());
        for key in &unique_keys {
            store.add(key.clone(), format!("value_{}", key));
        }

        let accessed_key = unique_keys[0].clone();
        store.get(&accessed_key);
        store.add(new_key.clone(), new_value);

        prop_assert!(store.contains(&accessed_key));
        prop_assert!(!store.contains(&unique_keys[1]));
        prop_assert!(store.contains(&new_key));
    }
}

// Time-based properties run on a paused clock.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    // An entry added at T is absent by T + max_hold_time + sweep_interval.
    #[test]
    fn prop_entry_absent_after_hold_plus_interval(
        hold_ms in 1u64..500,
        interval_ms in 1u64..200,
        key in valid_key_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let present = runtime.block_on(async {
            let cache: SweepCache<String, u8> =
                TimedCache::new(SweepStore::new(16, Duration::from_millis(hold_ms)));
            let scheduler = Scheduler::new();
            scheduler
                .register("cache", Duration::from_millis(interval_ms), cache.sweep_task())
                .await;
            scheduler.start().await;

            cache.add(key.clone(), 1).await;
            tokio::time::sleep(Duration::from_millis(hold_ms + interval_ms + 1)).await;

            let present = cache.contains(&key).await;
            scheduler.shutdown().await;
            present
        });

        prop_assert!(!present, "entry survived hold {}ms + interval {}ms", hold_ms, interval_ms);
    }
}
