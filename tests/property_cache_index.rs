//! Property tests for the Cache Index (`proxide::core::cache::Cache`):
//! the capacity invariant, key uniqueness, and the detach/push_front
//! round trip, checked against arbitrary sequences of operations rather
//! than the handful of example traces in the unit tests.

use std::collections::HashSet;

use proptest::prelude::*;
use proxide::core::cache::entry::EntryBuilder;
use proxide::core::cache::Cache;

fn entry(key: &str) -> std::sync::Arc<proxide::core::cache::CacheEntry> {
    EntryBuilder::new(key).finish()
}

/// `len() + space_left() == capacity()` must hold after every operation,
/// no matter how many pushes are attempted against a too-small cache.
proptest! {
    #[test]
    fn capacity_invariant_holds_after_arbitrary_pushes(
        capacity in 1usize..8,
        keys in prop::collection::vec("[a-f]", 0..20),
    ) {
        let cache = Cache::new(capacity);
        for key in &keys {
            let _ = cache.push_front(entry(key));
            prop_assert_eq!(cache.len() + cache.space_left(), cache.capacity());
            prop_assert!(cache.len() <= cache.capacity());
        }
    }
}

/// However many times the same key is pushed, the index never holds more
/// than one entry per key -- duplicate pushes are naturally bounded out
/// by capacity, but the uniqueness property is about identity of keys
/// actually resident, not about rejecting duplicate pushes outright.
proptest! {
    #[test]
    fn resident_keys_are_always_unique(
        capacity in 1usize..8,
        keys in prop::collection::vec("[a-c]", 0..20),
    ) {
        let cache = Cache::new(capacity);
        for key in &keys {
            if cache.find_and_detach(key).is_none() {
                let _ = cache.push_front(entry(key));
            } else {
                // Already resident: re-detach above already removed it,
                // so pushing it back simulates a promote-style refresh.
                let _ = cache.push_front(entry(key));
            }
        }

        let mut seen = HashSet::new();
        while let Some(e) = cache.pop_back() {
            prop_assert!(seen.insert(e.key.clone()), "duplicate key resident: {}", e.key);
        }
    }
}

/// Detaching an entry and immediately pushing it back must be a no-op on
/// the cache's size bookkeeping, for any key drawn from any position.
proptest! {
    #[test]
    fn detach_then_push_front_round_trip_preserves_size(
        capacity in 2usize..8,
        fill in 1usize..8,
        pick in 0usize..8,
    ) {
        let fill = fill.min(capacity);
        let cache = Cache::new(capacity);
        let keys: Vec<String> = (0..fill).map(|i| format!("k{i}")).collect();
        for k in &keys {
            cache.push_front(entry(k)).unwrap();
        }

        let before_len = cache.len();
        let before_space = cache.space_left();

        let target = &keys[pick % keys.len()];
        if let Some(e) = cache.find_and_detach(target) {
            prop_assert_eq!(cache.len(), before_len - 1);
            cache.push_front(e).unwrap();
            prop_assert_eq!(cache.len(), before_len);
            prop_assert_eq!(cache.space_left(), before_space);
        }
    }
}

/// `find_and_promote` never changes which keys are resident, only their
/// order -- membership before and after a promote must be identical.
proptest! {
    #[test]
    fn promote_preserves_membership(
        capacity in 2usize..8,
        fill in 1usize..8,
        pick in 0usize..8,
    ) {
        let fill = fill.min(capacity);
        let cache = Cache::new(capacity);
        let keys: Vec<String> = (0..fill).map(|i| format!("k{i}")).collect();
        for k in &keys {
            cache.push_front(entry(k)).unwrap();
        }

        let mut before: Vec<String> = Vec::new();
        while let Some(e) = cache.pop_back() {
            before.push(e.key.clone());
            cache.push_front(e).unwrap();
        }
        before.sort();

        let target = &keys[pick % keys.len()];
        cache.find_and_promote(target);

        let mut after: Vec<String> = Vec::new();
        while let Some(e) = cache.pop_back() {
            after.push(e.key.clone());
            cache.push_front(e).unwrap();
        }
        after.sort();

        prop_assert_eq!(before, after);
    }
}
