use std::hash::{BuildHasher, Hasher};

use swmr_map::{with_capacity, Builder, InsertError};

/// Hashes every input to the same bucket, regardless of the probe ordinal.
/// Turns probe-family exhaustion into a deterministic event.
#[derive(Clone, Default)]
struct Collider;

struct ColliderHasher;

impl BuildHasher for Collider {
    type Hasher = ColliderHasher;

    fn build_hasher(&self) -> ColliderHasher {
        ColliderHasher
    }
}

impl Hasher for ColliderHasher {
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

#[test]
fn insert_and_get() {
    let (mut writer, reader) = with_capacity(64);
    assert_eq!(writer.insert(1, 100), Ok(None));
    assert_eq!(writer.insert(2, 200), Ok(None));
    assert_eq!(reader.get(&1), Some(100));
    assert_eq!(reader.get(&2), Some(200));
    assert_eq!(reader.get(&3), None);
}

#[test]
fn insert_replace_returns_prior() {
    let (mut writer, reader) = with_capacity(64);
    assert_eq!(writer.insert(1, 10), Ok(None));
    assert_eq!(writer.insert(1, 20), Ok(Some(10)));
    assert_eq!(writer.insert(1, 30), Ok(Some(20)));
    assert_eq!(reader.get(&1), Some(30));
    assert_eq!(writer.len(), 1);
}

#[test]
fn overwrite_same_value_is_idempotent() {
    let (mut writer, _reader) = with_capacity(64);
    writer.insert(5, 55).unwrap();
    let before = writer.len();
    assert_eq!(writer.insert(5, 55), Ok(Some(55)));
    assert_eq!(writer.len(), before);
}

#[test]
fn remove_returns_value_and_is_idempotent() {
    let (mut writer, reader) = with_capacity(64);
    writer.insert(1, 100).unwrap();
    writer.insert(2, 200).unwrap();

    assert_eq!(writer.remove(&1), Some(100));
    assert_eq!(reader.get(&1), None);
    assert_eq!(writer.len(), 1);
    // Second removal of the same key is a no-op.
    assert_eq!(writer.remove(&1), None);
    assert_eq!(writer.len(), 1);
    assert_eq!(reader.get(&2), Some(200));
}

#[test]
fn reinsert_after_remove_round_trips() {
    let (mut writer, reader) = with_capacity(64);
    writer.insert(7, 70).unwrap();
    writer.remove(&7);
    assert_eq!(writer.insert(7, 71), Ok(None));
    assert_eq!(reader.get(&7), Some(71));
}

#[test]
fn len_and_is_empty() {
    let (mut writer, reader) = with_capacity(64);
    assert!(reader.is_empty());
    assert_eq!(reader.len(), 0);

    writer.insert(1, 1).unwrap();
    writer.insert(2, 2).unwrap();
    assert!(!reader.is_empty());
    assert_eq!(reader.len(), 2);

    writer.remove(&1);
    assert_eq!(reader.len(), 1);
}

#[test]
fn clear_empties_everything() {
    let (mut writer, reader) = with_capacity(256);
    for i in 0..100 {
        writer.insert(i, i * 10).unwrap();
    }
    assert_eq!(writer.len(), 100);

    writer.clear();
    assert!(reader.is_empty());
    assert_eq!(writer.max_probe_depth_in_use(), 0);
    for i in 0..100 {
        assert_eq!(reader.get(&i), None);
    }

    // The map is fully usable again.
    writer.insert(3, 33).unwrap();
    assert_eq!(reader.get(&3), Some(33));
}

#[test]
fn contains_key_and_value() {
    let (mut writer, reader) = with_capacity(64);
    writer.insert(1, 11).unwrap();
    writer.insert(2, 22).unwrap();

    assert!(reader.contains_key(&1));
    assert!(!reader.contains_key(&9));
    assert!(reader.contains_value(&22));
    assert!(!reader.contains_value(&33));

    writer.remove(&2);
    assert!(!writer.contains_key(&2));
    assert!(!writer.contains_value(&22));
}

#[test]
fn insert_if_absent_keeps_the_resident_value() {
    let (mut writer, reader) = with_capacity(64);
    assert_eq!(writer.insert_if_absent(1, 100), Ok(None));
    assert_eq!(writer.insert_if_absent(1, 200), Ok(Some(100)));
    assert_eq!(reader.get(&1), Some(100));
}

#[test]
fn get_or_insert() {
    let (mut writer, _reader) = with_capacity(64);
    assert_eq!(writer.get_or_insert(1, 100), Ok(100));
    assert_eq!(writer.get_or_insert(1, 200), Ok(100));
    assert_eq!(writer.len(), 1);
}

#[test]
fn iteration_yields_every_live_entry_once() {
    let (mut writer, reader) = with_capacity(256);
    for i in 0..50u64 {
        writer.insert(i, i * 2).unwrap();
    }
    writer.remove(&10);
    writer.remove(&20);

    let mut entries: Vec<(u64, u64)> = reader.iter().collect();
    entries.sort_unstable();
    assert_eq!(entries.len(), 48);
    for (key, value) in entries {
        assert_ne!(key, 10);
        assert_ne!(key, 20);
        assert_eq!(value, key * 2);
    }

    let mut keys: Vec<u64> = reader.keys().collect();
    keys.sort_unstable();
    let expected: Vec<u64> = (0..50).filter(|k| *k != 10 && *k != 20).collect();
    assert_eq!(keys, expected);

    let mut values: Vec<u64> = reader.values().collect();
    values.sort_unstable();
    let expected: Vec<u64> = expected.iter().map(|k| k * 2).collect();
    assert_eq!(values, expected);
}

#[test]
fn live_count_matches_iteration_after_mixed_operations() {
    let (mut writer, reader) = with_capacity(1024);
    for i in 0..600u64 {
        writer.insert(i, i).unwrap();
    }
    for i in (0..600u64).step_by(3) {
        writer.remove(&i);
    }
    for i in 600..700u64 {
        writer.insert(i, i).unwrap();
    }

    assert_eq!(reader.iter().count(), reader.len());
    assert_eq!(writer.len(), 600 - 200 + 100);
}

#[test]
fn max_probe_depth_tracks_live_entries() {
    let (mut writer, reader) = with_capacity(4096);
    assert_eq!(reader.max_probe_depth_in_use(), 0);

    for i in 0..2048u64 {
        writer.insert(i, i).unwrap();
    }
    let depth = reader.max_probe_depth_in_use();
    assert!(depth >= 1);
    assert!(depth <= 50);

    for i in 0..2048u64 {
        writer.remove(&i);
    }
    assert_eq!(reader.max_probe_depth_in_use(), 0);
}

#[test]
fn pop_random_value_drains_the_map() {
    let (mut writer, _reader) = with_capacity(64);
    for i in 0..20u64 {
        writer.insert(i, i + 1000).unwrap();
    }

    let mut popped = Vec::new();
    for _ in 0..20 {
        popped.push(writer.pop_random_value());
    }
    popped.sort_unstable();
    let expected: Vec<u64> = (1000..1020).collect();
    assert_eq!(popped, expected);
    assert!(writer.is_empty());
}

#[test]
#[should_panic(expected = "empty map")]
fn pop_random_value_panics_when_empty() {
    let (mut writer, _reader) = with_capacity::<u64, u64>(64);
    writer.pop_random_value();
}

#[test]
fn capacity_refusal_still_allows_overwrites() {
    let capacity = 128;
    let (mut writer, _reader) = with_capacity(capacity);
    for i in 0..capacity as u64 {
        writer.insert(i, i).unwrap();
    }
    assert_eq!(writer.len(), capacity);

    // A brand-new key is refused at the ceiling.
    assert_eq!(writer.insert(999_999, 1), Err(InsertError::CapacityReached));
    // Overwriting a resident key is not an insertion.
    assert_eq!(writer.insert(5, 50), Ok(Some(5)));
    assert_eq!(writer.len(), capacity);

    // Freeing one slot makes the new key placeable again.
    writer.remove(&0);
    assert_eq!(writer.insert(999_999, 1), Ok(None));
}

#[test]
fn probe_family_exhaustion_is_reported() {
    // With every hash colliding, the second distinct key has nowhere to go.
    let (mut writer, _reader) = Builder::new(8)
        .max_probes(10)
        .hasher(Collider)
        .build();
    assert_eq!(writer.insert(1u64, 10u64), Ok(None));
    assert_eq!(writer.insert(2, 20), Err(InsertError::ProbesExhausted));
    // The resident key is still updatable.
    assert_eq!(writer.insert(1, 11), Ok(Some(10)));
    assert_eq!(writer.len(), 1);
}

#[test]
fn borrowed_key_lookup() {
    let (mut writer, reader) = with_capacity(64);
    writer.insert(String::from("alpha"), 1).unwrap();
    writer.insert(String::from("beta"), 2).unwrap();

    assert_eq!(reader.get("alpha"), Some(1));
    assert!(reader.contains_key("beta"));
    assert_eq!(writer.remove("alpha"), Some(1));
    assert_eq!(reader.get("alpha"), None);
}

#[test]
fn readers_clone_freely() {
    let (mut writer, reader) = with_capacity(64);
    writer.insert(1, 10).unwrap();
    let second = reader.clone();
    let third = second.clone();
    assert_eq!(second.get(&1), Some(10));
    assert_eq!(third.len(), 1);
}

#[test]
fn max_capacity_is_reported() {
    let (writer, reader) = with_capacity::<u64, u64>(777);
    assert_eq!(writer.max_capacity(), 777);
    assert_eq!(reader.max_capacity(), 777);
}

#[test]
#[should_panic(expected = "max_capacity")]
fn zero_capacity_is_rejected() {
    let _ = with_capacity::<u64, u64>(0);
}

#[test]
#[should_panic(expected = "load_factor")]
fn out_of_range_load_factor_is_rejected() {
    let _ = Builder::<u64, u64>::new(10).load_factor(1.5).build();
}

#[test]
#[should_panic(expected = "max_probes")]
fn zero_probe_family_is_rejected() {
    let _ = Builder::<u64, u64>::new(10).max_probes(0).build();
}
