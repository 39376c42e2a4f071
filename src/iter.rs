//! Live-scan iteration over keys, values and entries.
//!
//! Each view walks the slot array front to back, skipping vacant slots.
//! The scan is live: mutations performed while an iterator runs may or may
//! not be reflected, but a stably-resident key is yielded at most once
//! (entries never move between slots) and the iterators re-check every
//! slot at the moment it is visited rather than trusting an earlier peek.

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;

use crossbeam_epoch::{pin, Guard};

use crate::map::MapCore;

/// Iterator over `(key, value)` pairs. Created by `iter`.
pub struct Iter<'a, K, V, S> {
    core: &'a MapCore<K, V, S>,
    cursor: usize,
    guard: Guard,
}

/// Iterator over keys. Created by `keys`.
pub struct Keys<'a, K, V, S> {
    core: &'a MapCore<K, V, S>,
    cursor: usize,
    guard: Guard,
}

/// Iterator over values. Created by `values`.
pub struct Values<'a, K, V, S> {
    core: &'a MapCore<K, V, S>,
    cursor: usize,
    guard: Guard,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(core: &'a MapCore<K, V, S>) -> Self {
        Self {
            core,
            cursor: 0,
            guard: pin(),
        }
    }
}

impl<'a, K, V, S> Keys<'a, K, V, S> {
    pub(crate) fn new(core: &'a MapCore<K, V, S>) -> Self {
        Self {
            core,
            cursor: 0,
            guard: pin(),
        }
    }
}

impl<'a, K, V, S> Values<'a, K, V, S> {
    pub(crate) fn new(core: &'a MapCore<K, V, S>) -> Self {
        Self {
            core,
            cursor: 0,
            guard: pin(),
        }
    }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        while self.cursor < self.core.slots.len() {
            let index = self.cursor;
            self.cursor += 1;

            let record_ptr = self.core.slots[index].load(Ordering::Acquire, &self.guard);
            // SAFETY: guard-protected; records are reclaimed only after
            // every pinned reader moves on.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let key_ptr = record.key.load(Ordering::Acquire, &self.guard);
            // SAFETY: as above.
            let Some(key) = (unsafe { key_ptr.as_ref() }) else {
                continue;
            };
            let value_ptr = record.value.load(Ordering::Acquire, &self.guard);
            // SAFETY: as above.
            let Some(value) = (unsafe { value_ptr.as_ref() }) else {
                continue;
            };
            if !self.core.validate(key, value) {
                // The slot was recycled between the key and value loads.
                continue;
            }
            return Some((key.clone(), value.clone()));
        }
        None
    }
}

impl<'a, K, V, S> Iterator for Keys<'a, K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        while self.cursor < self.core.slots.len() {
            let index = self.cursor;
            self.cursor += 1;

            let record_ptr = self.core.slots[index].load(Ordering::Acquire, &self.guard);
            // SAFETY: guard-protected, as in `Iter::next`.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let key_ptr = record.key.load(Ordering::Acquire, &self.guard);
            // SAFETY: as above.
            let Some(key) = (unsafe { key_ptr.as_ref() }) else {
                continue;
            };
            return Some(key.clone());
        }
        None
    }
}

impl<'a, K, V, S> Iterator for Values<'a, K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        while self.cursor < self.core.slots.len() {
            let index = self.cursor;
            self.cursor += 1;

            let record_ptr = self.core.slots[index].load(Ordering::Acquire, &self.guard);
            // SAFETY: guard-protected, as in `Iter::next`.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let key_ptr = record.key.load(Ordering::Acquire, &self.guard);
            // SAFETY: as above.
            let Some(key) = (unsafe { key_ptr.as_ref() }) else {
                continue;
            };
            let value_ptr = record.value.load(Ordering::Acquire, &self.guard);
            // SAFETY: as above.
            let Some(value) = (unsafe { value_ptr.as_ref() }) else {
                continue;
            };
            if !self.core.validate(key, value) {
                continue;
            }
            return Some(value.clone());
        }
        None
    }
}
