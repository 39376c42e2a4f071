//! The per-position slot record.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic};

/// One position's record in the slot array.
///
/// A record is created lazily the first time its index receives an entry
/// and, when recycling is enabled, survives deletions: the key and value
/// pointers are nulled in place so a later insertion can reuse the record
/// without allocating.
///
/// The key pointer is the liveness gate. Readers load it with acquire
/// ordering and treat null as vacant; the writer publishes it last, after
/// the value and probe depth, so any reader that observes a key also
/// observes the fields it covers.
pub(crate) struct Slot<K, V> {
    /// Index of this record in the slot array. Fixed at creation.
    pub(crate) home_index: usize,
    /// Ordinal of the hash function that placed the resident entry;
    /// zero when vacant.
    pub(crate) probe_depth: AtomicUsize,
    /// The resident key, or null when the slot is vacant.
    pub(crate) key: Atomic<K>,
    /// The resident value, or null when the slot is vacant.
    pub(crate) value: Atomic<V>,
}

impl<K, V> Slot<K, V> {
    /// A fully initialized live record, ready to be published with a
    /// single release store of the record pointer.
    pub(crate) fn new_live(home_index: usize, probe_depth: usize, key: K, value: V) -> Self {
        Self {
            home_index,
            probe_depth: AtomicUsize::new(probe_depth),
            key: Atomic::new(key),
            value: Atomic::new(value),
        }
    }
}

impl<K, V> Drop for Slot<K, V> {
    fn drop(&mut self) {
        // A record is only dropped once reclamation has quiesced every
        // reader that could still reach it, so the remaining boxes are
        // exclusively ours.
        let guard = unsafe { epoch::unprotected() };
        let key = self.key.load(Ordering::Relaxed, guard);
        if !key.is_null() {
            drop(unsafe { key.into_owned() });
        }
        let value = self.value.load(Ordering::Relaxed, guard);
        if !value.is_null() {
            drop(unsafe { value.into_owned() });
        }
    }
}
