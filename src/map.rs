//! Map core, builder and the writer/reader endpoints.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, pin, Atomic, Guard, Owned, Shared};
use foldhash::fast::FixedState;
use rand::Rng;

use crate::error::InsertError;
use crate::iter::{Iter, Keys, Values};
use crate::probe::{self, DepthHistogram};
use crate::slot::Slot;

pub(crate) type ValueToKey<K, V> = Box<dyn Fn(&V) -> K + Send + Sync>;

/// State shared between the writer and every reader.
pub(crate) struct MapCore<K, V, S> {
    pub(crate) slots: Box<[Atomic<Slot<K, V>>]>,
    pub(crate) mask: usize,
    max_capacity: usize,
    max_probes: usize,
    /// Live-entry count. Maintained by the writer, read by anyone.
    size: AtomicUsize,
    /// Largest probe depth any live entry currently uses. Lookups read it
    /// once at the start and never probe past it.
    depth_in_use: AtomicUsize,
    hasher: S,
    pub(crate) value_to_key: Option<ValueToKey<K, V>>,
}

impl<K, V, S> MapCore<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    #[inline]
    pub(crate) fn probe_index<Q>(&self, key: &Q, depth: usize) -> usize
    where
        Q: Hash + ?Sized,
    {
        probe::probe_index(&self.hasher, key, depth, self.mask)
    }

    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub(crate) fn max_probe_depth_in_use(&self) -> usize {
        self.depth_in_use.load(Ordering::Acquire)
    }

    pub(crate) fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Confirms that a value read from a slot still belongs to the resident
    /// key. Only meaningful when recycling is enabled; without a derivation
    /// slots are never reused, so nothing can go stale.
    #[inline]
    pub(crate) fn validate(&self, key: &K, value: &V) -> bool {
        match &self.value_to_key {
            Some(derive) => derive(value) == *key,
            None => true,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let depth_in_use = self.depth_in_use.load(Ordering::Acquire);
        let guard = pin();
        for depth in 1..=depth_in_use {
            let index = self.probe_index(key, depth);
            let record_ptr = self.slots[index].load(Ordering::Acquire, &guard);
            // SAFETY: record pointers stay valid while the guard is held;
            // detached records are only reclaimed after readers move on.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let key_ptr = record.key.load(Ordering::Acquire, &guard);
            // SAFETY: a non-null key was published with release ordering
            // and outlives the guard.
            let Some(resident) = (unsafe { key_ptr.as_ref() }) else {
                continue;
            };
            if resident.borrow() != key {
                continue;
            }
            let value_ptr = record.value.load(Ordering::Acquire, &guard);
            // SAFETY: as for the key pointer.
            let Some(value) = (unsafe { value_ptr.as_ref() }) else {
                // The writer is between clearing this value and the key
                // gate; the entry may already be resident at a deeper
                // probe position, so keep looking.
                continue;
            };
            if let Some(derive) = &self.value_to_key {
                // The slot was recycled under us if the value no longer
                // derives the key we were asked for.
                if derive(value).borrow() != key {
                    return None;
                }
            }
            return Some(value.clone());
        }
        None
    }

    pub(crate) fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let guard = pin();
        for slot in self.slots.iter() {
            let record_ptr = slot.load(Ordering::Acquire, &guard);
            // SAFETY: guard-protected, as in `get`.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let value_ptr = record.value.load(Ordering::Acquire, &guard);
            // SAFETY: guard-protected, as in `get`.
            if let Some(stored) = unsafe { value_ptr.as_ref() } {
                if stored == value {
                    return true;
                }
            }
        }
        false
    }
}

impl<K, V, S> Drop for MapCore<K, V, S> {
    fn drop(&mut self) {
        // Both endpoints are gone, so no reader can reach these records
        // any more and they can be freed in place.
        let guard = unsafe { epoch::unprotected() };
        for slot in self.slots.iter() {
            let record_ptr = slot.load(Ordering::Relaxed, guard);
            if !record_ptr.is_null() {
                // SAFETY: exclusive access; the record was never retired,
                // or it would already have been unlinked from the array.
                drop(unsafe { record_ptr.into_owned() });
            }
        }
    }
}

/// Configures and builds a map.
///
/// `max_capacity` is the hard ceiling on live entries and is the only
/// mandatory parameter. The slot array is sized up front from the load
/// factor so that ceiling is reachable without ever rehashing.
///
/// # Examples
///
/// ```
/// let (mut writer, reader) = swmr_map::Builder::new(64)
///     .load_factor(0.25)
///     .value_to_key(|value: &u64| *value)
///     .build();
///
/// writer.insert(7u64, 7u64).unwrap();
/// assert_eq!(reader.get(&7), Some(7));
/// ```
pub struct Builder<K, V, S = FixedState> {
    max_capacity: usize,
    load_factor: f32,
    max_probes: usize,
    value_to_key: Option<ValueToKey<K, V>>,
    hasher: S,
}

impl<K, V> Builder<K, V, FixedState> {
    /// Starts a builder for a map holding at most `max_capacity` entries.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            load_factor: 0.5,
            max_probes: 50,
            value_to_key: None,
            hasher: FixedState::default(),
        }
    }
}

impl<K, V, S> Builder<K, V, S> {
    /// Governs slot-array sizing; must be in `(0, 1]`. Defaults to 0.5.
    /// Smaller factors trade memory for shorter probe sequences.
    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Caps the hash family at `max_probes` functions. Defaults to 50.
    pub fn max_probes(mut self, max_probes: usize) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Supplies the value-to-key derivation, enabling slot recycling and
    /// validated reads as a pair.
    ///
    /// With a derivation configured, deletion clears records in place so
    /// later insertions reuse them without allocating, and every read
    /// re-derives the key from the value it found to reject values from a
    /// slot that was recycled mid-read. Without one, deletion detaches the
    /// record entirely and reads need no such check.
    pub fn value_to_key<F>(mut self, derive: F) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        self.value_to_key = Some(Box::new(derive));
        self
    }

    /// Replaces the default [`foldhash`] hasher.
    pub fn hasher<S2: BuildHasher>(self, hasher: S2) -> Builder<K, V, S2> {
        Builder {
            max_capacity: self.max_capacity,
            load_factor: self.load_factor,
            max_probes: self.max_probes,
            value_to_key: self.value_to_key,
            hasher,
        }
    }

    /// Allocates the slot array and returns the two endpoints.
    ///
    /// # Panics
    ///
    /// Panics if `max_capacity` is zero, the load factor is outside
    /// `(0, 1]`, or `max_probes` is zero.
    pub fn build(self) -> (Writer<K, V, S>, Reader<K, V, S>)
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        S: BuildHasher,
    {
        assert!(self.max_capacity > 0, "max_capacity must be positive");
        assert!(
            self.load_factor > 0.0 && self.load_factor <= 1.0,
            "load_factor must be in (0, 1]"
        );
        assert!(self.max_probes > 0, "max_probes must be positive");

        let wanted = ((self.max_capacity + 1) as f64 / self.load_factor as f64).ceil() as usize;
        let array_len = wanted.next_power_of_two();

        let mut slots = Vec::with_capacity(array_len);
        for _ in 0..array_len {
            slots.push(Atomic::null());
        }

        let core = Arc::new(MapCore {
            slots: slots.into_boxed_slice(),
            mask: array_len - 1,
            max_capacity: self.max_capacity,
            max_probes: self.max_probes,
            size: AtomicUsize::new(0),
            depth_in_use: AtomicUsize::new(0),
            hasher: self.hasher,
            value_to_key: self.value_to_key,
        });

        let writer = Writer {
            core: Arc::clone(&core),
            depths: DepthHistogram::new(self.max_probes),
        };
        (writer, Reader { core })
    }
}

/// Builds a map with the default load factor, probe family and hasher.
pub fn with_capacity<K, V>(max_capacity: usize) -> (Writer<K, V>, Reader<K, V>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Builder::new(max_capacity).build()
}

/// The single mutating endpoint of a map.
///
/// Exactly one `Writer` exists per map and it cannot be cloned; together
/// with mutations taking `&mut self`, that makes the single-writer
/// protocol a compile-time property rather than a usage convention. The
/// writer can also read, so a thread that owns it never needs a
/// [`Reader`].
pub struct Writer<K, V, S = FixedState> {
    core: Arc<MapCore<K, V, S>>,
    depths: DepthHistogram,
}

/// A read-only endpoint of a map.
///
/// Readers are cheap to clone and can be spread across any number of
/// threads. Every operation sees a consistent-enough view: an entry that
/// was observed once stays observable until the writer deletes it, and
/// values read from recycled slots are rejected by the validated-read
/// check.
pub struct Reader<K, V, S = FixedState> {
    core: Arc<MapCore<K, V, S>>,
}

impl<K, V, S> Clone for Reader<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K, V, S> Writer<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    /// Inserts or overwrites the entry for `key`, returning the prior
    /// value if one was resident.
    ///
    /// Overwrites always succeed. A brand-new entry fails with
    /// [`InsertError::CapacityReached`] once `max_capacity` entries are
    /// live, and with [`InsertError::ProbesExhausted`] in the rare case
    /// that every hash in the probe family lands on an occupied slot.
    ///
    /// # Examples
    ///
    /// ```
    /// let (mut writer, _reader) = swmr_map::with_capacity(16);
    /// assert_eq!(writer.insert(1, 10), Ok(None));
    /// assert_eq!(writer.insert(1, 20), Ok(Some(10)));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, InsertError> {
        self.insert_inner(key, value, false)
    }

    /// Inserts the entry only if `key` is absent; an existing value is
    /// returned untouched.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> Result<Option<V>, InsertError> {
        self.insert_inner(key, value, true)
    }

    /// Returns the value resident under `key`, inserting `value` first if
    /// the key is absent.
    pub fn get_or_insert(&mut self, key: K, value: V) -> Result<V, InsertError> {
        match self.insert_if_absent(key, value.clone())? {
            Some(existing) => Ok(existing),
            None => Ok(value),
        }
    }

    fn insert_inner(
        &mut self,
        key: K,
        value: V,
        only_if_absent: bool,
    ) -> Result<Option<V>, InsertError> {
        let core = &*self.core;
        let guard = pin();
        let depth_in_use = core.depth_in_use.load(Ordering::Relaxed);
        let mut first_vacant: Option<(usize, usize)> = None;

        for depth in 1..=core.max_probes {
            let index = core.probe_index(&key, depth);
            let record_ptr = core.slots[index].load(Ordering::Acquire, &guard);
            match unsafe { record_ptr.as_ref() } {
                Some(record) => {
                    let key_ptr = record.key.load(Ordering::Acquire, &guard);
                    match unsafe { key_ptr.as_ref() } {
                        Some(resident) if *resident == key => {
                            if only_if_absent {
                                let value_ptr = record.value.load(Ordering::Acquire, &guard);
                                // SAFETY: a live entry always has a value;
                                // this handle is the only mutator.
                                let existing = unsafe { value_ptr.deref() }.clone();
                                return Ok(Some(existing));
                            }
                            // Overwrite: one release store of the new
                            // value, nothing else moves.
                            let old = record.value.swap(Owned::new(value), Ordering::Release, &guard);
                            // SAFETY: as above, the prior value exists.
                            let prior = unsafe { old.deref() }.clone();
                            // SAFETY: the old box is unreachable to new
                            // readers once swapped out.
                            unsafe { guard.defer_destroy(old) };
                            return Ok(Some(prior));
                        }
                        Some(_) => {}
                        None => {
                            // Vacant-but-reusable record.
                            if first_vacant.is_none() {
                                first_vacant = Some((index, depth));
                            }
                        }
                    }
                }
                None => {
                    if first_vacant.is_none() {
                        first_vacant = Some((index, depth));
                    }
                }
            }
            if first_vacant.is_some() && depth > depth_in_use {
                // No live entry sits past depth_in_use, so the key cannot
                // be found any more and a landing spot is already known.
                break;
            }
        }

        let (index, depth) = first_vacant.ok_or(InsertError::ProbesExhausted)?;
        if core.size.load(Ordering::Relaxed) == core.max_capacity {
            return Err(InsertError::CapacityReached);
        }

        let record_ptr = core.slots[index].load(Ordering::Acquire, &guard);
        match unsafe { record_ptr.as_ref() } {
            Some(record) => {
                // Reuse the cleared record: value and depth first, the key
                // gate last so readers never see a half-published entry.
                record.value.store(Owned::new(value), Ordering::Release);
                record.probe_depth.store(depth, Ordering::Release);
                record.key.store(Owned::new(key), Ordering::Release);
            }
            None => {
                // First use of this index: publish a fully initialized
                // record with a single release store.
                let record = Owned::new(Slot::new_live(index, depth, key, value));
                core.slots[index].store(record, Ordering::Release);
            }
        }

        self.depths.add(depth);
        if depth > depth_in_use {
            // Raised only after the entry it covers is visible, so a
            // reader that sees the new depth also sees the entry.
            core.depth_in_use.store(depth, Ordering::Release);
        }
        core.size.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Removes the entry for `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = pin();
        let depth_in_use = self.core.depth_in_use.load(Ordering::Relaxed);
        for depth in 1..=depth_in_use {
            let index = self.core.probe_index(key, depth);
            let record_ptr = self.core.slots[index].load(Ordering::Acquire, &guard);
            // SAFETY: guard-protected record pointer.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            let key_ptr = record.key.load(Ordering::Acquire, &guard);
            // SAFETY: guard-protected key pointer.
            let Some(resident) = (unsafe { key_ptr.as_ref() }) else {
                continue;
            };
            if resident.borrow() == key {
                return Some(self.evict(record, &guard));
            }
        }
        None
    }

    /// Evicts one live entry chosen uniformly at random and returns its
    /// value.
    ///
    /// Resamples until a live slot is hit, so the expected number of draws
    /// is `1 / load`. The map must not be empty.
    ///
    /// # Panics
    ///
    /// Panics if the map is empty.
    pub fn pop_random_value(&mut self) -> V {
        assert!(!self.is_empty(), "pop_random_value on an empty map");
        let guard = pin();
        let mut rng = rand::rng();
        loop {
            let index = rng.random_range(0..self.core.slots.len());
            let record_ptr = self.core.slots[index].load(Ordering::Acquire, &guard);
            // SAFETY: guard-protected record pointer.
            let Some(record) = (unsafe { record_ptr.as_ref() }) else {
                continue;
            };
            if record.key.load(Ordering::Acquire, &guard).is_null() {
                continue;
            }
            return self.evict(record, &guard);
        }
    }

    /// Shared removal path: histogram first, then the slot, size last.
    fn evict(&mut self, record: &Slot<K, V>, guard: &Guard) -> V {
        let value_ptr = record.value.load(Ordering::Acquire, guard);
        // SAFETY: the entry is live and this handle is the only mutator.
        let value = unsafe { value_ptr.deref() }.clone();

        let depth = record.probe_depth.load(Ordering::Relaxed);
        let current_max = self.core.depth_in_use.load(Ordering::Relaxed);
        let new_max = self.depths.remove(depth, current_max);
        if new_max != current_max {
            self.core.depth_in_use.store(new_max, Ordering::Release);
        }

        if self.core.value_to_key.is_some() {
            // Recycle in place: value, then depth, then the key gate, so a
            // racing reader sees either the live entry or a vacant slot.
            let old_value = record.value.swap(Shared::null(), Ordering::Release, guard);
            record.probe_depth.store(0, Ordering::Release);
            let old_key = record.key.swap(Shared::null(), Ordering::Release, guard);
            // SAFETY: both boxes are unlinked; readers still holding them
            // are protected by their own guards until reclamation.
            unsafe {
                guard.defer_destroy(old_value);
                guard.defer_destroy(old_key);
            }
        } else {
            let detached =
                self.core.slots[record.home_index].swap(Shared::null(), Ordering::Release, guard);
            // SAFETY: the record is unlinked from the array; dropping it
            // later also frees the key and value it still owns.
            unsafe { guard.defer_destroy(detached) };
        }

        self.core.size.fetch_sub(1, Ordering::Relaxed);
        value
    }

    /// Removes every entry.
    ///
    /// Records are detached wholesale even when recycling is enabled.
    /// Concurrent readers may observe the transition partially.
    pub fn clear(&mut self) {
        let guard = pin();
        for slot in self.core.slots.iter() {
            let detached = slot.swap(Shared::null(), Ordering::Release, &guard);
            if !detached.is_null() {
                // SAFETY: unlinked record, reclaimed after readers quiesce.
                unsafe { guard.defer_destroy(detached) };
            }
        }
        let current_max = self.core.depth_in_use.load(Ordering::Relaxed);
        self.depths.reset(current_max);
        self.core.depth_in_use.store(0, Ordering::Release);
        self.core.size.store(0, Ordering::Release);
    }

    /// Looks up `key` and returns a clone of its value.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.get(key)
    }

    /// Returns `true` if `key` has a live entry.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Linear scan for `value` over all live entries.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.contains_value(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns `true` if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard ceiling on live entries.
    pub fn max_capacity(&self) -> usize {
        self.core.max_capacity()
    }

    /// Largest probe depth any insertion has required among live entries;
    /// zero when empty. Diagnostic.
    pub fn max_probe_depth_in_use(&self) -> usize {
        self.core.max_probe_depth_in_use()
    }

    /// Iterates over `(key, value)` pairs. See [`Reader::iter`].
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(&self.core)
    }

    /// Iterates over keys.
    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys::new(&self.core)
    }

    /// Iterates over values.
    pub fn values(&self) -> Values<'_, K, V, S> {
        Values::new(&self.core)
    }
}

impl<K, V, S> Reader<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    /// Looks up `key` and returns a clone of its value.
    ///
    /// Probes at most `max_probe_depth_in_use` candidate slots. With a
    /// value-to-key derivation configured the value is validated before it
    /// is returned, so a slot recycled mid-read reports absent instead of
    /// another key's value.
    ///
    /// # Examples
    ///
    /// ```
    /// let (mut writer, reader) = swmr_map::with_capacity(16);
    /// writer.insert(5, 50).unwrap();
    /// assert_eq!(reader.get(&5), Some(50));
    /// assert_eq!(reader.get(&6), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.get(key)
    }

    /// Returns `true` if `key` has a live entry.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Linear scan for `value` over all live entries.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.contains_value(value)
    }

    /// Number of live entries, as last published by the writer.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns `true` if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard ceiling on live entries.
    pub fn max_capacity(&self) -> usize {
        self.core.max_capacity()
    }

    /// Largest probe depth any insertion has required among live entries;
    /// zero when empty. Diagnostic.
    pub fn max_probe_depth_in_use(&self) -> usize {
        self.core.max_probe_depth_in_use()
    }

    /// Iterates over `(key, value)` pairs.
    ///
    /// The iteration is a live scan: entries inserted or removed while it
    /// runs may or may not be reflected, a stably-resident key is yielded
    /// exactly once, and values pass the validated-read check before they
    /// are yielded.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(&self.core)
    }

    /// Iterates over keys.
    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys::new(&self.core)
    }

    /// Iterates over values.
    pub fn values(&self) -> Values<'_, K, V, S> {
        Values::new(&self.core)
    }
}
