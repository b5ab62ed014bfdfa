mod disguise;
mod entry;
mod probe;
mod utils;

pub(crate) use disguise::Disguised;
pub(crate) use entry::Entry;

use probe::Probe;
use utils::hash_pointer;

use std::mem;

/// The referent-indexed directory: an open-addressed table whose buckets are
/// whole referrer sets, keyed by the disguised referent address.
///
/// The table performs no synchronization; the public wrapper's `&mut self`
/// receivers push that obligation to whoever owns the enclosing lock.
pub(crate) struct Table<T> {
    buckets: Box<[Option<Entry<T>>]>,
    len: usize,
    max_displacement: usize,
}

impl<T> Table<T> {
    /// The first allocation. Later growth doubles in place.
    const INITIAL_CAPACITY: usize = 64;

    /// Tables below this capacity never shrink.
    const COMPACT_MIN_CAPACITY: usize = 1024;

    /// Creates an empty table with no allocation.
    pub(crate) fn new() -> Table<T> {
        Table {
            buckets: Box::new([]),
            len: 0,
            max_displacement: 0,
        }
    }

    /// The number of referents registered.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Finds the bucket index for a referent.
    pub(crate) fn find(&self, referent: Disguised<T>) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }

        let mask = self.buckets.len() - 1;
        let mut probe = Probe::start(hash_pointer(referent.word()), mask);
        let begin = probe.i;

        loop {
            if let Some(entry) = &self.buckets[probe.i] {
                if entry.referent == referent {
                    return Some(probe.i);
                }
            }

            probe.next(mask);
            if probe.i == begin {
                panic!(
                    "Weak table corrupted: probe cycled through {} buckets ({} occupied)",
                    self.buckets.len(),
                    self.len
                );
            }
            // Nothing was ever stored past the maximum displacement.
            if probe.len > self.max_displacement {
                return None;
            }
        }
    }

    pub(crate) fn entry(&self, index: usize) -> &Entry<T> {
        self.buckets[index].as_ref().expect("empty weak table bucket")
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        self.buckets[index].as_mut().expect("empty weak table bucket")
    }

    /// Inserts an entry for a referent that is not in the table.
    ///
    /// The caller checks for growth first; the load bound guarantees an empty
    /// bucket exists.
    pub(crate) fn insert(&mut self, entry: Entry<T>) {
        debug_assert!(!self.buckets.is_empty());
        debug_assert!(self.find(entry.referent).is_none());

        let mask = self.buckets.len() - 1;
        let mut probe = Probe::start(hash_pointer(entry.referent.word()), mask);
        let begin = probe.i;

        while self.buckets[probe.i].is_some() {
            probe.next(mask);
            if probe.i == begin {
                panic!(
                    "Weak table corrupted: no empty bucket in {} ({} occupied)",
                    self.buckets.len(),
                    self.len
                );
            }
        }

        self.buckets[probe.i] = Some(entry);
        self.len += 1;
        if probe.len > self.max_displacement {
            self.max_displacement = probe.len;
        }
    }

    /// Removes the entry at `index`, dropping any out-of-line referrer storage
    /// it owns, and shrinks the table if it has drained.
    pub(crate) fn remove(&mut self, index: usize) {
        debug_assert!(self.buckets[index].is_some());

        self.buckets[index] = None;
        self.len -= 1;
        self.maybe_compact();
    }

    /// Grows if the next insert could push the table past 3/4 full. The first
    /// insert allocates outright.
    pub(crate) fn maybe_grow(&mut self) {
        let capacity = self.buckets.len();
        if self.len >= capacity * 3 / 4 {
            let new_capacity = if capacity == 0 {
                Self::INITIAL_CAPACITY
            } else {
                capacity * 2
            };
            self.resize(new_capacity);
        }
    }

    /// Shrinks a large table that has drained to a sixteenth of its capacity.
    ///
    /// An eighth of the old capacity leaves the survivors at no more than half
    /// load.
    fn maybe_compact(&mut self) {
        let capacity = self.buckets.len();
        if capacity >= Self::COMPACT_MIN_CAPACITY && capacity / 16 >= self.len {
            self.resize(capacity / 8);
        }
    }

    /// Replaces the bucket array and reinserts every occupied bucket.
    ///
    /// Entries move by value; out-of-line referrer storage stays where it is,
    /// only its owning entry relocates.
    fn resize(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity.is_power_of_two());

        let old = mem::replace(
            &mut self.buckets,
            (0..new_capacity).map(|_| None).collect(),
        );

        // Restored by the inserts below.
        self.max_displacement = 0;
        self.len = 0;

        for entry in Vec::from(old).into_iter().flatten() {
            self.insert(entry);
        }
    }
}
