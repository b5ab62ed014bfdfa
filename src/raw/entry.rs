use std::mem;

use super::disguise::Disguised;
use super::probe::Probe;
use super::utils::hash_pointer;

/// Referrers for a referent stay in a fixed inline array until a fifth
/// registration spills them out of line.
pub const INLINE_CAPACITY: usize = 4;

/// All referrers currently aimed at one referent.
///
/// A referrer is the address of a weak variable, stored disguised. The
/// population is sharply skewed: most referents never collect more than a
/// handful of weak references, so the set starts as four inline slots and only
/// the rare heavily-referenced referent pays for an out-of-line hash set.
pub struct Entry<T> {
    pub referent: Disguised<T>,
    referrers: Referrers<T>,
}

enum Referrers<T> {
    /// Up to four referrers, scanned linearly.
    Inline([Disguised<*mut T>; INLINE_CAPACITY]),
    /// The out-of-line set. Once spilled, an entry never returns to inline
    /// storage; it lives out of line until it is removed from the table.
    Spilled(RefSet<T>),
}

/// An open-addressed set of disguised referrer addresses.
///
/// Power-of-two capacity, linear probing, at most 3/4 full. Removals leave
/// holes rather than re-packing the probe chain, so lookups terminate on the
/// recorded maximum displacement, not on the first empty slot.
struct RefSet<T> {
    slots: Box<[Disguised<*mut T>]>,
    len: usize,
    max_displacement: usize,
}

impl<T> Entry<T> {
    /// Creates an inline entry holding a single referrer.
    pub fn new(referent: Disguised<T>, referrer: Disguised<*mut T>) -> Entry<T> {
        let mut slots = [Disguised::null(); INLINE_CAPACITY];
        slots[0] = referrer;
        Entry {
            referent,
            referrers: Referrers::Inline(slots),
        }
    }

    /// Adds a referrer to the set.
    ///
    /// The caller guarantees `referrer` is not already present.
    pub fn append(&mut self, referrer: Disguised<*mut T>) {
        debug_assert!(!referrer.is_null());

        if let Referrers::Inline(slots) = &mut self.referrers {
            for slot in slots.iter_mut() {
                if slot.is_null() {
                    *slot = referrer;
                    return;
                }
            }

            // All four inline slots are taken. Spill them into a set sized for
            // exactly the inline values. It sits at full load, which the
            // insert below notices and fixes by rehashing to capacity 8 before
            // the new referrer lands.
            let inline = *slots;
            self.referrers = Referrers::Spilled(RefSet::from_inline(inline));
        }

        match &mut self.referrers {
            Referrers::Spilled(set) => set.insert(referrer),
            Referrers::Inline(_) => unreachable!(),
        }
    }

    /// Removes a referrer from the set.
    ///
    /// Returns false if the referrer was not present; the set is unchanged and
    /// the caller reports the misuse.
    pub fn remove(&mut self, referrer: Disguised<*mut T>) -> bool {
        match &mut self.referrers {
            Referrers::Inline(slots) => {
                for slot in slots.iter_mut() {
                    if *slot == referrer {
                        *slot = Disguised::null();
                        return true;
                    }
                }
                false
            }
            Referrers::Spilled(set) => set.remove(referrer),
        }
    }

    /// Whether no referrer slot is occupied.
    pub fn is_empty(&self) -> bool {
        match &self.referrers {
            Referrers::Inline(slots) => slots.iter().all(|slot| slot.is_null()),
            Referrers::Spilled(set) => set.len == 0,
        }
    }

    /// The occupied referrer slots, in storage order.
    pub fn referrers(&self) -> impl Iterator<Item = Disguised<*mut T>> + '_ {
        let slots = match &self.referrers {
            Referrers::Inline(slots) => &slots[..],
            Referrers::Spilled(set) => &set.slots[..],
        };
        slots.iter().copied().filter(|slot| !slot.is_null())
    }

    #[cfg(test)]
    fn count(&self) -> usize {
        self.referrers().count()
    }

    #[cfg(test)]
    fn spilled_capacity(&self) -> Option<usize> {
        match &self.referrers {
            Referrers::Inline(_) => None,
            Referrers::Spilled(set) => Some(set.slots.len()),
        }
    }
}

impl<T> RefSet<T> {
    /// The transitional set produced by spilling a full inline array: the four
    /// referrers at their original positions, fill 4, displacement 0. It is
    /// over the load bound until `insert` grows it.
    fn from_inline(slots: [Disguised<*mut T>; INLINE_CAPACITY]) -> RefSet<T> {
        RefSet {
            slots: Box::new(slots),
            len: INLINE_CAPACITY,
            max_displacement: 0,
        }
    }

    fn insert(&mut self, referrer: Disguised<*mut T>) {
        if self.len >= self.slots.len() * 3 / 4 {
            self.grow();
        }

        let mask = self.slots.len() - 1;
        let mut probe = Probe::start(hash_pointer(referrer.word()), mask);
        let begin = probe.i;

        while !self.slots[probe.i].is_null() {
            probe.next(mask);
            if probe.i == begin {
                panic!(
                    "Weak table corrupted: no empty referrer slot in {} ({} occupied)",
                    self.slots.len(),
                    self.len
                );
            }
        }

        self.slots[probe.i] = referrer;
        self.len += 1;
        if probe.len > self.max_displacement {
            self.max_displacement = probe.len;
        }
    }

    fn remove(&mut self, referrer: Disguised<*mut T>) -> bool {
        let mask = self.slots.len() - 1;
        let mut probe = Probe::start(hash_pointer(referrer.word()), mask);
        let begin = probe.i;

        while self.slots[probe.i] != referrer {
            probe.next(mask);
            if probe.i == begin {
                panic!(
                    "Weak table corrupted: referrer probe cycled through {} slots",
                    self.slots.len()
                );
            }
            // Nothing was ever stored past the maximum displacement.
            if probe.len > self.max_displacement {
                return false;
            }
        }

        self.slots[probe.i] = Disguised::null();
        self.len -= 1;
        true
    }

    /// Doubles the set and rehashes every occupied slot.
    fn grow(&mut self) {
        let new_capacity = self.slots.len() * 2;
        let old = mem::replace(
            &mut self.slots,
            vec![Disguised::null(); new_capacity].into_boxed_slice(),
        );

        // Restored by the inserts below.
        self.len = 0;
        self.max_displacement = 0;

        for slot in old.iter().copied().filter(|slot| !slot.is_null()) {
            self.insert(slot);
        }
    }
}
