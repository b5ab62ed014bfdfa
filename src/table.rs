use std::fmt;
use std::ptr;

use crate::raw::{Disguised, Entry, Table};
use crate::runtime::{Permission, Runtime};

/// A zeroing weak-reference table.
///
/// The table maintains a many-to-many registration between *referents* (heap
/// objects that may be weakly referenced) and *referrers* (the addresses of
/// weak variables aimed at them). When a referent is destroyed, [`clear`]
/// overwrites every registered weak variable that still points at it with
/// null, so later loads observe the death instead of a dangling address.
///
/// # Locking
///
/// A `WeakTable` performs no synchronization of its own. Every operation takes
/// `&mut self`; a runtime that shares a table across threads wraps it in a
/// mutex and calls through the guard. In practice referents are partitioned
/// across a small array of tables, each behind its own lock, so operations are
/// short bounded critical sections. Nothing here blocks, yields, or allocates
/// outside of resizes.
///
/// # Pointers
///
/// Registered addresses are stored disguised (negated), so heap-scanning tools
/// do not mistake the table's contents for live references into the objects it
/// tracks.
///
/// See the [crate-level documentation](crate) for a usage sketch.
///
/// [`clear`]: WeakTable::clear
pub struct WeakTable<R: Runtime> {
    raw: Table<R::Object>,
    runtime: R,
}

// Safety: the table stores addresses without dereferencing them; the only
// dereferences happen in `clear` under its caller contract. All access goes
// through `&mut self` under the caller's lock.
unsafe impl<R: Runtime + Send> Send for WeakTable<R> {}
unsafe impl<R: Runtime + Sync> Sync for WeakTable<R> {}

impl<R: Runtime> WeakTable<R> {
    /// Creates an empty table.
    ///
    /// The table does not allocate until the first registration.
    pub fn new(runtime: R) -> WeakTable<R> {
        WeakTable {
            raw: Table::new(),
            runtime,
        }
    }

    /// The number of referents with at least one registered weak reference.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// The number of buckets in the referent directory.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Registers `referrer` as a weak reference to `referent`.
    ///
    /// Returns the value the caller should store into the weak variable: the
    /// referent itself on success, or null if the referent is already being
    /// deallocated (or cannot say). Null and tagged referents short-circuit:
    /// they are returned unchanged and the table is untouched, since a weak
    /// reference to an immediate can never dangle.
    ///
    /// The weak variable itself is **not** written; the caller stores the
    /// returned value, under the same lock, so the variable never transitions
    /// behind the table's back.
    ///
    /// # Panics
    ///
    /// Panics if the referent is being deallocated and `crash_if_deallocating`
    /// is set. Registering a weak reference during teardown is either an
    /// over-release or a use of the raw entry points that the runtime has
    /// chosen to treat as fatal.
    ///
    /// # Safety
    ///
    /// `referrer` must be a valid, pointer-aligned storage location that
    /// remains valid (and is not concurrently mutated) until it is removed by
    /// [`unregister`](WeakTable::unregister) or zeroed by
    /// [`clear`](WeakTable::clear). The caller guarantees `referrer` is not
    /// already registered for this referent.
    pub unsafe fn register(
        &mut self,
        referent: *mut R::Object,
        referrer: *mut *mut R::Object,
        crash_if_deallocating: bool,
    ) -> *mut R::Object {
        if referent.is_null() || self.runtime.is_tagged(referent) {
            return referent;
        }

        // Make sure the referent is viable before remembering it.
        match self.runtime.weak_permission(referent) {
            Permission::Granted => {}
            Permission::Unanswered => return ptr::null_mut(),
            Permission::Deallocating => {
                if crash_if_deallocating {
                    panic!(
                        "Cannot form weak reference to {}: the object is being \
                         deallocated, or was over-released",
                        self.runtime.describe(referent)
                    );
                }
                return ptr::null_mut();
            }
        }

        let key = Disguised::new(referent);
        match self.raw.find(key) {
            Some(index) => self.raw.entry_mut(index).append(Disguised::new(referrer)),
            None => {
                let entry = Entry::new(key, Disguised::new(referrer));
                self.raw.maybe_grow();
                self.raw.insert(entry);
            }
        }

        referent
    }

    /// Removes `referrer` from the set registered for `referent`.
    ///
    /// Called when the weak variable's storage is going away while the
    /// referent is still alive. A null referent, an unknown referent, and an
    /// unknown referrer are all tolerated; the last is reported as misuse
    /// through [`Runtime::weak_error`]. The weak variable is not modified,
    /// since its storage is about to disappear anyway.
    ///
    /// # Safety
    ///
    /// `referrer` must be the same address that was passed to
    /// [`register`](WeakTable::register).
    pub unsafe fn unregister(&mut self, referent: *mut R::Object, referrer: *mut *mut R::Object) {
        if referent.is_null() {
            return;
        }

        let index = match self.raw.find(Disguised::new(referent)) {
            Some(index) => index,
            None => return,
        };

        if !self.raw.entry_mut(index).remove(Disguised::new(referrer)) {
            log::error!(
                "attempted to unregister unknown weak variable at {referrer:p} \
                 for referent {referent:p}"
            );
            self.runtime.weak_error();
        }

        if self.raw.entry(index).is_empty() {
            self.raw.remove(index);
        }
    }

    /// Zeroes every registered weak variable aimed at `referent` and forgets
    /// the referent.
    ///
    /// Called from the referent's destructor. Each registered variable that
    /// still holds `referent` is overwritten with null; a variable found
    /// holding some other non-null object indicates the weak entry points were
    /// bypassed, which is reported through [`Runtime::weak_error`] and left
    /// alone. A referent with no entry is a no-op, which makes `clear`
    /// idempotent.
    ///
    /// # Safety
    ///
    /// Every referrer registered for `referent` must still be valid storage;
    /// that is implied by the register/unregister contract. The caller holds
    /// the lock for this table, so no weak loads race the stores performed
    /// here.
    pub unsafe fn clear(&mut self, referent: *mut R::Object) {
        let index = match self.raw.find(Disguised::new(referent)) {
            Some(index) => index,
            None => return,
        };

        for referrer in self.raw.entry(index).referrers() {
            let slot = referrer.get();
            // Safety: registered referrers are valid for reads and writes per
            // the register contract.
            unsafe {
                if *slot == referent {
                    *slot = ptr::null_mut();
                } else if !(*slot).is_null() {
                    log::error!(
                        "weak variable at {:p} holds {:p} instead of {:p}; the \
                         variable was probably written without the weak entry \
                         points",
                        slot,
                        *slot,
                        referent
                    );
                    self.runtime.weak_error();
                }
            }
        }

        self.raw.remove(index);
    }

    /// Whether `referent` has at least one registered weak reference.
    #[cfg(debug_assertions)]
    pub fn is_registered(&self, referent: *mut R::Object) -> bool {
        self.raw.find(Disguised::new(referent)).is_some()
    }
}

impl<R: Runtime> fmt::Debug for WeakTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
