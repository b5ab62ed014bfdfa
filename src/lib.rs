//! A zeroing weak-reference table for reference-counted runtimes.
//!
//! [`WeakTable`] records, for every weakly referenced heap object, the
//! addresses of all weak variables currently aimed at it. When the object is
//! destroyed, [`WeakTable::clear`] observes each registered variable and
//! overwrites it with null, so weak loads yield null instead of a dangling
//! pointer. The table is the storage half of a weak-reference implementation;
//! the object model around it is abstracted behind the [`Runtime`] trait.
//!
//! Internally the table is two levels of open-addressed hashing tuned for a
//! sharply skewed population: most objects carry at most four weak references
//! (kept in a fixed inline array), while the rare heavily-referenced object
//! spills into a resizable set. Registered addresses are stored disguised so
//! conservative heap scanners do not see them as live references.
//!
//! # Usage
//!
//! The surrounding runtime supplies a [`Runtime`] implementation and holds a
//! lock around each table. The caller, not the table, writes the weak
//! variable after a successful registration:
//!
//! ```
//! use wilt::{Permission, Runtime, WeakTable};
//!
//! // A minimal object model: plain heap allocations, nothing tagged,
//! // nothing ever caught mid-deallocation.
//! struct Objects;
//!
//! impl Runtime for Objects {
//!     type Object = u64;
//!
//!     fn is_tagged(&self, _obj: *mut u64) -> bool {
//!         false
//!     }
//!
//!     fn weak_permission(&self, _obj: *mut u64) -> Permission {
//!         Permission::Granted
//!     }
//!
//!     fn describe(&self, obj: *mut u64) -> String {
//!         format!("instance at {obj:p}")
//!     }
//! }
//!
//! let mut table = WeakTable::new(Objects);
//!
//! let referent = Box::into_raw(Box::new(7u64));
//! let mut slot: Box<*mut u64> = Box::new(std::ptr::null_mut());
//! let slot_ptr: *mut *mut u64 = &mut *slot;
//!
//! unsafe {
//!     // Register, then store the returned value into the weak variable.
//!     let value = table.register(referent, slot_ptr, true);
//!     assert_eq!(value, referent);
//!     *slot_ptr = value;
//!
//!     // On death, the table zeroes every registered variable.
//!     table.clear(referent);
//!     assert!((*slot_ptr).is_null());
//!
//!     drop(Box::from_raw(referent));
//! }
//! ```
//!
//! # Diagnostics
//!
//! Misuse of the entry points (unregistering an address that was never
//! registered, or a weak variable written behind the table's back) is logged
//! through the [`log`] facade and routed to [`Runtime::weak_error`], whose
//! default lands in the [`weak_reference_error`] breakpoint symbol. Detected
//! table corruption panics.

mod raw;
mod runtime;
mod table;

pub use runtime::{weak_reference_error, Permission, Runtime};
pub use table::WeakTable;
