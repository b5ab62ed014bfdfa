/// The answer to "does this object currently accept new weak references?".
///
/// Returned by [`Runtime::weak_permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// The object is alive; registration may proceed.
    Granted,
    /// The object is already being deallocated. Registration fails, fatally or
    /// with a null result depending on the caller's `crash_if_deallocating`.
    Deallocating,
    /// The object could not answer, e.g. a proxy that forwards the permission
    /// hook somewhere unreachable. Registration fails with a null result
    /// unconditionally.
    Unanswered,
}

/// The object-model services a [`WeakTable`](crate::WeakTable) consumes.
///
/// The table stores addresses; it never inspects the objects behind them.
/// Everything it needs to know about an object (whether it is an immediate
/// value, whether it is mid-teardown, how to name it in a diagnostic) comes
/// through this trait, implemented by the surrounding runtime.
pub trait Runtime {
    /// The object type referents point at.
    type Object;

    /// Whether `obj` is an immediate (tagged) value rather than a heap
    /// object. Weak references to immediates are vacuously valid and never
    /// enter the table.
    fn is_tagged(&self, obj: *mut Self::Object) -> bool;

    /// Whether `obj` currently accepts new weak references.
    ///
    /// Implementations typically read the object's deallocating bit directly,
    /// falling back to dispatching the object's own permission hook when its
    /// class overrides one. [`Permission::Unanswered`] covers objects that
    /// forward that hook and cannot produce an answer.
    fn weak_permission(&self, obj: *mut Self::Object) -> Permission;

    /// A description of `obj` for fatal diagnostics, typically naming its
    /// class.
    fn describe(&self, obj: *mut Self::Object) -> String;

    /// Called when the table detects misuse of the weak entry points, after
    /// the diagnostic has been logged.
    ///
    /// The default forwards to [`weak_reference_error`] so a debugger
    /// breakpoint catches every misuse in the process.
    fn weak_error(&self) {
        weak_reference_error();
    }
}

impl<R: Runtime + ?Sized> Runtime for &R {
    type Object = R::Object;

    fn is_tagged(&self, obj: *mut Self::Object) -> bool {
        (**self).is_tagged(obj)
    }

    fn weak_permission(&self, obj: *mut Self::Object) -> Permission {
        (**self).weak_permission(obj)
    }

    fn describe(&self, obj: *mut Self::Object) -> String {
        (**self).describe(obj)
    }

    fn weak_error(&self) {
        (**self).weak_error();
    }
}

/// A well-known symbol for debugger breakpoints.
///
/// Every detected misuse of the weak entry points lands here (unless the
/// runtime overrides [`Runtime::weak_error`]), so `break weak_reference_error`
/// stops at the offending call with the diagnostic already emitted.
#[inline(never)]
pub fn weak_reference_error() {
    // Keep the call from being optimized away.
    std::hint::black_box(());
}
