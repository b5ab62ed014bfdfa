#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use wilt::{Permission, Runtime, WeakTable};

/// A heap object in the toy object model.
pub struct Obj {
    pub value: u64,
}

/// The toy object model: tracks which objects are mid-deallocation or cannot
/// answer the permission query, and counts misuse reports.
#[derive(Default)]
pub struct TestRuntime {
    pub deallocating: RefCell<HashSet<usize>>,
    pub unanswerable: RefCell<HashSet<usize>>,
    pub errors: Cell<usize>,
}

impl Runtime for TestRuntime {
    type Object = Obj;

    fn is_tagged(&self, obj: *mut Obj) -> bool {
        // Immediate values carry a low tag bit, like any pointer-tagging
        // runtime.
        obj as usize & 1 == 1
    }

    fn weak_permission(&self, obj: *mut Obj) -> Permission {
        let addr = obj as usize;
        if self.unanswerable.borrow().contains(&addr) {
            Permission::Unanswered
        } else if self.deallocating.borrow().contains(&addr) {
            Permission::Deallocating
        } else {
            Permission::Granted
        }
    }

    fn describe(&self, obj: *mut Obj) -> String {
        format!("instance {obj:p} of class Obj")
    }

    fn weak_error(&self) {
        self.errors.set(self.errors.get() + 1);
    }
}

impl TestRuntime {
    pub fn start_deallocating(&self, obj: *mut Obj) {
        self.deallocating.borrow_mut().insert(obj as usize);
    }

    pub fn make_unanswerable(&self, obj: *mut Obj) {
        self.unanswerable.borrow_mut().insert(obj as usize);
    }
}

/// Owns the allocations handed to the table as referents.
pub struct Heap {
    objects: Vec<*mut Obj>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            objects: Vec::new(),
        }
    }

    pub fn alloc(&mut self) -> *mut Obj {
        let obj = Box::into_raw(Box::new(Obj {
            value: self.objects.len() as u64,
        }));
        self.objects.push(obj);
        obj
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for &obj in &self.objects {
            // Safety: allocated by `alloc` and never freed elsewhere.
            unsafe { drop(Box::from_raw(obj)) };
        }
    }
}

/// A fresh table over a shared runtime, so tests can inspect the runtime's
/// counters while the table borrows it.
pub fn with_table(test: impl FnOnce(WeakTable<&TestRuntime>, &TestRuntime, &mut Heap)) {
    let runtime = TestRuntime::default();
    let mut heap = Heap::new();
    test(WeakTable::new(&runtime), &runtime, &mut heap);
}
