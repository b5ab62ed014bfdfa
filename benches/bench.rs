use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::ptr;

use wilt::{Permission, Runtime, WeakTable};

struct BenchRuntime;

impl Runtime for BenchRuntime {
    type Object = u64;

    fn is_tagged(&self, _obj: *mut u64) -> bool {
        false
    }

    fn weak_permission(&self, _obj: *mut u64) -> Permission {
        Permission::Granted
    }

    fn describe(&self, obj: *mut u64) -> String {
        format!("{obj:p}")
    }
}

struct Objects {
    objects: Vec<*mut u64>,
}

impl Objects {
    fn alloc(count: usize) -> Objects {
        Objects {
            objects: (0..count as u64).map(|i| Box::into_raw(Box::new(i))).collect(),
        }
    }
}

impl Drop for Objects {
    fn drop(&mut self) {
        for &obj in &self.objects {
            unsafe { drop(Box::from_raw(obj)) };
        }
    }
}

fn register_unregister(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_unregister");

    // The hot path: a weak variable comes and goes while its referent stays
    // inline.
    group.bench_function("inline", |b| {
        let heap = Objects::alloc(1);
        let obj = heap.objects[0];
        let mut table = WeakTable::new(BenchRuntime);
        let mut slot: *mut u64 = ptr::null_mut();

        b.iter(|| unsafe {
            let value = table.register(black_box(obj), &mut slot, true);
            slot = value;
            table.unregister(obj, &mut slot);
            slot = ptr::null_mut();
        });
    });

    // Fan-in past the inline array: the referrer set spills and grows.
    group.bench_function("spilled_64", |b| {
        const REFERRERS: usize = 64;

        let heap = Objects::alloc(1);
        let obj = heap.objects[0];
        let mut table = WeakTable::new(BenchRuntime);
        let mut slots = vec![ptr::null_mut::<u64>(); REFERRERS];

        b.iter(|| unsafe {
            for i in 0..REFERRERS {
                let slot = slots.as_mut_ptr().add(i);
                *slot = table.register(obj, slot, true);
            }
            table.clear(obj);
        });
    });

    group.finish();
}

fn lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");

    // One weak reference per referent across a populated table, then mass
    // death: the pattern a generation of short-lived objects produces.
    group.bench_function("churn_1000", |b| {
        const OBJECTS: usize = 1000;

        let heap = Objects::alloc(OBJECTS);
        let mut table = WeakTable::new(BenchRuntime);
        let mut slots = vec![ptr::null_mut::<u64>(); OBJECTS];

        b.iter(|| unsafe {
            for i in 0..OBJECTS {
                let slot = slots.as_mut_ptr().add(i);
                *slot = table.register(heap.objects[i], slot, true);
            }
            for i in 0..OBJECTS {
                table.clear(heap.objects[i]);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, register_unregister, lifecycle);
criterion_main!(benches);
