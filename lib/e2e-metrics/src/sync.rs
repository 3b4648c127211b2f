/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Creation sequence number of a mergeable aggregate.
///
/// Each aggregate type draws ids from its own [`IdSpace`], and any operation
/// touching two instances of the same type locks them in ascending id order.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreationId(u64);

impl CreationId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub(crate) struct IdSpace(AtomicU64);

impl IdSpace {
    pub(crate) const fn new() -> Self {
        IdSpace(AtomicU64::new(1)) // start from 1
    }

    pub(crate) fn next_id(&self) -> CreationId {
        CreationId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

// lock poisoning is ignored, aggregates stay usable after a panicked writer
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Lock two distinct instances in creation id order.
///
/// The guards are always returned as `(this, other)`. The caller must make
/// sure the two ids differ.
pub(crate) fn lock_pair<'a, T>(
    this: (&'a Mutex<T>, CreationId),
    other: (&'a Mutex<T>, CreationId),
) -> (MutexGuard<'a, T>, MutexGuard<'a, T>) {
    debug_assert_ne!(this.1, other.1);
    if this.1 < other.1 {
        let a = lock(this.0);
        let b = lock(other.0);
        (a, b)
    } else {
        let b = lock(other.0);
        let a = lock(this.0);
        (a, b)
    }
}

/// Write lock two distinct instances in creation id order, see [`lock_pair`].
pub(crate) fn write_pair<'a, T>(
    this: (&'a RwLock<T>, CreationId),
    other: (&'a RwLock<T>, CreationId),
) -> (RwLockWriteGuard<'a, T>, RwLockWriteGuard<'a, T>) {
    debug_assert_ne!(this.1, other.1);
    if this.1 < other.1 {
        let a = write(this.0);
        let b = write(other.0);
        (a, b)
    } else {
        let b = write(other.0);
        let a = write(this.0);
        (a, b)
    }
}

/// Read lock two distinct instances in creation id order, see [`lock_pair`].
pub(crate) fn read_pair<'a, T>(
    this: (&'a RwLock<T>, CreationId),
    other: (&'a RwLock<T>, CreationId),
) -> (RwLockReadGuard<'a, T>, RwLockReadGuard<'a, T>) {
    debug_assert_ne!(this.1, other.1);
    if this.1 < other.1 {
        let a = read(this.0);
        let b = read(other.0);
        (a, b)
    } else {
        let b = read(other.0);
        let a = read(this.0);
        (a, b)
    }
}

/// Keep the smallest non-zero value, zero meaning unset.
pub(crate) fn store_min_nonzero(target: &AtomicU64, v: u64) {
    if v == 0 {
        return;
    }
    let mut curr = target.load(Ordering::Acquire);
    loop {
        if curr != 0 && v >= curr {
            return;
        }
        match target.compare_exchange(curr, v, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(actual) => curr = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn id_space_monotonic() {
        let space = IdSpace::new();
        let a = space.next_id();
        let b = space.next_id();
        assert!(a < b);
        assert_eq!(a.as_u64() + 1, b.as_u64());
    }

    #[test]
    fn lock_pair_returns_in_call_order() {
        let space = IdSpace::new();
        let (ia, ib) = (space.next_id(), space.next_id());
        let a = Mutex::new(1);
        let b = Mutex::new(2);

        let (ga, gb) = lock_pair((&a, ia), (&b, ib));
        assert_eq!((*ga, *gb), (1, 2));
        drop((ga, gb));

        let (gb, ga) = lock_pair((&b, ib), (&a, ia));
        assert_eq!((*gb, *ga), (2, 1));
    }

    #[test]
    fn lock_pair_opposite_directions_no_deadlock() {
        let space = IdSpace::new();
        let ia = space.next_id();
        let ib = space.next_id();
        let a = Arc::new(Mutex::new(0u64));
        let b = Arc::new(Mutex::new(0u64));

        let mut handles = Vec::new();
        for i in 0..4 {
            let a = a.clone();
            let b = b.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let (mut x, mut y) = if i % 2 == 0 {
                        lock_pair((&*a, ia), (&*b, ib))
                    } else {
                        let (y, x) = lock_pair((&*b, ib), (&*a, ia));
                        (x, y)
                    };
                    *x += 1;
                    *y += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock(&*a), 4000);
        assert_eq!(*lock(&*b), 4000);
    }

    #[test]
    fn min_nonzero() {
        let v = AtomicU64::new(0);
        store_min_nonzero(&v, 0);
        assert_eq!(v.load(Ordering::Relaxed), 0);
        store_min_nonzero(&v, 10);
        assert_eq!(v.load(Ordering::Relaxed), 10);
        store_min_nonzero(&v, 20);
        assert_eq!(v.load(Ordering::Relaxed), 10);
        store_min_nonzero(&v, 5);
        assert_eq!(v.load(Ordering::Relaxed), 5);
    }
}
