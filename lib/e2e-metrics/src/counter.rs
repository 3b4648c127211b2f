/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reusable handle to one named collector counter.
#[derive(Clone, Debug, Default)]
pub struct CounterHandle {
    value: Arc<AtomicU64>,
}

impl CounterHandle {
    pub(crate) fn new(init: u64) -> Self {
        CounterHandle {
            value: Arc::new(AtomicU64::new(init)),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    /// A handle to a new counter holding the current value
    pub(crate) fn detached_copy(&self) -> Self {
        CounterHandle::new(self.get())
    }
}
