/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use super::ExemplarItem;

/// Uniform sample of at most `capacity` items over `seen` offers.
#[derive(Clone, Debug)]
pub(super) struct Reservoir {
    items: Vec<Arc<ExemplarItem>>,
    seen: u64,
    capacity: usize,
}

impl Reservoir {
    pub(super) fn new(capacity: usize) -> Self {
        Reservoir {
            items: Vec::with_capacity(capacity),
            seen: 0,
            capacity,
        }
    }

    #[inline]
    pub(super) fn seen(&self) -> u64 {
        self.seen
    }

    pub(super) fn items(&self) -> &[Arc<ExemplarItem>] {
        &self.items
    }

    pub(super) fn offer(&mut self, item: Arc<ExemplarItem>) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        let j = fastrand::u64(..self.seen);
        if j < self.capacity as u64 {
            self.items[j as usize] = item;
        }
    }

    /// Draw up to `capacity` items from both sides, each draw picking a side
    /// with a probability proportional to its population.
    pub(super) fn merge_from(&mut self, other: &Reservoir) {
        if other.seen == 0 {
            return;
        }
        let mine_seen = self.seen;
        let mut mine = std::mem::take(&mut self.items);
        let mut theirs = other.items.clone();
        let total = mine_seen.saturating_add(other.seen);

        self.items.reserve(self.capacity);
        while self.items.len() < self.capacity && !(mine.is_empty() && theirs.is_empty()) {
            let from_mine = if mine.is_empty() {
                false
            } else if theirs.is_empty() {
                true
            } else {
                fastrand::u64(..total) < mine_seen
            };
            let src = if from_mine { &mut mine } else { &mut theirs };
            let idx = fastrand::usize(..src.len());
            self.items.push(src.swap_remove(idx));
        }
        self.seen = total;
    }

    pub(super) fn clear(&mut self) {
        self.items.clear();
        self.seen = 0;
    }
}
