/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use super::ExemplarItem;

/// Orders items by latency, ties broken by request id.
#[derive(Clone, Debug)]
pub(super) struct ByLatency(pub(super) Arc<ExemplarItem>);

impl PartialEq for ByLatency {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByLatency {}

impl PartialOrd for ByLatency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByLatency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .latency
            .cmp(&other.0.latency)
            .then_with(|| self.0.request_id.cmp(&other.0.request_id))
    }
}

/// Bounded heap keeping the `capacity` smallest entries by `T`'s order.
///
/// The root is the worst kept entry, a new entry replaces it only when it
/// orders strictly before it.
#[derive(Clone, Debug)]
pub(super) struct TopK<T: Ord> {
    heap: BinaryHeap<T>,
    capacity: usize,
}

impl<T: Ord> TopK<T> {
    pub(super) fn new(capacity: usize) -> Self {
        TopK {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub(super) fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub(super) fn offer(&mut self, entry: T) {
        if !self.is_full() {
            self.heap.push(entry);
        } else if let Some(mut root) = self.heap.peek_mut()
            && entry < *root
        {
            *root = entry;
        }
    }

    pub(super) fn root(&self) -> Option<&T> {
        self.heap.peek()
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter()
    }

    pub(super) fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Keeps the k largest latencies, the root is the smallest of them.
pub(super) type SlowestHeap = TopK<Reverse<ByLatency>>;
/// Keeps the k smallest latencies, the root is the largest of them.
pub(super) type FastestHeap = TopK<ByLatency>;

impl SlowestHeap {
    pub(super) fn push_item(&mut self, item: Arc<ExemplarItem>) {
        self.offer(Reverse(ByLatency(item)));
    }

    pub(super) fn floor(&self) -> Option<Duration> {
        self.root().map(|r| r.0.0.latency)
    }

    pub(super) fn items(&self) -> impl Iterator<Item = &Arc<ExemplarItem>> {
        self.iter().map(|r| &r.0.0)
    }
}

impl FastestHeap {
    pub(super) fn push_item(&mut self, item: Arc<ExemplarItem>) {
        self.offer(ByLatency(item));
    }

    pub(super) fn ceiling(&self) -> Option<Duration> {
        self.root().map(|r| r.0.latency)
    }

    pub(super) fn items(&self) -> impl Iterator<Item = &Arc<ExemplarItem>> {
        self.iter().map(|r| &r.0)
    }
}
