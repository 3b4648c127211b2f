/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::heap::{FastestHeap, SlowestHeap};
use super::reservoir::Reservoir;
use super::{ExemplarDetails, ExemplarItem};
use crate::sync::{CreationId, IdSpace, lock, lock_pair};
use crate::{ExemplarConfig, MetricsError};

static EXEMPLAR_ID_SPACE: IdSpace = IdSpace::new();

#[inline]
fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Clone)]
struct ExemplarState {
    slowest: SlowestHeap,
    fastest: FastestHeap,
    average: Reservoir,
    failures: Reservoir,
}

impl ExemplarState {
    fn new(capacity: usize) -> Self {
        ExemplarState {
            slowest: SlowestHeap::new(capacity),
            fastest: FastestHeap::new(capacity),
            average: Reservoir::new(capacity),
            failures: Reservoir::new(capacity),
        }
    }

    fn is_saturated(&self) -> bool {
        self.slowest.is_full() && self.fastest.is_full()
    }

    /// Whether a successful observation would enter neither heap
    fn is_boring(&self, latency: Duration) -> bool {
        if !self.is_saturated() {
            return false;
        }
        match (self.fastest.ceiling(), self.slowest.floor()) {
            (Some(ceiling), Some(floor)) => latency > ceiling && latency < floor,
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.slowest.clear();
        self.fastest.clear();
        self.average.clear();
        self.failures.clear();
    }
}

/// Bounded sample sets over one observation stream.
pub struct Exemplar {
    id: CreationId,
    capacity: usize,
    sampling_mask: u64,
    saturated: AtomicBool,
    slowest_floor: AtomicU64,
    fastest_ceiling: AtomicU64,
    state: Mutex<ExemplarState>,
}

impl Exemplar {
    pub fn new(config: &ExemplarConfig) -> Result<Self, MetricsError> {
        config.check()?;
        Ok(Exemplar::build(config.capacity(), config.sampling_rate() - 1))
    }

    fn build(capacity: usize, sampling_mask: u64) -> Self {
        Exemplar {
            id: EXEMPLAR_ID_SPACE.next_id(),
            capacity,
            sampling_mask,
            saturated: AtomicBool::new(false),
            slowest_floor: AtomicU64::new(0),
            fastest_ceiling: AtomicU64::new(0),
            state: Mutex::new(ExemplarState::new(capacity)),
        }
    }

    /// An empty exemplar with the same settings
    pub(super) fn empty_like(&self) -> Self {
        Exemplar::build(self.capacity, self.sampling_mask)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sampling_rate(&self) -> u64 {
        self.sampling_mask + 1
    }

    #[inline]
    fn sampled(&self) -> bool {
        self.sampling_mask == 0 || fastrand::u64(..) & self.sampling_mask == 0
    }

    fn is_boring_fast(&self, nanos: u64) -> bool {
        self.saturated.load(Ordering::Acquire)
            && nanos > self.fastest_ceiling.load(Ordering::Acquire)
            && nanos < self.slowest_floor.load(Ordering::Acquire)
    }

    fn publish_bounds(&self, state: &ExemplarState) {
        if let Some(floor) = state.slowest.floor() {
            self.slowest_floor
                .store(duration_nanos(floor), Ordering::Release);
        }
        if let Some(ceiling) = state.fastest.ceiling() {
            self.fastest_ceiling
                .store(duration_nanos(ceiling), Ordering::Release);
        }
        self.saturated
            .store(state.is_saturated(), Ordering::Release);
    }

    pub fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str) {
        if !error && self.is_boring_fast(duration_nanos(latency)) {
            // the lock is only taken for sampled offers, a rate of 1 samples all of them
            if self.sampled() {
                let item = ExemplarItem::new(latency, request_id, error, msg);
                lock(&self.state).average.offer(Arc::new(item));
            }
            return;
        }

        let item = Arc::new(ExemplarItem::new(latency, request_id, error, msg));
        let mut state = lock(&self.state);
        if !error && state.is_boring(latency) {
            if self.sampled() {
                state.average.offer(item);
            }
            return;
        }

        state.slowest.push_item(item.clone());
        state.fastest.push_item(item.clone());
        if error {
            state.failures.offer(item);
        } else if self.sampled() {
            state.average.offer(item);
        }
        self.publish_bounds(&state);
    }

    /// Replay the samples of `other` into this exemplar
    pub fn merge(&self, other: &Exemplar) {
        if self.id == other.id {
            return;
        }
        let (mut this, that) = lock_pair((&self.state, self.id), (&other.state, other.id));
        for item in that.slowest.items() {
            this.slowest.push_item(item.clone());
        }
        for item in that.fastest.items() {
            this.fastest.push_item(item.clone());
        }
        this.average.merge_from(&that.average);
        this.failures.merge_from(&that.failures);
        self.publish_bounds(&this);
    }

    /// The slowest samples, in descending latency order
    pub fn snapshot(&self) -> Vec<ExemplarItem> {
        let state = lock(&self.state);
        sorted_desc(state.slowest.items())
    }

    pub fn detailed_snapshot(&self) -> ExemplarDetails {
        let state = lock(&self.state);
        let mut fastest = sorted_desc(state.fastest.items());
        fastest.reverse();
        ExemplarDetails {
            slowest: sorted_desc(state.slowest.items()),
            fastest,
            average: sorted_desc(state.average.items().iter()),
            failures: sorted_desc(state.failures.items().iter()),
        }
    }

    /// Number of observations offered to the average and failure samples
    pub fn population(&self) -> (u64, u64) {
        let state = lock(&self.state);
        (state.average.seen(), state.failures.seen())
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        self.saturated.store(false, Ordering::Release);
        state.clear();
        self.slowest_floor.store(0, Ordering::Release);
        self.fastest_ceiling.store(0, Ordering::Release);
    }
}

impl Clone for Exemplar {
    fn clone(&self) -> Self {
        let state = lock(&self.state).clone();
        let new = Exemplar::build(self.capacity, self.sampling_mask);
        new.publish_bounds(&state);
        *lock(&new.state) = state;
        new
    }
}

fn sorted_desc<'a, I>(items: I) -> Vec<ExemplarItem>
where
    I: Iterator<Item = &'a Arc<ExemplarItem>>,
{
    let mut items: Vec<ExemplarItem> = items.map(|i| ExemplarItem::clone(i)).collect();
    items.sort_by(|a, b| {
        b.latency
            .cmp(&a.latency)
            .then_with(|| a.request_id.cmp(&b.request_id))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn exemplar(capacity: usize) -> Exemplar {
        Exemplar::new(&ExemplarConfig::with_capacity(capacity)).unwrap()
    }

    fn ids(items: &[ExemplarItem]) -> Vec<&str> {
        items.iter().map(|i| i.request_id.as_str()).collect()
    }

    #[test]
    fn slowest_view() {
        let e = exemplar(3);
        e.offer(Duration::from_millis(100), "req-1", false, "");
        e.offer(Duration::from_millis(200), "req-2", false, "");
        e.offer(Duration::from_millis(50), "req-3", false, "");
        e.offer(Duration::from_millis(300), "req-4", false, "");
        let snap = e.snapshot();
        assert_eq!(ids(&snap), ["req-4", "req-2", "req-1"]);
    }

    #[test]
    fn top_k_both_ends() {
        let e = exemplar(5);
        for i in 0..1000u64 {
            let ms = (i * 37) % 1000;
            e.offer(Duration::from_millis(ms), &format!("r{ms}"), false, "");
        }
        let details = e.detailed_snapshot();
        let slowest: Vec<u128> = details.slowest.iter().map(|i| i.latency.as_millis()).collect();
        assert_eq!(slowest, [999, 998, 997, 996, 995]);
        let fastest: Vec<u128> = details.fastest.iter().map(|i| i.latency.as_millis()).collect();
        assert_eq!(fastest, [0, 1, 2, 3, 4]);
        assert_eq!(details.average.len(), 5);
        assert!(details.failures.is_empty());
        assert_eq!(e.population(), (1000, 0));
    }

    #[test]
    fn failures_sampled() {
        let e = exemplar(2);
        e.offer(Duration::from_millis(10), "ok", false, "");
        for i in 0..10 {
            e.offer(Duration::from_millis(20 + i), &format!("bad-{i}"), true, "boom");
        }
        let details = e.detailed_snapshot();
        assert_eq!(details.failures.len(), 2);
        assert!(details.failures.iter().all(|i| i.error && i.msg == "boom"));
        assert!(details.failures[0].latency >= details.failures[1].latency);
        assert_eq!(e.population(), (1, 10));
    }

    #[test]
    fn sub_sampling() {
        let mut config = ExemplarConfig::with_capacity(4);
        config.set_sampling_rate(1024);
        let e = Exemplar::new(&config).unwrap();
        for i in 0..4096u64 {
            e.offer(Duration::from_micros(i), "r", false, "");
        }
        let (average, _) = e.population();
        assert!(average < 100, "average population {average}");
        assert_eq!(e.sampling_rate(), 1024);
    }

    #[test]
    fn boring_offers_at_rate_one() {
        let e = exemplar(4);
        for us in 0..8u64 {
            e.offer(Duration::from_micros(us), "edge", false, "");
        }
        for _ in 0..1000 {
            e.offer(Duration::from_nanos(3_500), "boring", false, "");
        }
        let (average, failures) = e.population();
        assert_eq!(average, 1008);
        assert_eq!(failures, 0);
        let details = e.detailed_snapshot();
        assert!(details.slowest.iter().all(|i| i.request_id == "edge"));
        assert!(details.fastest.iter().all(|i| i.request_id == "edge"));
    }

    #[test]
    fn merge_replays_heaps() {
        let a = exemplar(3);
        let b = exemplar(3);
        for ms in [10, 20, 30] {
            a.offer(Duration::from_millis(ms), &format!("a{ms}"), false, "");
        }
        for ms in [5, 25, 35] {
            b.offer(Duration::from_millis(ms), &format!("b{ms}"), false, "");
        }
        a.merge(&b);
        let details = a.detailed_snapshot();
        assert_eq!(ids(&details.slowest), ["b35", "a30", "b25"]);
        assert_eq!(ids(&details.fastest), ["b5", "a10", "a20"]);
        assert_eq!(e_population_sum(&a), 6);

        // the source is untouched and self merge is a no-op
        assert_eq!(b.snapshot().len(), 3);
        a.merge(&a);
        assert_eq!(a.snapshot().len(), 3);
    }

    fn e_population_sum(e: &Exemplar) -> u64 {
        let (avg, fail) = e.population();
        avg + fail
    }

    #[test]
    fn clone_and_reset() {
        let a = exemplar(2);
        a.offer(Duration::from_millis(1), "x", false, "");
        let b = a.clone();
        a.reset();
        assert!(a.snapshot().is_empty());
        assert_eq!(b.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_offer() {
        let e = exemplar(8);
        thread::scope(|s| {
            for t in 0..4u64 {
                let e = &e;
                s.spawn(move || {
                    for i in 0..2000u64 {
                        let v = t * 2000 + i;
                        e.offer(Duration::from_micros(v), &v.to_string(), false, "");
                    }
                });
            }
        });
        let details = e.detailed_snapshot();
        let slowest: Vec<u128> = details.slowest.iter().map(|i| i.latency.as_micros()).collect();
        assert_eq!(slowest, (7992..8000).rev().collect::<Vec<u128>>());
        let fastest: Vec<u128> = details.fastest.iter().map(|i| i.latency.as_micros()).collect();
        assert_eq!(fastest, (0..8).collect::<Vec<u128>>());
    }
}
