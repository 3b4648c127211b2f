/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Serialize;

use crate::exemplar::{AnyExemplar, ExemplarItem, MetricExemplar};
use crate::histogram::{AnyHistogram, HistogramSnapshot, MetricHistogram};
use crate::request::unix_nanos;
use crate::sync::{CreationId, IdSpace, read, read_pair, write, write_pair};
use crate::{CollectorConfig, MetricsError, RequestResult};

static SLOT_ID_SPACE: IdSpace = IdSpace::new();

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub window_start: u64,
    pub total: u64,
    pub errors: u64,
    /// unix nanoseconds of the latest completion seen
    pub last_updated: u64,
    pub latencies: HistogramSnapshot,
    pub queue_waits: HistogramSnapshot,
    pub counters: Vec<u64>,
    /// slowest samples, descending
    pub exemplars: Vec<ExemplarItem>,
}

struct SlotState {
    window_start: u64,
    total: AtomicU64,
    errors: AtomicU64,
    last_updated: AtomicU64,
    latencies: AnyHistogram,
    queue_waits: AnyHistogram,
    exemplar: AnyExemplar,
    counters: Box<[AtomicU64]>,
}

impl SlotState {
    fn is_empty(&self) -> bool {
        self.total.load(Ordering::Relaxed) == 0
            && self
                .counters
                .iter()
                .all(|c| c.load(Ordering::Relaxed) == 0)
    }

    fn record(&self, rr: &RequestResult) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if rr.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let stamp = rr
            .ended_at
            .and_then(unix_nanos)
            .or_else(|| unix_nanos(SystemTime::now()))
            .unwrap_or_default();
        self.last_updated.fetch_max(stamp, Ordering::Relaxed);

        self.latencies.record(rr.latency.as_nanos() as f64);
        self.queue_waits.record(rr.queue_wait.as_nanos() as f64);
        self.exemplar
            .offer(rr.latency, &rr.request_id, rr.is_error(), &rr.msg);
    }

    fn add_counter(&self, index: usize, val: u64) {
        if let Some(c) = self.counters.get(index) {
            c.fetch_add(val, Ordering::Relaxed);
        }
    }

    fn reset(&mut self) {
        self.total.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.last_updated.store(0, Ordering::Relaxed);
        self.latencies.reset();
        self.queue_waits.reset();
        self.exemplar.reset();
        for c in self.counters.iter() {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn check_merge(&self, other: &SlotState) -> Result<(), MetricsError> {
        self.latencies.check_merge(&other.latencies)?;
        self.queue_waits.check_merge(&other.queue_waits)?;
        self.exemplar.check_merge(&other.exemplar)?;
        if self.counters.len() != other.counters.len() {
            return Err(MetricsError::incompatible(format!(
                "slot counters: {} vs {}",
                self.counters.len(),
                other.counters.len()
            )));
        }
        Ok(())
    }

    fn merge_from(&mut self, other: &SlotState) -> Result<(), MetricsError> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() || other.window_start > self.window_start {
            self.reset();
            self.window_start = other.window_start;
        } else if other.window_start < self.window_start {
            return Ok(());
        }

        self.total
            .fetch_add(other.total.load(Ordering::Relaxed), Ordering::Relaxed);
        self.errors
            .fetch_add(other.errors.load(Ordering::Relaxed), Ordering::Relaxed);
        self.last_updated
            .fetch_max(other.last_updated.load(Ordering::Relaxed), Ordering::Relaxed);
        for (a, b) in self.counters.iter().zip(other.counters.iter()) {
            a.fetch_add(b.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.latencies.merge(&other.latencies)?;
        self.queue_waits.merge(&other.queue_waits)?;
        self.exemplar.merge(&other.exemplar)
    }

    fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            window_start: self.window_start,
            total: self.total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_updated: self.last_updated.load(Ordering::Relaxed),
            latencies: self.latencies.snapshot(),
            queue_waits: self.queue_waits.snapshot(),
            counters: self
                .counters
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            exemplars: self.exemplar.snapshot(),
        }
    }
}

impl Clone for SlotState {
    fn clone(&self) -> Self {
        SlotState {
            window_start: self.window_start,
            total: AtomicU64::new(self.total.load(Ordering::Relaxed)),
            errors: AtomicU64::new(self.errors.load(Ordering::Relaxed)),
            last_updated: AtomicU64::new(self.last_updated.load(Ordering::Relaxed)),
            latencies: self.latencies.clone(),
            queue_waits: self.queue_waits.clone(),
            exemplar: self.exemplar.clone(),
            counters: self
                .counters
                .iter()
                .map(|c| AtomicU64::new(c.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// One aggregation window.
pub struct Slot {
    id: CreationId,
    state: RwLock<SlotState>,
}

impl Slot {
    pub fn new(config: &CollectorConfig) -> Result<Self, MetricsError> {
        config.check()?;
        let state = SlotState {
            window_start: 0,
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_updated: AtomicU64::new(0),
            latencies: AnyHistogram::new(config.latency_histogram())?,
            queue_waits: AnyHistogram::new(config.queue_wait_histogram())?,
            exemplar: AnyExemplar::new(config.exemplar())?,
            counters: config.counters().iter().map(|_| AtomicU64::new(0)).collect(),
        };
        Ok(Slot {
            id: SLOT_ID_SPACE.next_id(),
            state: RwLock::new(state),
        })
    }

    #[inline]
    pub fn id(&self) -> CreationId {
        self.id
    }

    pub fn window_start(&self) -> u64 {
        read(&self.state).window_start
    }

    /// Record into `window`, observations for retired windows are dropped
    pub fn record(&self, rr: &RequestResult, window: u64) {
        {
            let state = read(&self.state);
            if state.window_start == window {
                state.record(rr);
                return;
            }
        }

        let mut state = write(&self.state);
        if window < state.window_start {
            return;
        }
        if window > state.window_start {
            state.reset();
            state.window_start = window;
        }
        state.record(rr);
    }

    /// Increment the custom counter at `index` within `window`
    pub fn add_counter(&self, index: usize, val: u64, window: u64) {
        {
            let state = read(&self.state);
            if state.window_start == window {
                state.add_counter(index, val);
                return;
            }
        }

        let mut state = write(&self.state);
        if window < state.window_start {
            return;
        }
        if window > state.window_start {
            state.reset();
            state.window_start = window;
        }
        state.add_counter(index, val);
    }

    pub fn check_merge(&self, other: &Slot) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        let (this, that) = read_pair((&self.state, self.id), (&other.state, other.id));
        this.check_merge(&that)
    }

    /// Merge `other` into this slot, the newer window wins
    pub fn merge(&self, other: &Slot) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        let (mut this, that) = write_pair((&self.state, self.id), (&other.state, other.id));
        this.check_merge(&that)?;
        this.merge_from(&that)
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        read(&self.state).snapshot()
    }

    pub fn reset(&self) {
        let mut state = write(&self.state);
        state.reset();
        state.window_start = 0;
    }
}

impl Clone for Slot {
    fn clone(&self) -> Self {
        let state = read(&self.state).clone();
        Slot {
            id: SLOT_ID_SPACE.next_id(),
            state: RwLock::new(state),
        }
    }
}
