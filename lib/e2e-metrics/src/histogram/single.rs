/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};

use super::{BucketLayout, HistogramSnapshot};
use crate::sync::{CreationId, IdSpace, lock, lock_pair};
use crate::{HistogramConfig, MetricsError};

static HISTOGRAM_ID_SPACE: IdSpace = IdSpace::new();

#[derive(Clone, Debug)]
pub(crate) struct HistogramState {
    pub(crate) counts: Vec<u64>,
    pub(crate) total: u64,
    pub(crate) mean: f64,
    pub(crate) m2: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl HistogramState {
    pub(crate) fn new(buckets: usize) -> Self {
        HistogramState {
            counts: vec![0; buckets],
            total: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn from_snapshot(snap: &HistogramSnapshot) -> Self {
        let mut state = HistogramState::new(snap.counts.len());
        if snap.total > 0 {
            state.counts.copy_from_slice(&snap.counts);
            state.total = snap.total;
            state.mean = snap.mean;
            state.m2 = snap.m2;
            state.min = snap.min;
            state.max = snap.max;
        }
        state
    }

    fn record(&mut self, bucket: usize, val: f64) {
        self.counts[bucket] += 1;
        self.total += 1;
        if val < self.min {
            self.min = val;
        }
        if val > self.max {
            self.max = val;
        }

        // Welford
        let delta = val - self.mean;
        self.mean += delta / self.total as f64;
        self.m2 = delta.mul_add(val - self.mean, self.m2);
    }

    /// Combine with the parallel variance formula.
    pub(crate) fn merge_from(&mut self, other: &HistogramState) {
        if other.total == 0 {
            return;
        }
        if self.total == 0 {
            self.clone_from(other);
            return;
        }

        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += *b;
        }

        let na = self.total as f64;
        let nb = other.total as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean = delta.mul_add(nb / n, self.mean);
        self.m2 = (delta * delta).mul_add(na * nb / n, self.m2 + other.m2);
        self.total += other.total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn reset(&mut self) {
        self.counts.fill(0);
        self.total = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }
}

/// Geometric histogram guarded by a single lock.
pub struct Histogram {
    id: CreationId,
    layout: Arc<BucketLayout>,
    state: Mutex<HistogramState>,
}

impl Histogram {
    pub fn new(config: &HistogramConfig) -> Result<Self, MetricsError> {
        config.check()?;
        Ok(Histogram::with_layout(Arc::new(BucketLayout::new(config))))
    }

    pub(crate) fn with_layout(layout: Arc<BucketLayout>) -> Self {
        let state = HistogramState::new(layout.buckets());
        Histogram {
            id: HISTOGRAM_ID_SPACE.next_id(),
            layout,
            state: Mutex::new(state),
        }
    }

    #[inline]
    pub fn id(&self) -> CreationId {
        self.id
    }

    #[inline]
    pub fn bounds_hash(&self) -> u64 {
        self.layout.bounds_hash()
    }

    #[inline]
    pub fn bounds(&self) -> &[f64] {
        self.layout.bounds()
    }

    /// Record a value, NaN and infinite values are dropped
    pub fn record(&self, val: f64) {
        if !val.is_finite() {
            return;
        }
        let bucket = self.layout.locate(val);
        lock(&self.state).record(bucket, val);
    }

    pub fn check_merge(&self, other: &Histogram) -> Result<(), MetricsError> {
        if self.bounds_hash() != other.bounds_hash() {
            return Err(MetricsError::incompatible(format!(
                "histogram bounds: {:#x} vs {:#x}",
                self.bounds_hash(),
                other.bounds_hash()
            )));
        }
        Ok(())
    }

    /// Merge `other` into this histogram
    pub fn merge(&self, other: &Histogram) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        self.check_merge(other)?;

        let (mut this, that) = lock_pair((&self.state, self.id), (&other.state, other.id));
        this.merge_from(&that);
        Ok(())
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = lock(&self.state);
        HistogramSnapshot::build(&state, self.layout.shared_bounds())
    }

    pub fn reset(&self) {
        lock(&self.state).reset();
    }

    pub(crate) fn state(&self) -> HistogramState {
        lock(&self.state).clone()
    }

    pub(crate) fn layout(&self) -> &Arc<BucketLayout> {
        &self.layout
    }
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        let state = self.state();
        Histogram {
            id: HISTOGRAM_ID_SPACE.next_id(),
            layout: self.layout.clone(),
            state: Mutex::new(state),
        }
    }
}
