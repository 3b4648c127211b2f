/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;

use super::{BucketLayout, Histogram, HistogramSnapshot, HistogramState};
use crate::{HistogramConfig, MetricsError};

/// A set of independent [`Histogram`]s sharing one bucket layout.
pub struct ShardedHistogram {
    layout: Arc<BucketLayout>,
    shards: Box<[Histogram]>,
}

impl ShardedHistogram {
    pub fn new(config: &HistogramConfig) -> Result<Self, MetricsError> {
        config.check()?;
        let layout = Arc::new(BucketLayout::new(config));
        let shards = (0..config.shards())
            .map(|_| Histogram::with_layout(layout.clone()))
            .collect();
        Ok(ShardedHistogram { layout, shards })
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn bounds_hash(&self) -> u64 {
        self.layout.bounds_hash()
    }

    fn shard_of(&self, val: f64) -> &Histogram {
        let mut hasher = FnvHasher::default();
        hasher.write_u64(val.to_bits());
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn record(&self, val: f64) {
        if !val.is_finite() {
            return;
        }
        self.shard_of(val).record(val);
    }

    pub fn check_merge(&self, other: &ShardedHistogram) -> Result<(), MetricsError> {
        if self.bounds_hash() != other.bounds_hash() {
            return Err(MetricsError::incompatible(format!(
                "histogram bounds: {:#x} vs {:#x}",
                self.bounds_hash(),
                other.bounds_hash()
            )));
        }
        if self.shard_count() != other.shard_count() {
            return Err(MetricsError::incompatible(format!(
                "histogram shard count: {} vs {}",
                self.shard_count(),
                other.shard_count()
            )));
        }
        Ok(())
    }

    pub fn merge(&self, other: &ShardedHistogram) -> Result<(), MetricsError> {
        self.check_merge(other)?;
        for (a, b) in self.shards.iter().zip(other.shards.iter()) {
            a.merge(b)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut state = HistogramState::new(self.layout.buckets());
        for shard in &self.shards {
            state.merge_from(&shard.state());
        }
        HistogramSnapshot::build(&state, self.layout.shared_bounds())
    }

    pub fn reset(&self) {
        self.shards.iter().for_each(Histogram::reset);
    }
}

impl Clone for ShardedHistogram {
    fn clone(&self) -> Self {
        ShardedHistogram {
            layout: self.layout.clone(),
            shards: self.shards.iter().map(|h| h.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn config(shards: usize) -> HistogramConfig {
        HistogramConfig::new(1.0, 100.0, 1.6, 10).with_shards(shards)
    }

    #[test]
    fn snapshot_combines_shards() {
        let h = ShardedHistogram::new(&config(4)).unwrap();
        let single = Histogram::new(&config(1)).unwrap();
        for v in 1..=200 {
            let v = v as f64 * 0.5;
            h.record(v);
            single.record(v);
        }
        let snap = h.snapshot();
        let expected = single.snapshot();
        assert_eq!(snap.total, 200);
        assert_eq!(snap.counts, expected.counts);
        assert!((snap.mean - expected.mean).abs() < 1e-9);
        assert_eq!(snap.min, 0.5);
        assert_eq!(snap.max, 100.0);
        assert!(snap.is_consistent());
    }

    #[test]
    fn merge_requires_same_shape() {
        let a = ShardedHistogram::new(&config(4)).unwrap();
        let b = ShardedHistogram::new(&config(2)).unwrap();
        b.record(3.0);
        assert!(matches!(a.merge(&b), Err(MetricsError::Incompatible(_))));
        assert_eq!(a.snapshot().total, 0);

        let c = ShardedHistogram::new(&config(4)).unwrap();
        c.record(3.0);
        c.record(7.0);
        a.merge(&c).unwrap();
        assert_eq!(a.snapshot().total, 2);
    }

    #[test]
    fn concurrent_record() {
        let h = ShardedHistogram::new(&config(8)).unwrap();
        thread::scope(|s| {
            for t in 0..4 {
                let h = &h;
                s.spawn(move || {
                    for i in 0..500 {
                        h.record((t * 500 + i) as f64 / 10.0);
                    }
                });
            }
        });
        let snap = h.snapshot();
        assert_eq!(snap.total, 2000);
        assert!(snap.is_consistent());
        h.reset();
        assert_eq!(h.snapshot().total, 0);
    }
}
