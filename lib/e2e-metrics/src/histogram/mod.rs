/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use crate::{HistogramConfig, MetricsError};

mod bucket;
use bucket::BucketLayout;

mod single;
pub use single::Histogram;
pub(crate) use single::HistogramState;

mod sharded;
pub use sharded::ShardedHistogram;

mod snapshot;
pub use snapshot::HistogramSnapshot;

pub trait MetricHistogram: Send + Sync {
    fn record(&self, val: f64);
    fn snapshot(&self) -> HistogramSnapshot;
    fn reset(&self);
    fn bounds_hash(&self) -> u64;
    fn shard_count(&self) -> usize;
}

impl MetricHistogram for Histogram {
    fn record(&self, val: f64) {
        Histogram::record(self, val);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        Histogram::snapshot(self)
    }

    fn reset(&self) {
        Histogram::reset(self);
    }

    fn bounds_hash(&self) -> u64 {
        Histogram::bounds_hash(self)
    }

    fn shard_count(&self) -> usize {
        1
    }
}

impl MetricHistogram for ShardedHistogram {
    fn record(&self, val: f64) {
        ShardedHistogram::record(self, val);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        ShardedHistogram::snapshot(self)
    }

    fn reset(&self) {
        ShardedHistogram::reset(self);
    }

    fn bounds_hash(&self) -> u64 {
        ShardedHistogram::bounds_hash(self)
    }

    fn shard_count(&self) -> usize {
        ShardedHistogram::shard_count(self)
    }
}

/// A histogram whose sharding is decided by its config.
#[derive(Clone)]
pub enum AnyHistogram {
    Single(Histogram),
    Sharded(ShardedHistogram),
}

impl AnyHistogram {
    pub fn new(config: &HistogramConfig) -> Result<Self, MetricsError> {
        if config.is_sharded() {
            Ok(AnyHistogram::Sharded(ShardedHistogram::new(config)?))
        } else {
            Ok(AnyHistogram::Single(Histogram::new(config)?))
        }
    }

    fn inner(&self) -> &dyn MetricHistogram {
        match self {
            AnyHistogram::Single(h) => h,
            AnyHistogram::Sharded(h) => h,
        }
    }

    pub fn check_merge(&self, other: &AnyHistogram) -> Result<(), MetricsError> {
        match (self, other) {
            (AnyHistogram::Single(a), AnyHistogram::Single(b)) => a.check_merge(b),
            (AnyHistogram::Sharded(a), AnyHistogram::Sharded(b)) => a.check_merge(b),
            _ => Err(MetricsError::TypeMismatch("histogram")),
        }
    }

    pub fn merge(&self, other: &AnyHistogram) -> Result<(), MetricsError> {
        match (self, other) {
            (AnyHistogram::Single(a), AnyHistogram::Single(b)) => a.merge(b),
            (AnyHistogram::Sharded(a), AnyHistogram::Sharded(b)) => a.merge(b),
            _ => Err(MetricsError::TypeMismatch("histogram")),
        }
    }
}

impl MetricHistogram for AnyHistogram {
    fn record(&self, val: f64) {
        self.inner().record(val);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        self.inner().snapshot()
    }

    fn reset(&self) {
        self.inner().reset();
    }

    fn bounds_hash(&self) -> u64 {
        self.inner().bounds_hash()
    }

    fn shard_count(&self) -> usize {
        self.inner().shard_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_by_config() {
        let config = HistogramConfig::new(1.0, 100.0, 1.6, 10);
        let h = AnyHistogram::new(&config).unwrap();
        assert!(matches!(h, AnyHistogram::Single(_)));
        assert_eq!(h.shard_count(), 1);

        let h = AnyHistogram::new(&config.clone().with_shards(4)).unwrap();
        assert!(matches!(h, AnyHistogram::Sharded(_)));
        assert_eq!(h.shard_count(), 4);
    }

    #[test]
    fn mixed_merge() {
        let config = HistogramConfig::new(1.0, 100.0, 1.6, 10);
        let a = AnyHistogram::new(&config).unwrap();
        let b = AnyHistogram::new(&config.clone().with_shards(2)).unwrap();
        b.record(4.0);
        assert_eq!(a.merge(&b), Err(MetricsError::TypeMismatch("histogram")));
        assert_eq!(a.snapshot().total, 0);
        assert_eq!(a.bounds_hash(), b.bounds_hash());
    }
}
