/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;

use crate::HistogramConfig;
use crate::config::BINARY_SEARCH_MAX_BUCKETS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LocateStrategy {
    Log2,
    BinarySearch,
    Log,
}

impl LocateStrategy {
    fn select(growth: f64, buckets: usize) -> Self {
        if growth == 2.0 {
            LocateStrategy::Log2
        } else if buckets <= BINARY_SEARCH_MAX_BUCKETS {
            LocateStrategy::BinarySearch
        } else {
            LocateStrategy::Log
        }
    }
}

/// Immutable geometric bucket boundaries.
///
/// Bucket `0` holds values `<= bounds[0]`, bucket `i` holds values in
/// `(bounds[i-1], bounds[i]]` and the last bucket holds everything above the
/// last bound.
#[derive(Debug)]
pub(crate) struct BucketLayout {
    min: f64,
    ln_growth: f64,
    bounds: Arc<[f64]>,
    bounds_hash: u64,
    strategy: LocateStrategy,
}

impl BucketLayout {
    /// The config should have been checked
    pub(crate) fn new(config: &HistogramConfig) -> Self {
        let buckets = config.buckets();
        let strategy = LocateStrategy::select(config.growth(), buckets);
        BucketLayout::with_strategy(config, strategy)
    }

    pub(crate) fn with_strategy(config: &HistogramConfig, strategy: LocateStrategy) -> Self {
        let buckets = config.buckets();
        let min = config.min();
        let growth = config.growth();

        let mut bounds = Vec::with_capacity(buckets - 1);
        bounds.push(min);
        for i in 1..buckets - 1 {
            bounds.push(min * growth.powi(i as i32));
        }
        let bounds_hash = hash_bounds(&bounds);

        BucketLayout {
            min,
            ln_growth: growth.ln(),
            bounds: bounds.into(),
            bounds_hash,
            strategy,
        }
    }

    #[inline]
    pub(crate) fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    #[inline]
    pub(crate) fn shared_bounds(&self) -> Arc<[f64]> {
        self.bounds.clone()
    }

    #[inline]
    pub(crate) fn bounds_hash(&self) -> u64 {
        self.bounds_hash
    }

    #[inline]
    pub(crate) fn buckets(&self) -> usize {
        self.bounds.len() + 1
    }

    #[cfg(test)]
    pub(crate) fn strategy(&self) -> LocateStrategy {
        self.strategy
    }

    /// The value should be finite
    pub(crate) fn locate(&self, val: f64) -> usize {
        let last = self.bounds.len() - 1;
        if val <= self.bounds[0] {
            return 0;
        }
        if val > self.bounds[last] {
            return self.bounds.len();
        }

        match self.strategy {
            LocateStrategy::BinarySearch => self.bounds.partition_point(|b| *b < val),
            LocateStrategy::Log2 => {
                let guess = (val / self.min).log2().ceil();
                self.settle(val, guess)
            }
            LocateStrategy::Log => {
                let guess = ((val / self.min).ln() / self.ln_growth).ceil();
                self.settle(val, guess)
            }
        }
    }

    /// Move a formula guess onto the bucket the bounds array agrees with.
    fn settle(&self, val: f64, guess: f64) -> usize {
        let mut i = if guess.is_finite() && guess > 0.0 {
            (guess as usize).min(self.bounds.len())
        } else {
            0
        };
        while i > 0 && self.bounds[i - 1] >= val {
            i -= 1;
        }
        while i < self.bounds.len() && self.bounds[i] < val {
            i += 1;
        }
        i
    }
}

fn hash_bounds(bounds: &[f64]) -> u64 {
    let mut hasher = FnvHasher::default();
    for b in bounds {
        hasher.write(&b.to_bits().to_le_bytes());
    }
    hasher.finish()
}
