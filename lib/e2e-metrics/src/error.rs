/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("histogram min should be > 0, got {0}")]
    InvalidHistogramMin(f64),
    #[error("histogram max {max} should be greater than min {min}")]
    InvalidHistogramMax { min: f64, max: f64 },
    #[error("histogram growth should be > 1, got {0}")]
    InvalidGrowth(f64),
    #[error("histogram needs at least 2 buckets, got {0}")]
    TooFewBuckets(usize),
    #[error("{0} shard count should be positive")]
    ZeroShards(&'static str),
    #[error("t-digest compression should be > 0, got {0}")]
    InvalidCompression(f64),
    #[error("t-digest compression trigger factor should be >= 1, got {0}")]
    InvalidTriggerFactor(f64),
    #[error("quantile {0} is out of range [0, 1]")]
    InvalidQuantile(f64),
    #[error("exemplar capacity should be positive")]
    ZeroCapacity,
    #[error("exemplar sampling rate {0} is not a power of two")]
    SamplingRateNotPowerOfTwo(u64),
    #[error("scale {0} has zero width")]
    ZeroScaleWidth(String),
    #[error("scale {0} has zero capacity")]
    ZeroScaleCapacity(String),
    #[error("duplicated counter {0}")]
    DuplicatedCounter(String),
    #[error("duplicated scale {0}")]
    DuplicatedScale(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("incompatible {0}")]
    Incompatible(String),
    #[error("can not merge sharded {0} with non-sharded one")]
    TypeMismatch(&'static str),
    #[error("counter {0} not found")]
    CounterNotFound(String),
}

impl MetricsError {
    pub(crate) fn incompatible<S: Into<String>>(what: S) -> Self {
        MetricsError::Incompatible(what.into())
    }
}
