/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;

use crate::ConfigError;

/// Buckets above this count are located with the logarithm formula instead
/// of a binary search over the bounds.
pub(crate) const BINARY_SEARCH_MAX_BUCKETS: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct HistogramConfig {
    min: f64,
    max: f64,
    growth: f64,
    buckets: usize,
    shards: usize,
}

impl HistogramConfig {
    /// Create a geometric layout, the bucket count is derived from `max`
    pub fn with_range(min: f64, max: f64, growth: f64) -> Self {
        HistogramConfig {
            min,
            max,
            growth,
            buckets: 0,
            shards: 1,
        }
    }

    pub fn new(min: f64, max: f64, growth: f64, buckets: usize) -> Self {
        HistogramConfig {
            min,
            max,
            growth,
            buckets,
            shards: 1,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    #[inline]
    pub fn set_min(&mut self, min: f64) {
        self.min = min;
    }

    #[inline]
    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    #[inline]
    pub fn set_growth(&mut self, growth: f64) {
        self.growth = growth;
    }

    /// Set the bucket count, 0 means to derive it from min, max and growth
    #[inline]
    pub fn set_buckets(&mut self, buckets: usize) {
        self.buckets = buckets;
    }

    #[inline]
    pub fn set_shards(&mut self, shards: usize) {
        self.shards = shards;
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn growth(&self) -> f64 {
        self.growth
    }

    #[inline]
    pub fn shards(&self) -> usize {
        self.shards
    }

    #[inline]
    pub fn is_sharded(&self) -> bool {
        self.shards > 1
    }

    /// The effective bucket count, including the overflow bucket
    pub fn buckets(&self) -> usize {
        if self.buckets > 0 {
            return self.buckets;
        }
        if !(self.min > 0.0 && self.max > self.min && self.growth > 1.0) {
            return 0;
        }
        // smallest n with min * growth^n >= max
        let mut n = ((self.max / self.min).ln() / self.growth.ln()).ceil() as usize;
        while n > 0 && self.min * self.growth.powi(n as i32 - 1) >= self.max {
            n -= 1;
        }
        while self.min * self.growth.powi(n as i32) < self.max {
            n += 1;
        }
        n + 2
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if !(self.min > 0.0 && self.min.is_finite()) {
            return Err(ConfigError::InvalidHistogramMin(self.min));
        }
        if !(self.max > self.min && self.max.is_finite()) {
            return Err(ConfigError::InvalidHistogramMax {
                min: self.min,
                max: self.max,
            });
        }
        if !(self.growth > 1.0 && self.growth.is_finite()) {
            return Err(ConfigError::InvalidGrowth(self.growth));
        }
        let buckets = self.buckets();
        if buckets < 2 {
            return Err(ConfigError::TooFewBuckets(buckets));
        }
        if self.shards == 0 {
            return Err(ConfigError::ZeroShards("histogram"));
        }
        Ok(())
    }
}

impl Default for HistogramConfig {
    /// 1us to 60s in nanoseconds
    fn default() -> Self {
        HistogramConfig::with_range(1_000.0, 60_000_000_000.0, 1.2)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TDigestConfig {
    compression: f64,
    trigger_factor: f64,
    quantiles: Vec<f64>,
}

impl TDigestConfig {
    pub fn with_compression(compression: f64) -> Self {
        TDigestConfig {
            compression,
            ..Default::default()
        }
    }

    #[inline]
    pub fn set_compression(&mut self, compression: f64) {
        self.compression = compression;
    }

    #[inline]
    pub fn set_trigger_factor(&mut self, factor: f64) {
        self.trigger_factor = factor;
    }

    #[inline]
    pub fn set_quantiles(&mut self, quantiles: Vec<f64>) {
        self.quantiles = quantiles;
    }

    #[inline]
    pub fn compression(&self) -> f64 {
        self.compression
    }

    #[inline]
    pub fn trigger_factor(&self) -> f64 {
        self.trigger_factor
    }

    #[inline]
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if !(self.compression > 0.0 && self.compression.is_finite()) {
            return Err(ConfigError::InvalidCompression(self.compression));
        }
        if !(self.trigger_factor >= 1.0 && self.trigger_factor.is_finite()) {
            return Err(ConfigError::InvalidTriggerFactor(self.trigger_factor));
        }
        for q in &self.quantiles {
            if !(0.0..=1.0).contains(q) {
                return Err(ConfigError::InvalidQuantile(*q));
            }
        }
        Ok(())
    }
}

impl Default for TDigestConfig {
    fn default() -> Self {
        TDigestConfig {
            compression: 100.0,
            trigger_factor: 2.0,
            quantiles: vec![0.5, 0.9, 0.95, 0.99],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExemplarConfig {
    capacity: usize,
    sampling_rate: u64,
    shards: usize,
}

impl ExemplarConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        ExemplarConfig {
            capacity,
            sampling_rate: 1,
            shards: 1,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    #[inline]
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Keep 1 in `rate` of the non-error observations for the average view
    #[inline]
    pub fn set_sampling_rate(&mut self, rate: u64) {
        self.sampling_rate = rate;
    }

    #[inline]
    pub fn set_shards(&mut self, shards: usize) {
        self.shards = shards;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sampling_rate(&self) -> u64 {
        self.sampling_rate
    }

    #[inline]
    pub fn shards(&self) -> usize {
        self.shards
    }

    #[inline]
    pub fn is_sharded(&self) -> bool {
        self.shards > 1
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.sampling_rate.is_power_of_two() {
            return Err(ConfigError::SamplingRateNotPowerOfTwo(self.sampling_rate));
        }
        if self.shards == 0 {
            return Err(ConfigError::ZeroShards("exemplar"));
        }
        Ok(())
    }
}

impl Default for ExemplarConfig {
    fn default() -> Self {
        ExemplarConfig::with_capacity(10)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    /// windows keyed by the completion time, width in nanoseconds
    Time,
    /// windows keyed by the request id found in the context
    Range,
}

impl ScaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleKind::Time => "time",
            ScaleKind::Range => "range",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleConfig {
    name: String,
    kind: ScaleKind,
    width: u64,
    capacity: usize,
}

impl ScaleConfig {
    pub fn time(name: &str, width: Duration, capacity: usize) -> Self {
        ScaleConfig {
            name: name.to_string(),
            kind: ScaleKind::Time,
            width: u64::try_from(width.as_nanos()).unwrap_or(u64::MAX),
            capacity,
        }
    }

    pub fn range(name: &str, width: u64, capacity: usize) -> Self {
        ScaleConfig {
            name: name.to_string(),
            kind: ScaleKind::Range,
            width,
            capacity,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ScaleKind {
        self.kind
    }

    #[inline]
    pub fn width(&self) -> u64 {
        self.width
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.width == 0 {
            return Err(ConfigError::ZeroScaleWidth(self.name.clone()));
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroScaleCapacity(self.name.clone()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectorConfig {
    latency: HistogramConfig,
    queue_wait: HistogramConfig,
    tdigest: Option<TDigestConfig>,
    exemplar: ExemplarConfig,
    counters: Vec<String>,
    scales: Vec<ScaleConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            latency: HistogramConfig::default(),
            queue_wait: HistogramConfig::default(),
            tdigest: Some(TDigestConfig::default()),
            exemplar: ExemplarConfig::default(),
            counters: Vec::new(),
            scales: Vec::new(),
        }
    }
}

impl CollectorConfig {
    #[inline]
    pub fn set_latency_histogram(&mut self, config: HistogramConfig) {
        self.latency = config;
    }

    #[inline]
    pub fn set_queue_wait_histogram(&mut self, config: HistogramConfig) {
        self.queue_wait = config;
    }

    /// Set to `None` to disable the quantile sketches
    #[inline]
    pub fn set_tdigest(&mut self, config: Option<TDigestConfig>) {
        self.tdigest = config;
    }

    #[inline]
    pub fn set_exemplar(&mut self, config: ExemplarConfig) {
        self.exemplar = config;
    }

    pub fn add_counter(&mut self, name: &str) {
        self.counters.push(name.to_string());
    }

    pub fn add_scale(&mut self, scale: ScaleConfig) {
        self.scales.push(scale);
    }

    pub fn with_counter(mut self, name: &str) -> Self {
        self.add_counter(name);
        self
    }

    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.add_scale(scale);
        self
    }

    #[inline]
    pub fn latency_histogram(&self) -> &HistogramConfig {
        &self.latency
    }

    #[inline]
    pub fn queue_wait_histogram(&self) -> &HistogramConfig {
        &self.queue_wait
    }

    #[inline]
    pub fn tdigest(&self) -> Option<&TDigestConfig> {
        self.tdigest.as_ref()
    }

    #[inline]
    pub fn exemplar(&self) -> &ExemplarConfig {
        &self.exemplar
    }

    #[inline]
    pub fn counters(&self) -> &[String] {
        &self.counters
    }

    #[inline]
    pub fn scales(&self) -> &[ScaleConfig] {
        &self.scales
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.latency.check()?;
        self.queue_wait.check()?;
        if let Some(tdigest) = &self.tdigest {
            tdigest.check()?;
        }
        self.exemplar.check()?;

        let mut names = HashSet::with_capacity(self.counters.len());
        for name in &self.counters {
            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicatedCounter(name.clone()));
            }
        }

        let mut names = HashSet::with_capacity(self.scales.len());
        for scale in &self.scales {
            scale.check()?;
            if !names.insert(scale.name()) {
                return Err(ConfigError::DuplicatedScale(scale.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_buckets() {
        let config = HistogramConfig::with_range(1.0, 8.0, 2.0);
        // bounds 1 2 4 8 plus the overflow bucket
        assert_eq!(config.buckets(), 5);

        let config = HistogramConfig::with_range(1.0, 9.0, 2.0);
        assert_eq!(config.buckets(), 6);

        let config = HistogramConfig::new(1.0, 100.0, 1.6, 10);
        assert_eq!(config.buckets(), 10);
        assert!(config.check().is_ok());
    }

    #[test]
    fn histogram_check() {
        assert_eq!(
            HistogramConfig::with_range(0.0, 10.0, 2.0).check(),
            Err(ConfigError::InvalidHistogramMin(0.0))
        );
        assert!(matches!(
            HistogramConfig::with_range(10.0, 10.0, 2.0).check(),
            Err(ConfigError::InvalidHistogramMax { .. })
        ));
        assert_eq!(
            HistogramConfig::with_range(1.0, 10.0, 1.0).check(),
            Err(ConfigError::InvalidGrowth(1.0))
        );
        assert_eq!(
            HistogramConfig::new(1.0, 10.0, 2.0, 1).check(),
            Err(ConfigError::TooFewBuckets(1))
        );
        assert_eq!(
            HistogramConfig::default().with_shards(0).check(),
            Err(ConfigError::ZeroShards("histogram"))
        );
        assert!(HistogramConfig::default().check().is_ok());
    }

    #[test]
    fn tdigest_check() {
        assert!(TDigestConfig::default().check().is_ok());
        assert_eq!(
            TDigestConfig::with_compression(0.0).check(),
            Err(ConfigError::InvalidCompression(0.0))
        );
        let mut config = TDigestConfig::default();
        config.set_trigger_factor(0.5);
        assert_eq!(config.check(), Err(ConfigError::InvalidTriggerFactor(0.5)));
        let mut config = TDigestConfig::default();
        config.set_quantiles(vec![0.5, 1.5]);
        assert_eq!(config.check(), Err(ConfigError::InvalidQuantile(1.5)));
    }

    #[test]
    fn exemplar_check() {
        assert!(ExemplarConfig::default().check().is_ok());
        assert_eq!(
            ExemplarConfig::with_capacity(0).check(),
            Err(ConfigError::ZeroCapacity)
        );
        let mut config = ExemplarConfig::default();
        config.set_sampling_rate(3);
        assert_eq!(
            config.check(),
            Err(ConfigError::SamplingRateNotPowerOfTwo(3))
        );
        config.set_sampling_rate(0);
        assert_eq!(
            config.check(),
            Err(ConfigError::SamplingRateNotPowerOfTwo(0))
        );
        config.set_sampling_rate(16);
        assert!(config.check().is_ok());
    }

    #[test]
    fn collector_check() {
        let config = CollectorConfig::default()
            .with_counter("a")
            .with_counter("a");
        assert_eq!(
            config.check(),
            Err(ConfigError::DuplicatedCounter("a".to_string()))
        );

        let config = CollectorConfig::default()
            .with_scale(ScaleConfig::range("r", 0, 4));
        assert_eq!(
            config.check(),
            Err(ConfigError::ZeroScaleWidth("r".to_string()))
        );

        let config = CollectorConfig::default()
            .with_scale(ScaleConfig::time("t", Duration::from_secs(1), 0));
        assert_eq!(
            config.check(),
            Err(ConfigError::ZeroScaleCapacity("t".to_string()))
        );

        let config = CollectorConfig::default()
            .with_scale(ScaleConfig::range("r", 10, 4))
            .with_scale(ScaleConfig::time("r", Duration::from_secs(1), 4));
        assert_eq!(
            config.check(),
            Err(ConfigError::DuplicatedScale("r".to_string()))
        );
    }
}
