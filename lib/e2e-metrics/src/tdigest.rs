/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::sync::{CreationId, IdSpace, lock, lock_pair};
use crate::{MetricsError, TDigestConfig};

static TDIGEST_ID_SPACE: IdSpace = IdSpace::new();

pub const TDIGEST_SKETCH_KIND: &str = "tdigest";

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Centroid {
    pub mean: f64,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QuantileValue {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TDigestSnapshot {
    pub centroids: Vec<Centroid>,
    pub count: f64,
    pub min: f64,
    pub max: f64,
    pub compression: f64,
    pub trigger_factor: f64,
    pub quantiles: Vec<QuantileValue>,
}

impl TDigestSnapshot {
    pub fn quantile(&self, q: f64) -> f64 {
        estimate_quantile(&self.centroids, self.count, self.min, self.max, q)
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        TDIGEST_SKETCH_KIND
    }

    /// Merge another digest snapshot, keeping the compression of this one.
    pub fn merge(&mut self, other: &TDigestSnapshot) {
        if other.count <= 0.0 {
            return;
        }
        if self.count <= 0.0 && self.centroids.is_empty() && self.compression <= 0.0 {
            *self = other.clone();
            return;
        }
        let this = TDigest::from_snapshot(self);
        let that = TDigest::from_snapshot(other);
        this.merge(&that);
        *self = this.snapshot();
    }
}

/// Size bound of a centroid centered at rank fraction `q`.
#[inline]
fn size_bound(count: f64, q: f64, compression: f64) -> f64 {
    4.0 * count * q * (1.0 - q) / compression
}

fn estimate_quantile(centroids: &[Centroid], count: f64, min: f64, max: f64, q: f64) -> f64 {
    if centroids.is_empty() || count <= 0.0 {
        return 0.0;
    }
    if q <= 0.0 {
        return min;
    }
    if q >= 1.0 {
        return max;
    }

    let target = q * count;
    let mut prev_center = 0.0;
    let mut prev_mean = min;
    let mut cum = 0.0;
    for c in centroids {
        let center = cum + c.weight / 2.0;
        if target < center {
            return interpolate(prev_center, prev_mean, center, c.mean, target);
        }
        cum += c.weight;
        prev_center = center;
        prev_mean = c.mean;
    }
    interpolate(prev_center, prev_mean, count, max, target)
}

#[inline]
fn interpolate(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    if x1 <= x0 {
        return y1;
    }
    let t = (x - x0) / (x1 - x0);
    t.mul_add(y1 - y0, y0)
}

#[derive(Clone, Debug)]
struct DigestState {
    centroids: Vec<Centroid>,
    count: f64,
    min: f64,
    max: f64,
}

impl DigestState {
    fn new() -> Self {
        DigestState {
            centroids: Vec::new(),
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn insert(&mut self, value: f64, weight: f64, compression: f64) {
        let n = self.count + weight;

        let mut nearest: Option<(usize, f64)> = None;
        let mut cum = 0.0;
        let mut nearest_cum = 0.0;
        for (i, c) in self.centroids.iter().enumerate() {
            let d = (c.mean - value).abs();
            if nearest.map(|(_, nd)| d < nd).unwrap_or(true) {
                nearest = Some((i, d));
                nearest_cum = cum;
            }
            cum += c.weight;
        }

        let mut merged = false;
        if let Some((i, _)) = nearest {
            let c = &mut self.centroids[i];
            let q = (nearest_cum + c.weight / 2.0) / n;
            if c.weight + weight <= size_bound(n, q, compression) {
                c.weight += weight;
                c.mean += (value - c.mean) * weight / c.weight;
                merged = true;
            }
        }
        if !merged {
            let pos = self.centroids.partition_point(|c| c.mean <= value);
            self.centroids.insert(
                pos,
                Centroid {
                    mean: value,
                    weight,
                },
            );
        }

        self.count = n;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn compress(&mut self, compression: f64) {
        if self.centroids.len() < 2 {
            return;
        }
        let n = self.count;
        let mut compressed: Vec<Centroid> = Vec::with_capacity(self.centroids.len());
        let mut cum_before_last = 0.0;
        for c in self.centroids.drain(..) {
            if let Some(last) = compressed.last_mut() {
                let weight = last.weight + c.weight;
                let q = (cum_before_last + weight / 2.0) / n;
                if weight <= size_bound(n, q, compression) {
                    last.mean += (c.mean - last.mean) * c.weight / weight;
                    last.weight = weight;
                    continue;
                }
                cum_before_last += last.weight;
            }
            compressed.push(c);
        }
        self.centroids = compressed;
    }
}

/// Compressed quantile sketch.
pub struct TDigest {
    id: CreationId,
    compression: f64,
    trigger_factor: f64,
    quantiles: Arc<[f64]>,
    state: Mutex<DigestState>,
}

impl TDigest {
    pub fn new(config: &TDigestConfig) -> Result<Self, MetricsError> {
        config.check()?;
        Ok(TDigest {
            id: TDIGEST_ID_SPACE.next_id(),
            compression: config.compression(),
            trigger_factor: config.trigger_factor(),
            quantiles: config.quantiles().into(),
            state: Mutex::new(DigestState::new()),
        })
    }

    /// Rebuild a live digest from a snapshot
    pub fn from_snapshot(snap: &TDigestSnapshot) -> Self {
        let mut state = DigestState::new();
        if snap.count > 0.0 {
            state.centroids = snap.centroids.clone();
            state.count = snap.count;
            state.min = snap.min;
            state.max = snap.max;
        }
        let defaults = TDigestConfig::default();
        let compression = if snap.compression > 0.0 {
            snap.compression
        } else {
            defaults.compression()
        };
        let trigger_factor = if snap.trigger_factor >= 1.0 {
            snap.trigger_factor
        } else {
            defaults.trigger_factor()
        };
        TDigest {
            id: TDIGEST_ID_SPACE.next_id(),
            compression,
            trigger_factor,
            quantiles: snap.quantiles.iter().map(|q| q.quantile).collect(),
            state: Mutex::new(state),
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        TDIGEST_SKETCH_KIND
    }

    #[inline]
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// The configured quantiles
    #[inline]
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    fn compress_limit(&self) -> usize {
        (self.compression * self.trigger_factor) as usize
    }

    pub fn add(&self, value: f64) {
        self.add_weighted(value, 1.0);
    }

    pub fn add_weighted(&self, value: f64, weight: f64) {
        if !value.is_finite() || !(weight > 0.0 && weight.is_finite()) {
            return;
        }
        let mut state = lock(&self.state);
        self.insert_locked(&mut state, value, weight);
    }

    fn insert_locked(&self, state: &mut DigestState, value: f64, weight: f64) {
        state.insert(value, weight, self.compression);
        if state.centroids.len() > self.compress_limit() {
            state.compress(self.compression);
        }
    }

    pub fn quantile(&self, q: f64) -> f64 {
        let state = lock(&self.state);
        estimate_quantile(&state.centroids, state.count, state.min, state.max, q)
    }

    pub fn count(&self) -> f64 {
        lock(&self.state).count
    }

    pub fn compress(&self) {
        lock(&self.state).compress(self.compression);
    }

    /// Merge all centroids of `other` into this digest
    pub fn merge(&self, other: &TDigest) {
        if self.id == other.id {
            return;
        }
        let (mut this, that) = lock_pair((&self.state, self.id), (&other.state, other.id));
        if that.count <= 0.0 {
            return;
        }
        for c in &that.centroids {
            let whole = c.weight.floor();
            for _ in 0..whole as u64 {
                self.insert_locked(&mut this, c.mean, 1.0);
            }
            let rest = c.weight - whole;
            if rest > 0.0 {
                self.insert_locked(&mut this, c.mean, rest);
            }
        }
        this.min = this.min.min(that.min);
        this.max = this.max.max(that.max);
        this.compress(self.compression);
    }

    pub fn snapshot(&self) -> TDigestSnapshot {
        let state = lock(&self.state);
        let (min, max) = if state.count > 0.0 {
            (state.min, state.max)
        } else {
            (0.0, 0.0)
        };
        let quantiles = self
            .quantiles
            .iter()
            .map(|q| QuantileValue {
                quantile: *q,
                value: estimate_quantile(&state.centroids, state.count, min, max, *q),
            })
            .collect();
        TDigestSnapshot {
            centroids: state.centroids.clone(),
            count: state.count,
            min,
            max,
            compression: self.compression,
            trigger_factor: self.trigger_factor,
            quantiles,
        }
    }

    pub fn reset(&self) {
        *lock(&self.state) = DigestState::new();
    }
}

impl Clone for TDigest {
    fn clone(&self) -> Self {
        let state = lock(&self.state).clone();
        TDigest {
            id: TDIGEST_ID_SPACE.next_id(),
            compression: self.compression,
            trigger_factor: self.trigger_factor,
            quantiles: self.quantiles.clone(),
            state: Mutex::new(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> TDigest {
        TDigest::new(&TDigestConfig::default()).unwrap()
    }

    #[test]
    fn concurrent_add() {
        let d = digest();
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let d = &d;
                s.spawn(move || {
                    for i in 0..2500u64 {
                        d.add((t * 2500 + i + 1) as f64);
                    }
                });
            }
        });
        assert_eq!(d.count(), 10_000.0);
        assert_eq!(d.quantile(0.0), 1.0);
        assert_eq!(d.quantile(1.0), 10_000.0);
        let snap = d.snapshot();
        assert_eq!(snap.min, 1.0);
        assert_eq!(snap.max, 10_000.0);
    }

    #[test]
    fn empty() {
        let d = digest();
        assert_eq!(d.quantile(0.5), 0.0);
        let snap = d.snapshot();
        assert_eq!(snap.count, 0.0);
        assert_eq!(snap.min, 0.0);
        assert_eq!(snap.max, 0.0);
        assert_eq!(snap.quantiles.len(), 4);
        assert_eq!(d.kind(), "tdigest");
    }

    #[test]
    fn extremes() {
        let d = digest();
        for v in [5.0, 1.0, 9.0, 3.0, f64::NAN, 7.0] {
            d.add(v);
        }
        assert_eq!(d.count(), 5.0);
        assert_eq!(d.quantile(0.0), 1.0);
        assert_eq!(d.quantile(1.0), 9.0);
        assert_eq!(d.quantile(0.5), 5.0);
    }

    #[test]
    fn uniform_accuracy() {
        let d = digest();
        for i in 0..10_000 {
            // spread the values without sorted input
            let v = ((i * 7919) % 10_000) as f64;
            d.add(v);
        }
        assert_eq!(d.count(), 10_000.0);
        assert!(d.snapshot().centroids.len() < 1_000);
        for q in [0.1, 0.5, 0.9, 0.99] {
            let got = d.quantile(q);
            let expected = q * 10_000.0;
            assert!((got - expected).abs() < 200.0, "q {q}: {got}");
        }
        assert_eq!(d.quantile(0.0), 0.0);
        assert_eq!(d.quantile(1.0), 9_999.0);
    }

    #[test]
    fn merge() {
        let a = digest();
        let b = digest();
        for i in 0..1_000 {
            a.add(i as f64);
            b.add((1_000 + i) as f64);
        }
        a.merge(&b);
        assert!((a.count() - 2_000.0).abs() < 1e-9);
        assert_eq!(a.quantile(0.0), 0.0);
        assert_eq!(a.quantile(1.0), 1_999.0);
        assert!((a.quantile(0.5) - 1_000.0).abs() < 40.0);

        // self merge is a no-op
        a.merge(&a);
        assert!((a.count() - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn fractional_weight() {
        let a = digest();
        a.add_weighted(10.0, 2.5);
        let b = digest();
        b.merge(&a);
        assert!((b.count() - 2.5).abs() < 1e-12);
        assert_eq!(b.quantile(1.0), 10.0);
    }

    #[test]
    fn snapshot_round_trip() {
        let a = digest();
        for i in 0..500 {
            a.add(i as f64);
        }
        let snap = a.snapshot();
        assert!((snap.quantile(0.5) - a.quantile(0.5)).abs() < 1e-9);

        let restored = TDigest::from_snapshot(&snap);
        assert_eq!(restored.quantiles(), a.quantiles());
        assert_eq!(restored.snapshot(), snap);

        let mut merged = snap.clone();
        merged.merge(&snap);
        assert!((merged.count - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn clone_and_reset() {
        let a = digest();
        a.add(1.0);
        let b = a.clone();
        a.reset();
        assert_eq!(a.count(), 0.0);
        assert_eq!(b.count(), 1.0);
    }
}
