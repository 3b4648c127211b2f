/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use serde::Serialize;

use super::HistogramState;
use crate::MetricsError;

/// Point-in-time view of a histogram.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub counts: Vec<u64>,
    pub bounds: Arc<[f64]>,
    pub total: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub m2: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSnapshot {
    pub(crate) fn build(state: &HistogramState, bounds: Arc<[f64]>) -> Self {
        let mut snap = HistogramSnapshot {
            counts: state.counts.clone(),
            bounds,
            total: state.total,
            m2: state.m2,
            mean: state.mean,
            ..Default::default()
        };
        if state.total > 0 {
            let n = state.total as f64;
            snap.sum = state.mean * n;
            snap.sum_sq = (state.mean * state.mean).mul_add(n, state.m2);
            snap.std_dev = (state.m2 / n).sqrt();
            snap.min = state.min;
            snap.max = state.max;
        }
        snap
    }

    /// Check that the per-bucket counts add up to the total
    pub fn is_consistent(&self) -> bool {
        self.counts.iter().sum::<u64>() == self.total
    }

    /// Merge another snapshot of the same bucket layout into this one.
    ///
    /// An empty default snapshot adopts the layout of the first non-empty
    /// snapshot merged into it.
    pub fn merge(&mut self, other: &HistogramSnapshot) -> Result<(), MetricsError> {
        if other.total == 0 && other.counts.is_empty() {
            return Ok(());
        }
        if self.counts.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        if self.bounds != other.bounds || self.counts.len() != other.counts.len() {
            return Err(MetricsError::incompatible("histogram snapshot bounds"));
        }

        let mut state = HistogramState::from_snapshot(self);
        state.merge_from(&HistogramState::from_snapshot(other));
        *self = HistogramSnapshot::build(&state, self.bounds.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Histogram, HistogramConfig};

    fn histogram_of(values: &[f64]) -> Histogram {
        let h = Histogram::new(&HistogramConfig::new(1.0, 100.0, 1.6, 10)).unwrap();
        for v in values {
            h.record(*v);
        }
        h
    }

    #[test]
    fn empty() {
        let snap = histogram_of(&[]).snapshot();
        assert_eq!(snap.total, 0);
        assert_eq!(snap.counts.len(), 10);
        assert_eq!(snap.bounds.len(), 9);
        assert_eq!(snap.min, 0.0);
        assert_eq!(snap.max, 0.0);
        assert_eq!(snap.std_dev, 0.0);
        assert!(snap.is_consistent());
    }

    #[test]
    fn derived_fields() {
        let snap = histogram_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).snapshot();
        assert_eq!(snap.total, 8);
        assert!((snap.mean - 5.0).abs() < 1e-12);
        assert!((snap.sum - 40.0).abs() < 1e-9);
        assert!((snap.std_dev - 2.0).abs() < 1e-12);
        assert!((snap.sum_sq - 232.0).abs() < 1e-9);
        assert!((snap.m2 - 32.0).abs() < 1e-9);
        assert_eq!(snap.min, 2.0);
        assert_eq!(snap.max, 9.0);
    }

    #[test]
    fn merge_snapshots() {
        let mut a = histogram_of(&[10.0, 20.0]).snapshot();
        let b = histogram_of(&[30.0, 40.0]).snapshot();
        a.merge(&b).unwrap();
        assert_eq!(a.total, 4);
        assert!((a.sum - 100.0).abs() < 1e-9);
        assert!((a.mean - 25.0).abs() < 1e-12);
        assert_eq!(a.min, 10.0);
        assert_eq!(a.max, 40.0);
        assert!(a.is_consistent());

        let mut empty = HistogramSnapshot::default();
        empty.merge(&a).unwrap();
        assert_eq!(empty, a);
    }

    #[test]
    fn merge_incompatible() {
        let mut a = histogram_of(&[10.0]).snapshot();
        let h = Histogram::new(&HistogramConfig::new(1.0, 100.0, 2.0, 10)).unwrap();
        h.record(3.0);
        let b = h.snapshot();
        let before = a.clone();
        assert!(matches!(a.merge(&b), Err(MetricsError::Incompatible(_))));
        assert_eq!(a, before);
    }
}
