/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::RwLock;
use std::time::SystemTime;

use serde::Serialize;

use crate::request::unix_nanos;
use crate::slot::{Slot, SlotSnapshot};
use crate::sync::{CreationId, IdSpace, read, read_pair, write_pair};
use crate::{MetricsError, RequestContext, RequestResult, ScaleConfig, ScaleKind};

static SCALE_ID_SPACE: IdSpace = IdSpace::new();

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScaleSnapshot {
    pub name: String,
    pub kind: ScaleKind,
    pub width: u64,
    pub capacity: usize,
    pub slots: Vec<SlotSnapshot>,
}

/// Ring buffer of slots keyed by time or by request range.
pub struct Scale {
    id: CreationId,
    config: ScaleConfig,
    slots: RwLock<Box<[Slot]>>,
}

impl Scale {
    /// Create a scale whose slots are all copies of `prototype`
    pub fn new(config: &ScaleConfig, prototype: &Slot) -> Result<Self, MetricsError> {
        config.check()?;
        let slots = (0..config.capacity()).map(|_| prototype.clone()).collect();
        Ok(Scale {
            id: SCALE_ID_SPACE.next_id(),
            config: config.clone(),
            slots: RwLock::new(slots),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    #[inline]
    pub fn kind(&self) -> ScaleKind {
        self.config.kind()
    }

    #[inline]
    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    /// Window index and slot position of a key
    #[inline]
    fn locate(&self, idx: u64) -> (u64, usize) {
        let window = idx / self.config.width();
        let pos = (window % self.config.capacity() as u64) as usize;
        (window, pos)
    }

    fn key_of(&self, ctx: &RequestContext, at: Option<SystemTime>) -> Option<u64> {
        match self.config.kind() {
            ScaleKind::Time => unix_nanos(at.unwrap_or_else(SystemTime::now)),
            ScaleKind::Range => ctx.request_id(),
        }
    }

    pub fn record(&self, ctx: &RequestContext, rr: &RequestResult) {
        let Some(idx) = self.key_of(ctx, rr.ended_at) else {
            return;
        };
        let (window, pos) = self.locate(idx);
        let slots = read(&self.slots);
        slots[pos].record(rr, window);
    }

    /// Increment the custom counter at `index` in the slot matching `at`
    pub fn add_counter(&self, ctx: &RequestContext, index: usize, val: u64, at: SystemTime) {
        let Some(idx) = self.key_of(ctx, Some(at)) else {
            return;
        };
        let (window, pos) = self.locate(idx);
        let slots = read(&self.slots);
        slots[pos].add_counter(index, val, window);
    }

    /// Check the scale shape and every slot pair
    pub fn check_merge(&self, other: &Scale) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        self.check_shape(other)?;
        let (this, that) = read_pair((&self.slots, self.id), (&other.slots, other.id));
        for (a, b) in this.iter().zip(that.iter()) {
            a.check_merge(b)?;
        }
        Ok(())
    }

    fn check_shape(&self, other: &Scale) -> Result<(), MetricsError> {
        if self.config.kind() != other.config.kind()
            || self.config.width() != other.config.width()
            || self.config.capacity() != other.config.capacity()
        {
            return Err(MetricsError::incompatible(format!(
                "scale {}: {} width {} capacity {} vs {} width {} capacity {}",
                self.name(),
                self.kind().as_str(),
                self.config.width(),
                self.config.capacity(),
                other.kind().as_str(),
                other.config.width(),
                other.config.capacity()
            )));
        }
        Ok(())
    }

    /// Merge slots pairwise by position
    pub fn merge(&self, other: &Scale) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        self.check_shape(other)?;

        let (this, that) = write_pair((&self.slots, self.id), (&other.slots, other.id));
        for (a, b) in this.iter().zip(that.iter()) {
            a.check_merge(b)?;
        }
        for (a, b) in this.iter().zip(that.iter()) {
            a.merge(b)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ScaleSnapshot {
        let slots = read(&self.slots);
        ScaleSnapshot {
            name: self.config.name().to_string(),
            kind: self.config.kind(),
            width: self.config.width(),
            capacity: self.config.capacity(),
            slots: slots.iter().map(Slot::snapshot).collect(),
        }
    }

    pub fn reset(&self) {
        read(&self.slots).iter().for_each(Slot::reset);
    }
}

impl Clone for Scale {
    fn clone(&self) -> Self {
        let slots = read(&self.slots).iter().map(|s| s.clone()).collect();
        Scale {
            id: SCALE_ID_SPACE.next_id(),
            config: self.config.clone(),
            slots: RwLock::new(slots),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectorConfig, ExemplarConfig, HistogramConfig};
    use std::time::Duration;

    fn prototype() -> Slot {
        let mut config = CollectorConfig::default().with_counter("c");
        config.set_latency_histogram(HistogramConfig::new(1.0, 1e9, 2.0, 32));
        config.set_exemplar(ExemplarConfig::with_capacity(2));
        Slot::new(&config).unwrap()
    }

    fn rr(ms: u64) -> RequestResult {
        RequestResult::new("r").with_latency(Duration::from_millis(ms))
    }

    #[test]
    fn range_wraparound() {
        let scale = Scale::new(&ScaleConfig::range("req", 1, 3), &prototype()).unwrap();
        for id in 0..3 {
            scale.record(&RequestContext::with_request_id(id), &rr(10));
        }
        scale.record(&RequestContext::with_request_id(0), &rr(10));
        scale.record(&RequestContext::with_request_id(3), &rr(10));

        let snap = scale.snapshot();
        assert_eq!(snap.slots.len(), 3);
        assert_eq!(snap.slots[0].window_start, 3);
        assert_eq!(snap.slots[0].total, 1);
        assert_eq!(snap.slots[1].window_start, 1);
        assert_eq!(snap.slots[1].total, 1);
        assert_eq!(snap.slots[2].window_start, 2);
        assert_eq!(snap.slots[2].total, 1);
    }

    #[test]
    fn range_without_id() {
        let scale = Scale::new(&ScaleConfig::range("req", 10, 4), &prototype()).unwrap();
        scale.record(&RequestContext::new(), &rr(10));
        let snap = scale.snapshot();
        assert!(snap.slots.iter().all(|s| s.total == 0));
    }

    #[test]
    fn time_windows() {
        let scale = Scale::new(
            &ScaleConfig::time("sec", Duration::from_secs(1), 4),
            &prototype(),
        )
        .unwrap();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let ctx = RequestContext::new();
        for (offset_ms, lat) in [(100, 1), (900, 2), (1_100, 3), (4_500, 4)] {
            let end = t0 + Duration::from_millis(offset_ms);
            let mut r = rr(lat).with_times(None, end - Duration::from_millis(lat), end);
            r.normalize();
            scale.record(&ctx, &r);
        }
        scale.add_counter(&ctx, 0, 2, t0 + Duration::from_millis(1_200));

        let snap = scale.snapshot();
        assert_eq!(snap.kind, ScaleKind::Time);
        assert_eq!(snap.width, 1_000_000_000);
        // second 1000 shares slot 0 with second 1004
        assert_eq!(snap.slots[0].window_start, 1_004);
        assert_eq!(snap.slots[0].total, 1);
        assert_eq!(snap.slots[1].window_start, 1_001);
        assert_eq!(snap.slots[1].total, 1);
        assert_eq!(snap.slots[1].counters, [2]);
    }

    #[test]
    fn merge() {
        let a = Scale::new(&ScaleConfig::range("req", 10, 4), &prototype()).unwrap();
        let b = a.clone();
        a.record(&RequestContext::with_request_id(5), &rr(1));
        b.record(&RequestContext::with_request_id(7), &rr(1));
        b.record(&RequestContext::with_request_id(25), &rr(1));
        a.merge(&b).unwrap();

        let snap = a.snapshot();
        assert_eq!(snap.slots[0].total, 2);
        assert_eq!(snap.slots[2].total, 1);
        assert_eq!(b.snapshot().slots[0].total, 1);

        let c = Scale::new(&ScaleConfig::range("req", 20, 4), &prototype()).unwrap();
        c.record(&RequestContext::with_request_id(5), &rr(1));
        assert!(matches!(a.merge(&c), Err(MetricsError::Incompatible(_))));
        assert_eq!(a.snapshot(), snap);

        a.reset();
        assert!(a.snapshot().slots.iter().all(|s| s.total == 0));
    }
}
