/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use serde::Serialize;

use crate::{ExemplarConfig, MetricsError};

mod heap;
mod reservoir;

mod single;
pub use single::Exemplar;

mod sharded;
pub use sharded::ShardedExemplar;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExemplarItem {
    pub latency: Duration,
    pub request_id: String,
    pub error: bool,
    pub msg: String,
}

impl ExemplarItem {
    pub fn new(latency: Duration, request_id: &str, error: bool, msg: &str) -> Self {
        ExemplarItem {
            latency,
            request_id: request_id.to_string(),
            error,
            msg: msg.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExemplarDetails {
    /// descending by latency
    pub slowest: Vec<ExemplarItem>,
    /// ascending by latency
    pub fastest: Vec<ExemplarItem>,
    pub average: Vec<ExemplarItem>,
    pub failures: Vec<ExemplarItem>,
}

pub trait MetricExemplar: Send + Sync {
    fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str);
    fn snapshot(&self) -> Vec<ExemplarItem>;
    fn detailed_snapshot(&self) -> ExemplarDetails;
    fn reset(&self);
}

impl MetricExemplar for Exemplar {
    fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str) {
        Exemplar::offer(self, latency, request_id, error, msg);
    }

    fn snapshot(&self) -> Vec<ExemplarItem> {
        Exemplar::snapshot(self)
    }

    fn detailed_snapshot(&self) -> ExemplarDetails {
        Exemplar::detailed_snapshot(self)
    }

    fn reset(&self) {
        Exemplar::reset(self);
    }
}

impl MetricExemplar for ShardedExemplar {
    fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str) {
        ShardedExemplar::offer(self, latency, request_id, error, msg);
    }

    fn snapshot(&self) -> Vec<ExemplarItem> {
        ShardedExemplar::snapshot(self)
    }

    fn detailed_snapshot(&self) -> ExemplarDetails {
        ShardedExemplar::detailed_snapshot(self)
    }

    fn reset(&self) {
        ShardedExemplar::reset(self);
    }
}

#[derive(Clone)]
pub enum AnyExemplar {
    Single(Exemplar),
    Sharded(ShardedExemplar),
}

impl AnyExemplar {
    pub fn new(config: &ExemplarConfig) -> Result<Self, MetricsError> {
        if config.is_sharded() {
            Ok(AnyExemplar::Sharded(ShardedExemplar::new(config)?))
        } else {
            Ok(AnyExemplar::Single(Exemplar::new(config)?))
        }
    }

    fn inner(&self) -> &dyn MetricExemplar {
        match self {
            AnyExemplar::Single(e) => e,
            AnyExemplar::Sharded(e) => e,
        }
    }

    /// (capacity, sampling rate, shard count)
    fn shape(&self) -> (usize, u64, usize) {
        match self {
            AnyExemplar::Single(e) => (e.capacity(), e.sampling_rate(), 1),
            AnyExemplar::Sharded(e) => (e.capacity(), e.sampling_rate(), e.shard_count()),
        }
    }

    pub fn check_merge(&self, other: &AnyExemplar) -> Result<(), MetricsError> {
        match (self, other) {
            (AnyExemplar::Single(_), AnyExemplar::Single(_))
            | (AnyExemplar::Sharded(_), AnyExemplar::Sharded(_)) => {}
            _ => return Err(MetricsError::TypeMismatch("exemplar")),
        }
        let (a, b) = (self.shape(), other.shape());
        if a != b {
            return Err(MetricsError::incompatible(format!(
                "exemplar capacity/sampling rate/shards: {}/{}/{} vs {}/{}/{}",
                a.0, a.1, a.2, b.0, b.1, b.2
            )));
        }
        Ok(())
    }

    pub fn merge(&self, other: &AnyExemplar) -> Result<(), MetricsError> {
        self.check_merge(other)?;
        match (self, other) {
            (AnyExemplar::Single(a), AnyExemplar::Single(b)) => {
                a.merge(b);
                Ok(())
            }
            (AnyExemplar::Sharded(a), AnyExemplar::Sharded(b)) => a.merge(b),
            _ => Err(MetricsError::TypeMismatch("exemplar")),
        }
    }
}

impl MetricExemplar for AnyExemplar {
    fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str) {
        self.inner().offer(latency, request_id, error, msg);
    }

    fn snapshot(&self) -> Vec<ExemplarItem> {
        self.inner().snapshot()
    }

    fn detailed_snapshot(&self) -> ExemplarDetails {
        self.inner().detailed_snapshot()
    }

    fn reset(&self) {
        self.inner().reset();
    }
}
