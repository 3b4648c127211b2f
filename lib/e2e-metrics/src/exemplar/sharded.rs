/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::Hasher;
use std::time::Duration;

use fnv::FnvHasher;

use super::{Exemplar, ExemplarDetails, ExemplarItem};
use crate::{ExemplarConfig, MetricsError};

/// Exemplars routed by request id.
#[derive(Clone)]
pub struct ShardedExemplar {
    shards: Box<[Exemplar]>,
}

impl ShardedExemplar {
    pub fn new(config: &ExemplarConfig) -> Result<Self, MetricsError> {
        config.check()?;
        let shards = (0..config.shards())
            .map(|_| Exemplar::new(config))
            .collect::<Result<Box<[Exemplar]>, MetricsError>>()?;
        Ok(ShardedExemplar { shards })
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shards[0].capacity()
    }

    #[inline]
    pub fn sampling_rate(&self) -> u64 {
        self.shards[0].sampling_rate()
    }

    fn shard_of(&self, request_id: &str) -> &Exemplar {
        let mut hasher = FnvHasher::default();
        hasher.write(request_id.as_bytes());
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn offer(&self, latency: Duration, request_id: &str, error: bool, msg: &str) {
        self.shard_of(request_id)
            .offer(latency, request_id, error, msg);
    }

    pub fn merge(&self, other: &ShardedExemplar) -> Result<(), MetricsError> {
        if self.shard_count() != other.shard_count() {
            return Err(MetricsError::incompatible(format!(
                "exemplar shard count: {} vs {}",
                self.shard_count(),
                other.shard_count()
            )));
        }
        for (a, b) in self.shards.iter().zip(other.shards.iter()) {
            a.merge(b);
        }
        Ok(())
    }

    fn combined(&self) -> Exemplar {
        let scratch = self.shards[0].empty_like();
        for shard in &self.shards {
            scratch.merge(shard);
        }
        scratch
    }

    pub fn snapshot(&self) -> Vec<ExemplarItem> {
        self.combined().snapshot()
    }

    pub fn detailed_snapshot(&self) -> ExemplarDetails {
        self.combined().detailed_snapshot()
    }

    pub fn reset(&self) {
        self.shards.iter().for_each(Exemplar::reset);
    }
}
