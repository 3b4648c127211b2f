/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::Ordering;

use log::{debug, warn};

use super::{Collector, CollectorTables};
use crate::MetricsError;
use crate::sync::{read_pair, store_min_nonzero, write_pair};

impl CollectorTables {
    fn check_merge(
        &self,
        other: &CollectorTables,
        slot_counters: (&[String], &[String]),
    ) -> Result<(), MetricsError> {
        self.latencies.check_merge(&other.latencies)?;
        self.queue_waits.check_merge(&other.queue_waits)?;
        self.exemplar.check_merge(&other.exemplar)?;
        if self.sketch_kind() != other.sketch_kind() {
            return Err(MetricsError::incompatible(format!(
                "sketch kind: {} vs {}",
                self.sketch_kind(),
                other.sketch_kind()
            )));
        }
        for (a, b) in [
            (&self.latency_digest, &other.latency_digest),
            (&self.queue_wait_digest, &other.queue_wait_digest),
        ] {
            if let (Some(a), Some(b)) = (a, b)
                && a.compression() != b.compression()
            {
                return Err(MetricsError::incompatible(format!(
                    "tdigest compression: {} vs {}",
                    a.compression(),
                    b.compression()
                )));
            }
        }

        // slot counters are positional, every merged or adopted scale needs the same layout
        let (mine, theirs) = slot_counters;
        if !other.scales.is_empty() && mine != theirs {
            return Err(MetricsError::incompatible(format!(
                "slot counters: {mine:?} vs {theirs:?}"
            )));
        }
        for scale in &other.scales {
            if let Some(mine) = self.scales.iter().find(|s| s.name() == scale.name()) {
                mine.check_merge(scale)?;
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, other: &CollectorTables) -> Result<(), MetricsError> {
        self.latencies.merge(&other.latencies)?;
        self.queue_waits.merge(&other.queue_waits)?;
        if let (Some(a), Some(b)) = (&self.latency_digest, &other.latency_digest) {
            a.merge(b);
        }
        if let (Some(a), Some(b)) = (&self.queue_wait_digest, &other.queue_wait_digest) {
            a.merge(b);
        }
        self.exemplar.merge(&other.exemplar)?;

        for (name, handle) in &other.counters {
            match self.counters.get(name) {
                Some(mine) => mine.add(handle.get()),
                None => {
                    self.counters
                        .insert(name.clone(), handle.detached_copy());
                }
            }
        }

        for scale in &other.scales {
            match self.scales.iter().find(|s| s.name() == scale.name()) {
                Some(mine) => mine.merge(scale)?,
                None => self.scales.push(scale.clone()),
            }
        }
        Ok(())
    }
}

impl Collector {
    /// Check whether `other` could be merged into this collector
    pub fn check_merge(&self, other: &Collector) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }
        let (this, that) = read_pair((&self.tables, self.id), (&other.tables, other.id));
        this.check_merge(&that, self.slot_counters(other))
    }

    /// Merge `other` into this collector.
    ///
    /// Counters and scales only known by `other` are copied over. On error
    /// this collector is left untouched.
    pub fn merge(&self, other: &Collector) -> Result<(), MetricsError> {
        if self.id == other.id {
            return Ok(());
        }

        let (mut this, that) = write_pair((&self.tables, self.id), (&other.tables, other.id));
        if let Err(e) = this.check_merge(&that, self.slot_counters(other)) {
            warn!(
                "refuse to merge collector {} into {}: {e}",
                other.id.as_u64(),
                self.id.as_u64()
            );
            return Err(e);
        }

        self.total
            .fetch_add(other.total.load(Ordering::Relaxed), Ordering::Relaxed);
        self.errors
            .fetch_add(other.errors.load(Ordering::Relaxed), Ordering::Relaxed);
        store_min_nonzero(&self.start_time, other.start_time.load(Ordering::Acquire));
        self.last_updated
            .fetch_max(other.last_updated.load(Ordering::Acquire), Ordering::AcqRel);
        this.merge_from(&that)?;

        debug!(
            "merged collector {} into {}",
            other.id.as_u64(),
            self.id.as_u64()
        );
        Ok(())
    }

    fn slot_counters<'a>(&'a self, other: &'a Collector) -> (&'a [String], &'a [String]) {
        (self.config.counters(), other.config.counters())
    }

    /// Merge this collector into `dest`
    #[inline]
    pub fn merge_into(&self, dest: &Collector) -> Result<(), MetricsError> {
        dest.merge(self)
    }
}

/// Merge all collectors into a new one.
///
/// Every pair of inputs is checked before anything is merged.
pub fn merge_collectors(collectors: &[&Collector]) -> Result<Option<Collector>, MetricsError> {
    let Some((first, rest)) = collectors.split_first() else {
        return Ok(None);
    };
    for (i, a) in collectors.iter().enumerate() {
        for b in &collectors[i + 1..] {
            if let Err(e) = a.check_merge(b) {
                warn!("refuse to merge collectors: {e}");
                return Err(e);
            }
        }
    }

    let merged = (*first).clone();
    for c in rest {
        merged.merge(c)?;
    }
    Ok(Some(merged))
}
