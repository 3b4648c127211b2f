/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use ahash::AHashMap;
use log::debug;

use crate::exemplar::{AnyExemplar, MetricExemplar};
use crate::histogram::{AnyHistogram, MetricHistogram};
use crate::request::unix_nanos;
use crate::slot::Slot;
use crate::sync::{CreationId, IdSpace, read, store_min_nonzero};
use crate::{
    CollectorConfig, CounterHandle, MetricsError, RequestContext, RequestResult, Scale,
    ScaleKind, ScaleSnapshot, TDigest, TDigestConfig,
};

mod merge;
pub use merge::merge_collectors;

mod snapshot;
pub use snapshot::{GlobalSnapshot, SCHEMA_VERSION, merge_snapshots};

static COLLECTOR_ID_SPACE: IdSpace = IdSpace::new();

/// Sketch kind reported when the quantile sketches are disabled
pub const NO_SKETCH_KIND: &str = "none";

struct CollectorTables {
    latencies: AnyHistogram,
    queue_waits: AnyHistogram,
    latency_digest: Option<TDigest>,
    queue_wait_digest: Option<TDigest>,
    exemplar: AnyExemplar,
    counters: AHashMap<String, CounterHandle>,
    scales: Vec<Scale>,
}

impl CollectorTables {
    fn sketch_kind(&self) -> &'static str {
        self.latency_digest
            .as_ref()
            .map(|d| d.kind())
            .unwrap_or(NO_SKETCH_KIND)
    }

    fn counter_values(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|(name, h)| (name.clone(), h.get()))
            .collect()
    }
}

impl Clone for CollectorTables {
    fn clone(&self) -> Self {
        CollectorTables {
            latencies: self.latencies.clone(),
            queue_waits: self.queue_waits.clone(),
            latency_digest: self.latency_digest.clone(),
            queue_wait_digest: self.queue_wait_digest.clone(),
            exemplar: self.exemplar.clone(),
            counters: self
                .counters
                .iter()
                .map(|(name, h)| (name.clone(), h.detached_copy()))
                .collect(),
            scales: self.scales.clone(),
        }
    }
}

/// Top level aggregator of request results.
pub struct Collector {
    id: CreationId,
    config: CollectorConfig,
    total: AtomicU64,
    errors: AtomicU64,
    start_time: AtomicU64,
    last_updated: AtomicU64,
    tables: RwLock<CollectorTables>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self, MetricsError> {
        config.check()?;

        let digest = |c: Option<&TDigestConfig>| c.map(TDigest::new).transpose();
        let prototype = Slot::new(&config)?;
        let scales = config
            .scales()
            .iter()
            .map(|s| Scale::new(s, &prototype))
            .collect::<Result<Vec<Scale>, MetricsError>>()?;
        let tables = CollectorTables {
            latencies: AnyHistogram::new(config.latency_histogram())?,
            queue_waits: AnyHistogram::new(config.queue_wait_histogram())?,
            latency_digest: digest(config.tdigest())?,
            queue_wait_digest: digest(config.tdigest())?,
            exemplar: AnyExemplar::new(config.exemplar())?,
            counters: config
                .counters()
                .iter()
                .map(|name| (name.clone(), CounterHandle::new(0)))
                .collect(),
            scales,
        };

        let collector = Collector {
            id: COLLECTOR_ID_SPACE.next_id(),
            config,
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            start_time: AtomicU64::new(0),
            last_updated: AtomicU64::new(0),
            tables: RwLock::new(tables),
        };
        debug!(
            "created metrics collector {} with {} counters and {} scales",
            collector.id.as_u64(),
            collector.config.counters().len(),
            collector.config.scales().len()
        );
        Ok(collector)
    }

    #[inline]
    pub fn id(&self) -> CreationId {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Record one completed operation
    pub fn record(&self, ctx: &RequestContext, mut rr: RequestResult) {
        rr.normalize();

        if let Some(started) = rr.started_at.and_then(unix_nanos) {
            store_min_nonzero(&self.start_time, started);
        }
        if let Some(ended) = rr.ended_at.and_then(unix_nanos) {
            self.last_updated.fetch_max(ended, Ordering::AcqRel);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        if rr.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        let latency = rr.latency.as_nanos() as f64;
        let queue_wait = rr.queue_wait.as_nanos() as f64;
        let tables = read(&self.tables);
        tables.latencies.record(latency);
        tables.queue_waits.record(queue_wait);
        if let Some(d) = &tables.latency_digest {
            d.add(latency);
        }
        if let Some(d) = &tables.queue_wait_digest {
            d.add(queue_wait);
        }
        tables
            .exemplar
            .offer(rr.latency, &rr.request_id, rr.is_error(), &rr.msg);
        for scale in &tables.scales {
            scale.record(ctx, &rr);
        }
    }

    /// Get a reusable handle to a configured counter
    pub fn counter_handle(&self, name: &str) -> Result<CounterHandle, MetricsError> {
        read(&self.tables)
            .counters
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::CounterNotFound(name.to_string()))
    }

    /// Increment a counter, both globally and in the current slot of each scale
    pub fn inc_counter(
        &self,
        ctx: &RequestContext,
        name: &str,
        val: u64,
    ) -> Result<(), MetricsError> {
        let tables = read(&self.tables);
        let Some(handle) = tables.counters.get(name) else {
            return Err(MetricsError::CounterNotFound(name.to_string()));
        };
        handle.add(val);

        if let Some(index) = self.config.counters().iter().position(|n| n == name) {
            let now = SystemTime::now();
            for scale in &tables.scales {
                scale.add_counter(ctx, index, val, now);
            }
        }
        Ok(())
    }

    pub fn global_snapshot(&self) -> GlobalSnapshot {
        let tables = read(&self.tables);
        let latencies = tables.latencies.snapshot();
        let mut exemplar_details = tables.exemplar.detailed_snapshot();
        if latencies.total > 0 {
            let mean = latencies.mean;
            exemplar_details.average.sort_by(|a, b| {
                let da = (a.latency.as_nanos() as f64 - mean).abs();
                let db = (b.latency.as_nanos() as f64 - mean).abs();
                da.total_cmp(&db)
            });
        }

        let mut snap = GlobalSnapshot {
            total: self.total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            start_time: self.start_time.load(Ordering::Acquire),
            last_updated: self.last_updated.load(Ordering::Acquire),
            bounds_hash: tables.latencies.bounds_hash(),
            latencies,
            queue_waits: tables.queue_waits.snapshot(),
            latency_digest: tables.latency_digest.as_ref().map(TDigest::snapshot),
            queue_wait_digest: tables.queue_wait_digest.as_ref().map(TDigest::snapshot),
            exemplars: exemplar_details.slowest.clone(),
            exemplar_details,
            counters: tables.counter_values(),
            schema_version: SCHEMA_VERSION,
            sketch_kind: tables.sketch_kind().to_string(),
            invariants_ok: false,
        };
        snap.invariants_ok = snap.check_invariants();
        snap
    }

    fn scales_snapshot(&self, kind: ScaleKind) -> BTreeMap<String, ScaleSnapshot> {
        read(&self.tables)
            .scales
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| (s.name().to_string(), s.snapshot()))
            .collect()
    }

    pub fn time_scales_snapshot(&self) -> BTreeMap<String, ScaleSnapshot> {
        self.scales_snapshot(ScaleKind::Time)
    }

    pub fn range_scales_snapshot(&self) -> BTreeMap<String, ScaleSnapshot> {
        self.scales_snapshot(ScaleKind::Range)
    }

    /// Zero every aggregate in place, handles stay valid
    pub fn reset(&self) {
        let tables = read(&self.tables);
        self.total.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.start_time.store(0, Ordering::Release);
        self.last_updated.store(0, Ordering::Release);
        tables.latencies.reset();
        tables.queue_waits.reset();
        if let Some(d) = &tables.latency_digest {
            d.reset();
        }
        if let Some(d) = &tables.queue_wait_digest {
            d.reset();
        }
        tables.exemplar.reset();
        tables.counters.values().for_each(CounterHandle::reset);
        tables.scales.iter().for_each(Scale::reset);
    }
}

impl Clone for Collector {
    /// A deep copy, counter handles of the copy are not shared
    fn clone(&self) -> Self {
        let tables = read(&self.tables).clone();
        Collector {
            id: COLLECTOR_ID_SPACE.next_id(),
            config: self.config.clone(),
            total: AtomicU64::new(self.total.load(Ordering::Relaxed)),
            errors: AtomicU64::new(self.errors.load(Ordering::Relaxed)),
            start_time: AtomicU64::new(self.start_time.load(Ordering::Acquire)),
            last_updated: AtomicU64::new(self.last_updated.load(Ordering::Acquire)),
            tables: RwLock::new(tables),
        }
    }
}
