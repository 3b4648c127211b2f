/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::{ExemplarDetails, ExemplarItem, HistogramSnapshot, MetricsError, TDigestSnapshot};

pub const SCHEMA_VERSION: u32 = 1;

/// Aggregates of every request seen by a collector.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GlobalSnapshot {
    pub total: u64,
    pub errors: u64,
    /// unix nanoseconds of the earliest start, 0 if unknown
    pub start_time: u64,
    /// unix nanoseconds of the latest completion, 0 if unknown
    pub last_updated: u64,
    pub latencies: HistogramSnapshot,
    pub queue_waits: HistogramSnapshot,
    pub latency_digest: Option<TDigestSnapshot>,
    pub queue_wait_digest: Option<TDigestSnapshot>,
    pub exemplars: Vec<ExemplarItem>,
    pub exemplar_details: ExemplarDetails,
    pub counters: BTreeMap<String, u64>,
    pub schema_version: u32,
    pub bounds_hash: u64,
    pub sketch_kind: String,
    pub invariants_ok: bool,
}

impl GlobalSnapshot {
    pub fn check_invariants(&self) -> bool {
        self.latencies.is_consistent()
            && self.queue_waits.is_consistent()
            && self.errors <= self.total
    }
}

fn merge_digest(dst: &mut Option<TDigestSnapshot>, src: &Option<TDigestSnapshot>) {
    match (dst.as_mut(), src) {
        (Some(d), Some(s)) => d.merge(s),
        (None, Some(s)) => *dst = Some(s.clone()),
        (_, None) => {}
    }
}

/// Combine snapshots taken from compatible collectors.
///
/// Nothing is merged unless all snapshots share the same histogram bounds
/// and sketch kind.
pub fn merge_snapshots(snapshots: &[GlobalSnapshot]) -> Result<Option<GlobalSnapshot>, MetricsError> {
    let Some((base, rest)) = snapshots.split_first() else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(Some(base.clone()));
    }
    for s in rest {
        if s.bounds_hash != base.bounds_hash {
            warn!(
                "refuse to merge snapshots with bounds hash {:#x} and {:#x}",
                base.bounds_hash, s.bounds_hash
            );
            return Err(MetricsError::incompatible(format!(
                "snapshot bounds hash: {:#x} vs {:#x}",
                base.bounds_hash, s.bounds_hash
            )));
        }
        if s.sketch_kind != base.sketch_kind {
            warn!(
                "refuse to merge snapshots with sketch kind {} and {}",
                base.sketch_kind, s.sketch_kind
            );
            return Err(MetricsError::incompatible(format!(
                "snapshot sketch kind: {} vs {}",
                base.sketch_kind, s.sketch_kind
            )));
        }
    }

    let mut merged = base.clone();
    let mut exemplar_len = base.exemplars.len();
    for s in rest {
        merged.total += s.total;
        merged.errors += s.errors;
        if s.start_time != 0 && (merged.start_time == 0 || s.start_time < merged.start_time) {
            merged.start_time = s.start_time;
        }
        merged.last_updated = merged.last_updated.max(s.last_updated);

        merged.latencies.merge(&s.latencies)?;
        merged.queue_waits.merge(&s.queue_waits)?;
        merge_digest(&mut merged.latency_digest, &s.latency_digest);
        merge_digest(&mut merged.queue_wait_digest, &s.queue_wait_digest);

        for (name, v) in &s.counters {
            *merged.counters.entry(name.clone()).or_default() += *v;
        }

        exemplar_len = exemplar_len.max(s.exemplars.len());
        merged.exemplars.extend_from_slice(&s.exemplars);
    }
    merged
        .exemplars
        .sort_by(|a, b| b.latency.cmp(&a.latency));
    merged.exemplars.truncate(exemplar_len);
    merged.exemplar_details = ExemplarDetails::default();
    merged.invariants_ok = merged.check_invariants();
    Ok(Some(merged))
}
