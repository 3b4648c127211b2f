/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod sync;
pub use sync::CreationId;

mod error;
pub use error::{ConfigError, MetricsError};

mod config;
pub use config::{
    CollectorConfig, ExemplarConfig, HistogramConfig, ScaleConfig, ScaleKind, TDigestConfig,
};

mod histogram;
pub use histogram::{
    AnyHistogram, Histogram, HistogramSnapshot, MetricHistogram, ShardedHistogram,
};

mod tdigest;
pub use tdigest::{Centroid, QuantileValue, TDIGEST_SKETCH_KIND, TDigest, TDigestSnapshot};

mod exemplar;
pub use exemplar::{
    AnyExemplar, Exemplar, ExemplarDetails, ExemplarItem, MetricExemplar, ShardedExemplar,
};

mod request;
pub use request::{RequestContext, RequestError, RequestResult};

mod counter;
pub use counter::CounterHandle;

mod slot;
pub use slot::{Slot, SlotSnapshot};

mod scale;
pub use scale::{Scale, ScaleSnapshot};

mod collector;
pub use collector::{
    Collector, GlobalSnapshot, NO_SKETCH_KIND, SCHEMA_VERSION, merge_collectors, merge_snapshots,
};
