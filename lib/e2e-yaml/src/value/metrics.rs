/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

use e2e_metrics::{
    CollectorConfig, ExemplarConfig, HistogramConfig, ScaleConfig, ScaleKind, TDigestConfig,
};

use crate::humanize;
use crate::value::{as_bool, as_f64, as_list, as_string, as_u64, as_usize};

pub fn as_histogram_config(v: &Yaml) -> anyhow::Result<HistogramConfig> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!(
            "yaml value type for 'histogram config' should be 'map'"
        ));
    };

    let mut config = HistogramConfig::default();
    crate::foreach_kv(map, |k, v| match crate::key::normalize(k).as_str() {
        "min" => {
            let min = humanize::as_nanos(v).context(format!("invalid nanoseconds value for key {k}"))?;
            config.set_min(min);
            Ok(())
        }
        "max" => {
            let max = humanize::as_nanos(v).context(format!("invalid nanoseconds value for key {k}"))?;
            config.set_max(max);
            Ok(())
        }
        "growth" => {
            let growth = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
            config.set_growth(growth);
            Ok(())
        }
        "buckets" => {
            let buckets = as_usize(v).context(format!("invalid usize value for key {k}"))?;
            config.set_buckets(buckets);
            Ok(())
        }
        "shards" => {
            let shards = as_usize(v).context(format!("invalid usize value for key {k}"))?;
            config.set_shards(shards);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;
    config.check()?;
    Ok(config)
}

fn as_quantile(v: &Yaml) -> anyhow::Result<f64> {
    let q = match v {
        Yaml::String(s) => f64::from_str(s.trim())?,
        _ => as_f64(v)?,
    };
    if !(0.0..=1.0).contains(&q) {
        return Err(anyhow!("quantile {q} is out of range [0, 1]"));
    }
    Ok(q)
}

/// Parse a quantile list, either a sequence or a comma separated string
pub fn as_quantile_list(v: &Yaml) -> anyhow::Result<Vec<f64>> {
    match v {
        Yaml::String(s) => s
            .split(',')
            .map(|q| {
                as_quantile(&Yaml::String(q.to_string()))
                    .context(format!("invalid quantile string {q}"))
            })
            .collect(),
        Yaml::Array(_) => as_list(v, as_quantile),
        _ => Err(anyhow!(
            "the yaml value type for 'quantile list' should be 'seq' or 'str'"
        )),
    }
}

/// Parse the t-digest config, a false value disables the sketches
pub fn as_tdigest_config(v: &Yaml) -> anyhow::Result<Option<TDigestConfig>> {
    let map = match v {
        Yaml::Hash(map) => map,
        Yaml::Null => return Ok(None),
        _ => {
            let enable = as_bool(v)
                .context("the simplified form of t-digest config should be a bool value")?;
            return Ok(enable.then(TDigestConfig::default));
        }
    };

    let mut config = TDigestConfig::default();
    crate::foreach_kv(map, |k, v| match crate::key::normalize(k).as_str() {
        "compression" => {
            let compression = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
            config.set_compression(compression);
            Ok(())
        }
        "trigger_factor" | "compression_trigger_factor" => {
            let factor = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
            config.set_trigger_factor(factor);
            Ok(())
        }
        "quantile" | "quantiles" => {
            let quantiles =
                as_quantile_list(v).context(format!("invalid quantile list value for key {k}"))?;
            config.set_quantiles(quantiles);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;
    config.check()?;
    Ok(Some(config))
}

/// Parse the exemplar config, an integer value is taken as the capacity
pub fn as_exemplar_config(v: &Yaml) -> anyhow::Result<ExemplarConfig> {
    let Yaml::Hash(map) = v else {
        let capacity = as_usize(v)
            .context("the simplified form of exemplar config should be the capacity")?;
        let config = ExemplarConfig::with_capacity(capacity);
        config.check()?;
        return Ok(config);
    };

    let mut config = ExemplarConfig::default();
    crate::foreach_kv(map, |k, v| match crate::key::normalize(k).as_str() {
        "capacity" => {
            let capacity = as_usize(v).context(format!("invalid usize value for key {k}"))?;
            config.set_capacity(capacity);
            Ok(())
        }
        "sampling_rate" => {
            let rate = as_u64(v).context(format!("invalid u64 value for key {k}"))?;
            config.set_sampling_rate(rate);
            Ok(())
        }
        "shards" => {
            let shards = as_usize(v).context(format!("invalid usize value for key {k}"))?;
            config.set_shards(shards);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;
    config.check()?;
    Ok(config)
}

fn as_scale_kind(v: &Yaml) -> anyhow::Result<ScaleKind> {
    let s = as_string(v)?;
    match crate::key::normalize(&s).as_str() {
        "time" => Ok(ScaleKind::Time),
        "range" => Ok(ScaleKind::Range),
        _ => Err(anyhow!("unsupported scale kind {s}")),
    }
}

pub fn as_scale_config(v: &Yaml) -> anyhow::Result<ScaleConfig> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("yaml value type for 'scale config' should be 'map'"));
    };

    let name = as_string(crate::hash_get_required(map, "name")?).context("invalid scale name")?;
    let kind = as_scale_kind(crate::hash_get_required(map, "kind")?)
        .context(format!("invalid kind for scale {name}"))?;
    let mut width = None;
    let mut capacity = None;
    crate::foreach_kv(map, |k, v| match crate::key::normalize(k).as_str() {
        "name" | "kind" => Ok(()),
        "width" => {
            let w = match kind {
                ScaleKind::Time => {
                    let d = humanize::as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    u64::try_from(d.as_nanos()).map_err(|_| anyhow!("too large duration"))?
                }
                ScaleKind::Range => as_u64(v).context(format!("invalid u64 value for key {k}"))?,
            };
            width = Some(w);
            Ok(())
        }
        "capacity" => {
            capacity = Some(as_usize(v).context(format!("invalid usize value for key {k}"))?);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;

    let width = width.ok_or_else(|| anyhow!("no width set for scale {name}"))?;
    let capacity = capacity.ok_or_else(|| anyhow!("no capacity set for scale {name}"))?;
    let config = match kind {
        ScaleKind::Time => ScaleConfig::time(&name, std::time::Duration::from_nanos(width), capacity),
        ScaleKind::Range => ScaleConfig::range(&name, width, capacity),
    };
    config.check()?;
    Ok(config)
}

pub fn as_collector_config(v: &Yaml) -> anyhow::Result<CollectorConfig> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!(
            "yaml value type for 'collector config' should be 'map'"
        ));
    };

    let mut config = CollectorConfig::default();
    crate::foreach_kv(map, |k, v| match crate::key::normalize(k).as_str() {
        "latency" | "latency_histogram" => {
            let histogram = as_histogram_config(v)
                .context(format!("invalid histogram config value for key {k}"))?;
            config.set_latency_histogram(histogram);
            Ok(())
        }
        "queue_wait" | "queue_wait_histogram" => {
            let histogram = as_histogram_config(v)
                .context(format!("invalid histogram config value for key {k}"))?;
            config.set_queue_wait_histogram(histogram);
            Ok(())
        }
        "tdigest" => {
            let tdigest = as_tdigest_config(v)
                .context(format!("invalid t-digest config value for key {k}"))?;
            config.set_tdigest(tdigest);
            Ok(())
        }
        "exemplar" => {
            let exemplar = as_exemplar_config(v)
                .context(format!("invalid exemplar config value for key {k}"))?;
            config.set_exemplar(exemplar);
            Ok(())
        }
        "counters" => {
            let names = as_list(v, as_string).context(format!("invalid string list for key {k}"))?;
            for name in names {
                config.add_counter(&name);
            }
            Ok(())
        }
        "scales" => {
            let scales =
                as_list(v, as_scale_config).context(format!("invalid scale list for key {k}"))?;
            for scale in scales {
                config.add_scale(scale);
            }
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;
    config.check()?;
    Ok(config)
}
