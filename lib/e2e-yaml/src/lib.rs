/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

#[cfg(test)]
macro_rules! yaml_doc {
    ($s:expr) => {
        yaml_rust::YamlLoader::load_from_str($s)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    };
}

mod hash;

pub mod humanize;
pub mod key;
pub mod value;

pub use hash::{foreach_kv, get_required as hash_get_required};

use anyhow::{Context, anyhow};
use yaml_rust::YamlLoader;

use e2e_metrics::CollectorConfig;

/// Load a collector config from the first document of a yaml string
pub fn load_collector_config(s: &str) -> anyhow::Result<CollectorConfig> {
    let docs = YamlLoader::load_from_str(s).map_err(|e| anyhow!("invalid yaml: {e}"))?;
    match docs.first() {
        Some(doc) => value::as_collector_config(doc).context("invalid collector config"),
        None => Ok(CollectorConfig::default()),
    }
}
