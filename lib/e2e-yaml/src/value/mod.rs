/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod metrics;
mod primary;

pub use metrics::{
    as_collector_config, as_exemplar_config, as_histogram_config, as_quantile_list,
    as_scale_config, as_tdigest_config,
};
pub use primary::{as_bool, as_f64, as_list, as_string, as_u64, as_usize};
