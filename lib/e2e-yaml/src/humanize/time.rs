/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use humanize_rs::ParseError;
use yaml_rust::Yaml;

/// Parse a duration, plain numbers are seconds
pub fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                if let Ok(u) = u64::from_str(value) {
                    Ok(Duration::from_secs(u))
                } else if let Ok(f) = f64::from_str(value) {
                    Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
                } else {
                    Err(anyhow!("invalid duration string"))
                }
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => {
            let u = u64::try_from(*value).map_err(|_| anyhow!("negative duration {value}"))?;
            Ok(Duration::from_secs(u))
        }
        Yaml::Real(s) => {
            let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}"))?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer' or 'real'"
        )),
    }
}

/// Parse a latency value in nanoseconds.
///
/// Plain numbers are taken as nanoseconds, strings with a unit as durations.
pub fn as_nanos(v: &Yaml) -> anyhow::Result<f64> {
    match v {
        Yaml::Integer(i) => Ok(*i as f64),
        Yaml::Real(s) => f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}")),
        Yaml::String(s) => match f64::from_str(s) {
            Ok(f) => Ok(f),
            Err(_) => {
                let d = humanize_rs::duration::parse(s)
                    .map_err(|e| anyhow!("invalid humanize duration string: {e}"))?;
                Ok(d.as_nanos() as f64)
            }
        },
        _ => Err(anyhow!(
            "yaml value type for nanoseconds should be 'string' or 'integer' or 'real'"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration() {
        let v = Yaml::String("1m30s".to_string());
        assert_eq!(as_duration(&v).unwrap(), Duration::from_secs(90));

        let v = Yaml::String("10".to_string());
        assert_eq!(as_duration(&v).unwrap(), Duration::from_secs(10));

        let v = Yaml::Integer(5);
        assert_eq!(as_duration(&v).unwrap(), Duration::from_secs(5));

        let v = Yaml::Real("0.5".to_string());
        assert_eq!(as_duration(&v).unwrap(), Duration::from_millis(500));

        assert!(as_duration(&Yaml::Integer(-1)).is_err());
        assert!(as_duration(&Yaml::String("10x".to_string())).is_err());
        assert!(as_duration(&Yaml::Boolean(true)).is_err());
    }

    #[test]
    fn nanos() {
        assert_eq!(as_nanos(&Yaml::Integer(1000)).unwrap(), 1000.0);
        assert_eq!(as_nanos(&Yaml::Real("1e3".to_string())).unwrap(), 1000.0);
        assert_eq!(as_nanos(&Yaml::String("2s".to_string())).unwrap(), 2e9);
        assert_eq!(as_nanos(&Yaml::String("1500".to_string())).unwrap(), 1500.0);
        assert!(as_nanos(&Yaml::String("fast".to_string())).is_err());
        assert!(as_nanos(&Yaml::Array(Vec::new())).is_err());
    }
}
