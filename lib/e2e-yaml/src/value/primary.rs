/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

pub fn as_u64(v: &Yaml) -> anyhow::Result<u64> {
    match v {
        Yaml::String(s) => Ok(u64::from_str(s)?),
        Yaml::Integer(i) => Ok(u64::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'u64' should be 'string' or 'integer'"
        )),
    }
}

pub fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

pub fn as_f64(v: &Yaml) -> anyhow::Result<f64> {
    match v {
        Yaml::String(s) => Ok(f64::from_str(s)?),
        Yaml::Integer(i) => Ok(*i as f64),
        Yaml::Real(s) => Ok(f64::from_str(s)?),
        _ => Err(anyhow!(
            "yaml value type for 'f64' should be 'string', 'integer' or 'real'"
        )),
    }
}

pub fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Boolean(value) => Ok(*value),
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

pub fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.to_string()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(s) => Ok(s.to_string()),
        _ => Err(anyhow!(
            "yaml value type for string should be 'string' / 'integer' / 'real'"
        )),
    }
}

/// Convert a sequence, a single value is taken as a one element list
pub fn as_list<T, F>(v: &Yaml, convert: F) -> anyhow::Result<Vec<T>>
where
    F: Fn(&Yaml) -> anyhow::Result<T>,
{
    let mut vec = Vec::new();
    match v {
        Yaml::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let node = convert(v).context(format!("invalid value for list element #{i}"))?;
                vec.push(node);
            }
        }
        _ => {
            let node = convert(v)?;
            vec.push(node);
        }
    }
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(as_u64(&Yaml::Integer(7)).unwrap(), 7);
        assert_eq!(as_u64(&Yaml::String("8".to_string())).unwrap(), 8);
        assert!(as_u64(&Yaml::Integer(-1)).is_err());
        assert_eq!(as_usize(&Yaml::Integer(3)).unwrap(), 3);
        assert!(as_usize(&Yaml::Real("1.5".to_string())).is_err());
        assert_eq!(as_f64(&Yaml::Real("1.5".to_string())).unwrap(), 1.5);
        assert_eq!(as_f64(&Yaml::Integer(2)).unwrap(), 2.0);
        assert!(as_f64(&Yaml::Boolean(true)).is_err());
    }

    #[test]
    fn bool_and_string() {
        assert!(as_bool(&Yaml::String("on".to_string())).unwrap());
        assert!(!as_bool(&Yaml::Boolean(false)).unwrap());
        assert!(as_bool(&Yaml::String("maybe".to_string())).is_err());
        assert_eq!(as_string(&Yaml::Integer(5)).unwrap(), "5");
        assert!(as_string(&Yaml::Null).is_err());
    }

    #[test]
    fn list() {
        let yaml = yaml_doc!("[1, 2, 3]");
        assert_eq!(as_list(&yaml, as_u64).unwrap(), [1, 2, 3]);
        assert_eq!(as_list(&Yaml::Integer(4), as_u64).unwrap(), [4]);

        let yaml = yaml_doc!("[1, x]");
        assert!(as_list(&yaml, as_u64).is_err());
    }
}
