use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;

use crate::config_err;
use crate::error::Result;

/// Flat `key -> value` parameters, read from `--key value` arguments or a JSON object.
///
/// A key given without a value (`--enableCheckpoint` followed by another key or the end of
/// the arguments) is read as `"true"`. Later occurrences of a key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = args.into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect::<Vec<_>>();
        let mut values = BTreeMap::new();
        let mut index = 0;
        while index < args.len() {
            let key = Self::strip_key(&args[index])
                .ok_or_else(|| config_err!("Expected a parameter name starting with '-' but found {:?}", args[index]))?;
            match args.get(index + 1) {
                Some(next) if Self::strip_key(next).is_none() => {
                    values.insert(key.to_string(), next.clone());
                    index += 2;
                },
                _ => {
                    values.insert(key.to_string(), "true".to_string());
                    index += 1;
                },
            }
        }
        Ok(Self { values })
    }

    /// Reads a JSON object of scalars, e.g. `{"parallelism": 4, "input-stream": "sensors/raw"}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(object) = value else {
            return Err(config_err!("Expected a JSON object of parameters"));
        };

        let mut values = BTreeMap::new();
        for (key, value) in object {
            let text = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null => continue,
                other => return Err(config_err!("Parameter {} must be a scalar, found {}", key, other)),
            };
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_err!("Failed to read configuration file {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    /// Overlays `other` on top of these parameters.
    pub fn merge(mut self, other: Params) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|value| value.trim().parse::<T>()
                .map_err(|e| config_err!("Invalid value {:?} for parameter {}: {}", value, key, e)))
            .transpose()
    }

    pub fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|value| value.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(config_err!("Invalid boolean {:?} for parameter {}", value, key)),
            },
        }
    }

    fn strip_key(arg: &str) -> Option<&str> {
        let key = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))?;
        // Negative numbers are values, not keys
        if key.is_empty() || key.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() -> Result<()> {
        let params = Params::from_args([
            "--controller", "tcp://controller:9090",
            "--enableCheckpoint",
            "-parallelism", "4",
            "--offset", "-1",
            "--input-startAtTail",
        ])?;
        assert_eq!(params.get("controller"), Some("tcp://controller:9090"));
        assert!(params.get_bool("enableCheckpoint", false)?);
        assert_eq!(params.get_parsed::<u32>("parallelism")?, Some(4));
        assert_eq!(params.get_parsed::<i64>("offset")?, Some(-1));
        assert!(params.get_bool("input-startAtTail", false)?);
        assert!(!params.get_bool("input-endAtTail", false)?);
        Ok(())
    }

    #[test]
    fn test_rejects_dangling_value() {
        assert!(Params::from_args(["value-without-key"]).is_err());
    }

    #[test]
    fn test_typed_getter_errors() -> Result<()> {
        let params = Params::from_args(["--parallelism", "many", "--enableCheckpoint", "maybe"])?;
        assert!(params.get_parsed::<u32>("parallelism").is_err());
        assert!(params.get_bool("enableCheckpoint", true).is_err());
        assert_eq!(params.get_parsed_or::<u64>("checkpointIntervalMs", 10_000)?, 10_000);
        Ok(())
    }

    #[test]
    fn test_json_and_merge() -> Result<()> {
        let file = Params::from_json(r#"{"parallelism": 2, "enableCheckpoint": false, "scope": "sensors", "unused": null}"#)?;
        let args = Params::from_args(["--parallelism", "8"])?;
        let merged = file.merge(args);
        assert_eq!(merged.get("parallelism"), Some("8"));
        assert_eq!(merged.get("scope"), Some("sensors"));
        assert!(!merged.get_bool("enableCheckpoint", true)?);
        assert!(!merged.has("unused"));

        assert!(Params::from_json("[1, 2]").is_err());
        assert!(Params::from_json(r#"{"nested": {"a": 1}}"#).is_err());
        Ok(())
    }
}
