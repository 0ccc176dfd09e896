// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Positional and named arguments handed to a resource factory.
///
/// The values are kept as JSON so the whole bundle can be serialized along
/// with the rest of a pool's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryArgs {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub named: BTreeMap<String, Value>,
}

impl FactoryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument
    pub fn arg(mut self, value: impl Serialize) -> anyhow::Result<Self> {
        self.positional
            .push(serde_json::to_value(value).context("positional argument is not serializable")?);
        Ok(self)
    }

    /// Sets a named argument, replacing any previous value under `name`
    pub fn named_arg(mut self, name: &str, value: impl Serialize) -> anyhow::Result<Self> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("named argument '{}' is not serializable", name))?;
        self.named.insert(name.to_string(), value);
        Ok(self)
    }

    /// Reads positional argument `index` as `T`
    pub fn positional<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self
            .positional
            .get(index)
            .ok_or_else(|| anyhow!("missing positional argument {}", index))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("positional argument {} has the wrong type", index))
    }

    /// Reads named argument `name` as `T`
    pub fn named<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .named
            .get(name)
            .ok_or_else(|| anyhow!("missing named argument '{}'", name))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("named argument '{}' has the wrong type", name))
    }

    /// Reads named argument `name`, falling back to `default` when absent
    pub fn named_or<T: DeserializeOwned>(&self, name: &str, default: T) -> anyhow::Result<T> {
        if self.named.contains_key(name) {
            self.named(name)
        } else {
            Ok(default)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let args = FactoryArgs::new()
            .arg("127.0.0.1:8080")
            .unwrap()
            .named_arg("timeout_ms", 250u64)
            .unwrap();

        let addr: String = args.positional(0).unwrap();
        assert_eq!(addr, "127.0.0.1:8080");
        assert_eq!(args.named::<u64>("timeout_ms").unwrap(), 250);
        assert_eq!(args.named_or("retries", 3u32).unwrap(), 3);
    }

    #[test]
    fn test_missing_and_mistyped_arguments() {
        let args = FactoryArgs::new().named_arg("keep_alive", true).unwrap();

        assert!(args.positional::<String>(0).is_err());
        let err = args.named::<u64>("keep_alive").unwrap_err();
        assert!(err.to_string().contains("wrong type"));
    }

    #[test]
    fn test_empty_bundle_deserializes_from_empty_object() {
        let args: FactoryArgs = serde_json::from_str("{}").unwrap();
        assert!(args.is_empty());
    }
}
