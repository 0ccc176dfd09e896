// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: usize,
    pub messages: usize,
    pub message_length: usize,
    pub max_repeat: usize,
    pub chunk_size: usize,
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            messages: 20,
            message_length: 8,
            max_repeat: 3,
            chunk_size: 1,
            read_timeout_ms: 2_000,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let config: Config =
            serde_json::from_str(&contents).with_context(|| format!("parsing {}", path))?;
        Ok(config)
    }
}
