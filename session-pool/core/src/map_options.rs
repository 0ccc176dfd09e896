// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};

/// Per-call options for `map` and `starmap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapOptions {
    /// How many worker tasks are handed to a pool worker at once
    pub chunk_size: Option<usize>,
    /// Concatenate partition results instead of returning one list per partition
    pub flatten: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            flatten: true,
        }
    }
}

impl MapOptions {
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Shorthand for `flatten(false)`
    pub fn grouped(self) -> Self {
        self.flatten(false)
    }

    /// Chunk size to dispatch with, checked
    pub fn effective_chunk_size(&self) -> Result<usize> {
        match self.chunk_size {
            Some(0) => Err(PoolError::InvalidChunkSize(0)),
            Some(size) => Ok(size),
            None => Ok(1),
        }
    }
}
