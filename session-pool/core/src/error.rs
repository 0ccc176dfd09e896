// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised while configuring a pool or running a batch on it
#[derive(Error, Debug)]
pub enum PoolError {
    /// Worker count must be at least one
    #[error("invalid worker count {0}: a pool needs at least one worker")]
    InvalidWorkerCount(usize),

    /// Partition count must be at least one
    #[error("invalid partition count {0}: items must be split into at least one part")]
    InvalidPartitionCount(usize),

    /// Chunk size must be at least one when given
    #[error("invalid chunk size {0}: at least one task must be dispatched per round")]
    InvalidChunkSize(usize),

    /// The per-worker initializer hook failed while a worker was starting
    #[error("initializer failed on worker {worker}")]
    Initializer {
        worker: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The resource factory failed inside a worker task
    #[error("resource factory failed for partition {partition}")]
    ResourceFactory {
        partition: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The target function failed on one item
    #[error("target function failed on item {item} of partition {partition}")]
    TargetFunction {
        partition: usize,
        item: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A job panicked; the worker caught the unwind and stayed alive
    #[error("job {job} panicked: {message}")]
    WorkerPanicked { job: usize, message: String },

    /// A job's result never came back from the pool
    #[error("job {job} was lost before it reported a result")]
    WorkerLost { job: usize },

    /// The pool primitive could not start its workers
    #[error("failed to spawn worker")]
    Spawn(#[source] std::io::Error),

    /// Operation attempted on a pool that has been closed
    #[error("pool is closed")]
    Closed,

    /// Close called on a pool that has already been closed
    #[error("pool was already closed")]
    AlreadyClosed,
}

impl PoolError {
    /// Partition the failure belongs to, if it came from a worker task
    pub fn partition(&self) -> Option<usize> {
        match self {
            PoolError::ResourceFactory { partition, .. }
            | PoolError::TargetFunction { partition, .. } => Some(*partition),
            PoolError::WorkerPanicked { job, .. } | PoolError::WorkerLost { job } => Some(*job),
            _ => None,
        }
    }

    /// True for errors caused by how the pool was configured or used, as
    /// opposed to failures of caller-supplied code
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidWorkerCount(_)
                | PoolError::InvalidPartitionCount(_)
                | PoolError::InvalidChunkSize(_)
                | PoolError::Closed
                | PoolError::AlreadyClosed
        )
    }
}
