// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The pool primitive a `SessionPool` runs its worker tasks on.
//!
//! Implementations own a fixed set of workers for their whole lifetime and
//! must hand results back in submission order.

use crate::error::{PoolError, Result};
use std::any::Any;
use std::sync::Arc;

/// A unit of work submitted to the pool
pub type Job<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// Hook run once on each worker when it starts, given the worker id
pub type WorkerInit = Arc<dyn Fn(usize) -> anyhow::Result<()> + Send + Sync>;

/// Trait for abstracting the worker runtime (threads, tokio runtime, ...)
pub trait WorkerPool: Sized + Send {
    /// Start `workers` workers, running `init` on each of them
    fn start(workers: usize, init: Option<WorkerInit>) -> Result<Self>;

    /// Number of workers this pool was started with
    fn workers(&self) -> usize;

    /// Run a batch of jobs and wait for all of them.
    ///
    /// Consecutive jobs are grouped into chunks of `chunk_size`; a chunk runs
    /// sequentially on a single worker. Results come back in submission
    /// order, one per job, whatever order the jobs finished in.
    fn run_batch<T: Send + 'static>(&self, jobs: Vec<Job<T>>, chunk_size: usize)
        -> Vec<Result<T>>;

    /// Stop accepting work and join every worker
    fn shutdown(&mut self) -> Result<()>;
}

/// Groups jobs into chunks of `chunk_size`, tagging each with its submission index
pub fn into_chunks<T>(jobs: Vec<Job<T>>, chunk_size: usize) -> Vec<Vec<(usize, Job<T>)>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(jobs.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size);

    for (index, job) in jobs.into_iter().enumerate() {
        current.push((index, job));
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Collects `(index, result)` pairs back into submission order.
///
/// Indices that never reported are filled with `PoolError::WorkerLost`.
pub fn in_submission_order<T>(
    len: usize,
    reported: impl IntoIterator<Item = (usize, Result<T>)>,
) -> Vec<Result<T>> {
    let mut slots: Vec<Option<Result<T>>> = (0..len).map(|_| None).collect();
    for (index, result) in reported {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(job, slot)| slot.unwrap_or(Err(PoolError::WorkerLost { job })))
        .collect()
}

/// Human-readable message from a caught panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
