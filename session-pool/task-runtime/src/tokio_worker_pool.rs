// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use log::{debug, warn};
use session_pool_core::worker_context::bind_worker;
use session_pool_core::worker_pool::{in_submission_order, into_chunks, panic_message};
use session_pool_core::{Job, PoolError, Result, WorkerInit, WorkerPool};
use std::cell::RefCell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle blocking threads outlive any realistic gap between batches
const WORKER_KEEP_ALIVE: Duration = Duration::from_secs(24 * 60 * 60);

/// Worker ids not currently held by a blocking thread
struct WorkerSlots {
    free: Mutex<Vec<usize>>,
    init: Option<WorkerInit>,
}

/// Worker id held by the current blocking thread, handed back when the
/// thread exits
struct SlotGuard {
    worker: usize,
    slots: Arc<WorkerSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut free) = self.slots.free.lock() {
            free.push(self.worker);
        }
    }
}

thread_local! {
    static SLOT: RefCell<Option<SlotGuard>> = const { RefCell::new(None) };
}

/// Pool backed by the blocking thread pool of a private tokio runtime,
/// capped at one blocking thread per pool worker.
///
/// Jobs run on blocking threads, outside any async context, so they may
/// block, drive their own runtimes or start nested pools. `start`,
/// `run_batch` and `shutdown` block the caller and must not be used from
/// inside an async task.
pub struct TokioWorkerPool {
    runtime: Option<Runtime>,
    slots: Arc<WorkerSlots>,
    size: usize,
}

impl WorkerPool for TokioWorkerPool {
    fn start(workers: usize, init: Option<WorkerInit>) -> Result<Self> {
        if workers == 0 {
            return Err(PoolError::InvalidWorkerCount(workers));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_keep_alive(WORKER_KEEP_ALIVE)
            .thread_name("session-worker")
            .enable_all()
            .build()
            .map_err(PoolError::Spawn)?;

        let slots = Arc::new(WorkerSlots {
            free: Mutex::new((0..workers).rev().collect()),
            init,
        });

        // Hold every blocking thread at a barrier so each worker id is
        // claimed, and its initializer run, on its own thread
        let barrier = Arc::new(Barrier::new(workers));
        let warm_up: Vec<_> = (0..workers)
            .map(|_| {
                let slots = Arc::clone(&slots);
                let barrier = Arc::clone(&barrier);
                runtime.spawn_blocking(move || {
                    let claimed = enter_worker(&slots);
                    barrier.wait();
                    claimed
                })
            })
            .collect();

        let outcomes = runtime.block_on(async move {
            let mut outcomes = Vec::with_capacity(warm_up.len());
            for handle in warm_up {
                outcomes.push(handle.await);
            }
            outcomes
        });

        let mut failure = None;
        for outcome in outcomes {
            let error = match outcome {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e,
                Err(e) => PoolError::Spawn(io::Error::other(e.to_string())),
            };
            warn!("Worker failed to start: {}", error);
            failure.get_or_insert(error);
        }

        if let Some(failure) = failure {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            return Err(failure);
        }

        debug!("Started tokio runtime with {} blocking workers", workers);
        Ok(Self {
            runtime: Some(runtime),
            slots,
            size: workers,
        })
    }

    fn workers(&self) -> usize {
        self.size
    }

    fn run_batch<T: Send + 'static>(&self, jobs: Vec<Job<T>>, chunk_size: usize) -> Vec<Result<T>> {
        let len = jobs.len();
        let Some(runtime) = self.runtime.as_ref() else {
            return (0..len).map(|_| Err(PoolError::Closed)).collect();
        };

        let handles: Vec<_> = into_chunks(jobs, chunk_size)
            .into_iter()
            .map(|chunk| {
                let indices: Vec<usize> = chunk.iter().map(|(index, _)| *index).collect();
                let slots = Arc::clone(&self.slots);
                let handle = runtime.spawn_blocking(move || run_chunk(&slots, chunk));
                (indices, handle)
            })
            .collect();

        let reported = runtime.block_on(async move {
            let mut reported = Vec::with_capacity(len);
            for (indices, handle) in handles {
                match handle.await {
                    Ok(results) => reported.extend(results),
                    Err(e) => {
                        warn!("Chunk with jobs {:?} did not complete: {}", indices, e);
                        let panicked = e.is_panic();
                        for job in indices {
                            let error = if panicked {
                                PoolError::WorkerPanicked {
                                    job,
                                    message: "chunk task panicked".to_string(),
                                }
                            } else {
                                PoolError::WorkerLost { job }
                            };
                            reported.push((job, Err(error)));
                        }
                    }
                }
            }
            reported
        });

        in_submission_order(len, reported)
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down tokio runtime with {} workers", self.size);
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        }
        Ok(())
    }
}

impl Drop for TokioWorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Worker id of the current blocking thread, claiming a free one and running
/// the initializer the first time the thread is seen
fn enter_worker(slots: &Arc<WorkerSlots>) -> Result<usize> {
    let bound = SLOT.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|guard| Arc::ptr_eq(&guard.slots, slots))
            .map(|guard| guard.worker)
    });
    if let Some(worker) = bound {
        return Ok(worker);
    }

    let claimed = slots.free.lock().ok().and_then(|mut free| free.pop());
    let Some(worker) = claimed else {
        return Err(PoolError::Spawn(io::Error::other(
            "no free worker id for blocking thread",
        )));
    };
    let guard = SlotGuard {
        worker,
        slots: Arc::clone(slots),
    };

    bind_worker(worker);
    if let Some(init) = slots.init.as_ref() {
        panic::catch_unwind(AssertUnwindSafe(|| init(worker)))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "initializer panicked: {}",
                    panic_message(payload)
                ))
            })
            .map_err(|source| PoolError::Initializer { worker, source })?;
    }

    SLOT.with(|slot| *slot.borrow_mut() = Some(guard));
    Ok(worker)
}

fn run_chunk<T>(slots: &Arc<WorkerSlots>, chunk: Vec<(usize, Job<T>)>) -> Vec<(usize, Result<T>)> {
    if let Err(e) = enter_worker(slots) {
        warn!("Dropping chunk of {} jobs: {}", chunk.len(), e);
        return chunk
            .into_iter()
            .map(|(job, _)| (job, Err(PoolError::WorkerLost { job })))
            .collect();
    }

    chunk
        .into_iter()
        .map(|(index, job)| (index, run_job(index, job)))
        .collect()
}

fn run_job<T>(index: usize, job: Job<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(payload);
        warn!("Job {} panicked: {}", index, message);
        Err(PoolError::WorkerPanicked {
            job: index,
            message,
        })
    })
}
